//! Summary, category, location and tags for a scraped item.
//!
//! The LLM is asked for a JSON object. Anything it gets wrong (transport
//! errors, malformed JSON, a category outside the known set) falls back to
//! the keyword [`Categorizer`] so ingestion never stalls on the model.

use crate::categorizer::{Categorization, Categorizer};
use crate::llm_adapter::{parse_json_response, LlmAdapter};
use crate::utils::text::{smart_truncate, squash_whitespace};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

const SUMMARY_MAX_CHARS: usize = 280;
const PROMPT_BODY_MAX_CHARS: usize = 4000;
const ENRICH_MAX_TOKENS: u32 = 400;

#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub summary: String,
    pub category: String,
    pub location: Option<String>,
    pub tags: Vec<String>,
    /// True when the rule-based categorizer produced this result.
    pub used_fallback: bool,
}

#[derive(Debug, Deserialize)]
struct LlmEnrichment {
    summary: String,
    category: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

pub struct Enricher {
    llm: Arc<dyn LlmAdapter>,
    categorizer: Categorizer,
}

impl Enricher {
    pub fn new(llm: Arc<dyn LlmAdapter>) -> Self {
        Self {
            llm,
            categorizer: Categorizer::new(),
        }
    }

    pub async fn enrich(&self, title: &str, body: &str) -> Enrichment {
        let prompt = build_prompt(title, body);

        let parsed = match self.llm.complete(&prompt, ENRICH_MAX_TOKENS).await {
            Ok(text) => parse_json_response::<LlmEnrichment>(&text),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(result) if Categorizer::is_known_category(&result.category) => {
                debug!("LLM enriched '{}' as {}", title, result.category);
                self.from_llm(title, body, result)
            }
            Ok(result) => {
                warn!(
                    "LLM returned unknown category '{}' for '{}', using rules",
                    result.category, title
                );
                self.fallback(title, body)
            }
            Err(e) => {
                warn!("LLM enrichment failed for '{}': {}", title, e);
                self.fallback(title, body)
            }
        }
    }

    fn from_llm(&self, title: &str, body: &str, result: LlmEnrichment) -> Enrichment {
        let summary = squash_whitespace(&result.summary);
        let summary = if summary.is_empty() {
            fallback_summary(title, body)
        } else {
            smart_truncate(&summary, SUMMARY_MAX_CHARS)
        };

        let mut seen = HashSet::new();
        let tags: Vec<String> = std::iter::once(result.category.clone())
            .chain(
                result
                    .tags
                    .iter()
                    .map(|t| t.trim().to_lowercase().replace(' ', "-")),
            )
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();

        Enrichment {
            summary,
            category: result.category,
            location: result.location.filter(|l| !l.trim().is_empty()),
            tags,
            used_fallback: false,
        }
    }

    fn fallback(&self, title: &str, body: &str) -> Enrichment {
        let Categorization {
            category,
            tags,
            location,
        } = self.categorizer.categorize(title, body);
        Enrichment {
            summary: fallback_summary(title, body),
            category,
            location,
            tags,
            used_fallback: true,
        }
    }
}

fn fallback_summary(title: &str, body: &str) -> String {
    let body = squash_whitespace(body);
    if body.is_empty() {
        title.to_string()
    } else {
        smart_truncate(&body, SUMMARY_MAX_CHARS)
    }
}

fn build_prompt(title: &str, body: &str) -> String {
    let categories = Categorizer::categories().collect::<Vec<_>>().join(", ");
    format!(
        "You write short local business news briefs for Oklahoma City readers.\n\
         Rewrite the item below in your own words.\n\n\
         Respond with only a JSON object with these fields:\n\
         - \"summary\": two sentences, at most {max} characters\n\
         - \"category\": one of [{categories}]\n\
         - \"location\": the OKC neighborhood or town if stated, otherwise null\n\
         - \"tags\": up to five lowercase tags\n\n\
         Title: {title}\n\n\
         Body: {body}",
        max = SUMMARY_MAX_CHARS,
        categories = categories,
        title = title,
        body = smart_truncate(body, PROMPT_BODY_MAX_CHARS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_adapter::MockLlmAdapter;

    #[tokio::test]
    async fn llm_json_is_used_when_valid() {
        let llm = MockLlmAdapter::new("enrich").with_response(
            r#"Here it is: {"summary": "A new bakery opens in Midtown.", "category": "restaurants", "location": "Midtown", "tags": ["Bakery", "new opening"]}"#,
        );
        let enricher = Enricher::new(Arc::new(llm));

        let result = enricher.enrich("Bakery opens", "Fresh bread daily").await;

        assert!(!result.used_fallback);
        assert_eq!(result.category, "restaurants");
        assert_eq!(result.location.as_deref(), Some("Midtown"));
        assert_eq!(result.tags, vec!["restaurants", "bakery", "new-opening"]);
    }

    #[tokio::test]
    async fn repeated_tags_collapse_in_order() {
        let llm = MockLlmAdapter::new("enrich").with_response(
            r#"{"summary": "A bakery opens.", "category": "restaurants", "tags": ["Bakery", "new opening", "bakery", "Restaurants"]}"#,
        );
        let enricher = Enricher::new(Arc::new(llm));

        let result = enricher.enrich("Bakery opens", "Fresh bread daily").await;

        assert_eq!(result.tags, vec!["restaurants", "bakery", "new-opening"]);
    }

    #[tokio::test]
    async fn unknown_category_falls_back_to_rules() {
        let llm = MockLlmAdapter::new("enrich")
            .with_response(r#"{"summary": "x", "category": "sports", "tags": []}"#);
        let enricher = Enricher::new(Arc::new(llm));

        let result = enricher
            .enrich("Brewery expands", "The taproom adds a second location")
            .await;

        assert!(result.used_fallback);
        assert_eq!(result.category, "restaurants");
    }

    #[tokio::test]
    async fn llm_failure_falls_back_with_body_summary() {
        let enricher = Enricher::new(Arc::new(MockLlmAdapter::new("down").failing()));

        let result = enricher.enrich("Council vote", "").await;

        assert!(result.used_fallback);
        assert_eq!(result.summary, "Council vote");
    }
}

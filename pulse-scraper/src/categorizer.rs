//! Rule-based category and tag assignment by keyword substring matching.
//!
//! Used as the fallback when the LLM is unavailable and by the admin
//! `fix-post-category` pass to repair categories on existing posts.

use serde::Serialize;

pub const FALLBACK_CATEGORY: &str = "business";

/// Categories in priority order; ties go to the earlier entry.
const CATEGORY_RULES: &[(&str, &[&str])] = &[
    (
        "restaurants",
        &[
            "restaurant", "cafe", "café", "coffee", "brewery", "taproom", "bakery", "eatery",
            "food truck", "dining", "bistro", "pizza", "taco", "barbecue", "bbq", "menu",
        ],
    ),
    (
        "development",
        &[
            "construction", "development", "groundbreaking", "rezoning", "zoning", "permit",
            "apartments", "mixed-use", "renovation", "redevelopment", "infill", "breaks ground",
        ],
    ),
    (
        "real-estate",
        &[
            "real estate", "property", "sold for", "acquired", "acquisition", "lease",
            "square feet", "square-foot", "office space", "listing", "buyer",
        ],
    ),
    (
        "retail",
        &["store", "shop", "boutique", "retail", "mall", "grand opening", "storefront"],
    ),
    (
        "government",
        &[
            "city council", "ordinance", "mayor", "maps 4", "bond", "county commission",
            "planning commission", "legislature", "tax increment",
        ],
    ),
    (
        "events",
        &["festival", "concert", "event", "market", "parade", "fundraiser"],
    ),
    (
        "business",
        &[
            "company", "business", "expansion", "expands", "jobs", "hiring", "headquarters",
            "startup", "funding", "ceo", "layoffs", "merger",
        ],
    ),
];

/// Extra tags that do not decide the category.
const TAG_RULES: &[(&str, &[&str])] = &[
    ("new-opening", &["now open", "opens", "opening", "grand opening", "debut"]),
    ("closing", &["closing", "closes", "shutter", "last day"]),
    ("expansion", &["expansion", "expands", "second location", "new location"]),
    ("jobs", &["jobs", "hiring", "employees"]),
    ("for-sale", &["for sale", "listed for", "asking price"]),
];

/// Oklahoma City districts and nearby towns recognised as locations.
const NEIGHBORHOODS: &[(&str, &str)] = &[
    ("bricktown", "Bricktown"),
    ("midtown", "Midtown"),
    ("plaza district", "Plaza District"),
    ("paseo", "Paseo Arts District"),
    ("automobile alley", "Automobile Alley"),
    ("deep deuce", "Deep Deuce"),
    ("film row", "Film Row"),
    ("uptown 23rd", "Uptown 23rd"),
    ("wheeler district", "Wheeler District"),
    ("scissortail", "Scissortail Park"),
    ("nichols hills", "Nichols Hills"),
    ("edmond", "Edmond"),
    ("norman", "Norman"),
    ("moore", "Moore"),
    ("yukon", "Yukon"),
    ("mustang", "Mustang"),
    ("midwest city", "Midwest City"),
    ("del city", "Del City"),
    ("bethany", "Bethany"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Categorization {
    pub category: String,
    pub tags: Vec<String>,
    pub location: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Categorizer;

impl Categorizer {
    pub fn new() -> Self {
        Self
    }

    pub fn categorize(&self, title: &str, body: &str) -> Categorization {
        let haystack = format!("{} {}", title, body).to_lowercase();

        let mut best: Option<(&str, usize)> = None;
        for (category, keywords) in CATEGORY_RULES {
            let hits = count_hits(&haystack, keywords);
            if hits > 0 && best.is_none_or(|(_, best_hits)| hits > best_hits) {
                best = Some((*category, hits));
            }
        }
        let category = best
            .map(|(category, _)| category)
            .unwrap_or(FALLBACK_CATEGORY)
            .to_string();

        let mut tags = vec![category.clone()];
        for (tag, keywords) in TAG_RULES {
            if count_hits(&haystack, keywords) > 0 {
                tags.push(tag.to_string());
            }
        }

        let location = NEIGHBORHOODS
            .iter()
            .find(|(needle, _)| haystack.contains(needle))
            .map(|(_, name)| name.to_string());
        if let Some(location) = &location {
            tags.push(location.to_lowercase().replace(' ', "-"));
        }

        Categorization {
            category,
            tags,
            location,
        }
    }

    /// Whether `category` is one the rules can produce.
    pub fn is_known_category(category: &str) -> bool {
        CATEGORY_RULES.iter().any(|(name, _)| *name == category)
    }

    pub fn categories() -> impl Iterator<Item = &'static str> {
        CATEGORY_RULES.iter().map(|(name, _)| *name)
    }
}

fn count_hits(haystack: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| haystack.contains(*k)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restaurant_story_in_bricktown() {
        let result = Categorizer::new().categorize(
            "New taproom and restaurant opens in Bricktown",
            "The brewery's menu leans on local barbecue.",
        );
        assert_eq!(result.category, "restaurants");
        assert!(result.tags.contains(&"new-opening".to_string()));
        assert_eq!(result.location.as_deref(), Some("Bricktown"));
        assert!(result.tags.contains(&"bricktown".to_string()));
    }

    #[test]
    fn development_beats_business_on_hits() {
        let result = Categorizer::new().categorize(
            "Developer breaks ground on Midtown apartments",
            "Construction on the mixed-use development starts after rezoning. The company expects 40 jobs.",
        );
        assert_eq!(result.category, "development");
        assert!(result.tags.contains(&"jobs".to_string()));
    }

    #[test]
    fn unmatched_text_falls_back() {
        let result = Categorizer::new().categorize("Weather update", "Sunny skies ahead");
        assert_eq!(result.category, FALLBACK_CATEGORY);
        assert_eq!(result.tags, vec![FALLBACK_CATEGORY.to_string()]);
        assert_eq!(result.location, None);
    }
}

//! One scraping pass: pull every source, enrich what is new, store it.

use crate::categorizer::Categorizer;
use crate::enrich::Enricher;
use crate::sources::{PullSource, SourceItem};
use crate::types::{IngestReport, Result, SourceReport};
use chrono::Utc;
use interfaces::{NewScrapedPost, PostQuery, PostStatus, PostStore, PostUpdate};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct Ingester {
    store: Arc<dyn PostStore>,
    enricher: Enricher,
    sources: Vec<Box<dyn PullSource>>,
    max_items_per_source: Option<usize>,
}

impl Ingester {
    pub fn new(
        store: Arc<dyn PostStore>,
        enricher: Enricher,
        sources: Vec<Box<dyn PullSource>>,
    ) -> Self {
        Self {
            store,
            enricher,
            sources,
            max_items_per_source: None,
        }
    }

    /// Cap how many new items a single source may contribute per run.
    pub fn with_max_items_per_source(mut self, max: usize) -> Self {
        self.max_items_per_source = Some(max);
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Pull every source in turn. A failing source is recorded in its
    /// report and the run moves on to the next one.
    pub async fn run(&self) -> IngestReport {
        let mut report = IngestReport::default();

        for source in &self.sources {
            let mut source_report = SourceReport {
                source_name: source.source_name(),
                ..Default::default()
            };

            match self.ingest_source(source.as_ref(), &mut source_report).await {
                Ok(true) => {}
                Ok(false) => source.forget_cache().await,
                Err(e) => {
                    error!("Source {} failed: {}", source_report.source_name, e);
                    source_report.error = Some(e.to_string());
                    source.forget_cache().await;
                }
            }

            info!(
                "Source {}: {} found, {} inserted, {} already stored",
                source_report.source_name,
                source_report.items_found,
                source_report.inserted,
                source_report.skipped_existing
            );
            report.sources.push(source_report);
        }

        info!(
            "Ingestion finished: {} posts inserted, {} sources failed",
            report.total_inserted(),
            report.failed_sources()
        );
        report
    }

    /// Returns whether every pulled item was handled. Items left behind by
    /// the per-source cap are picked up on the next run.
    async fn ingest_source(&self, source: &dyn PullSource, report: &mut SourceReport) -> Result<bool> {
        let items = source.pull().await?;
        report.items_found = items.len();

        for item in items {
            if self
                .max_items_per_source
                .is_some_and(|max| report.inserted >= max)
            {
                warn!(
                    "Reached {} new items for {}, leaving the rest for the next run",
                    report.inserted, report.source_name
                );
                return Ok(false);
            }

            if self.store.source_url_exists(&item.url).await? {
                report.skipped_existing += 1;
                continue;
            }

            let (post, used_fallback) = self.build_post(&report.source_name, item).await;
            if used_fallback {
                report.llm_fallbacks += 1;
            }
            self.store.insert_post(post).await?;
            report.inserted += 1;
        }

        Ok(true)
    }

    async fn build_post(&self, source_name: &str, item: SourceItem) -> (NewScrapedPost, bool) {
        let enrichment = self.enricher.enrich(&item.title, &item.body).await;
        let record = item.record;

        let post = NewScrapedPost {
            title: item.title,
            summary: Some(enrichment.summary),
            category: Some(enrichment.category),
            location: enrichment
                .location
                .or_else(|| record.as_ref().and_then(|r| r.address.clone())),
            tags: enrichment.tags,
            source_name: source_name.to_string(),
            source_url: item.url,
            data_type: record.as_ref().map(|r| r.data_type),
            data_value: record.as_ref().and_then(|r| r.value),
            data_address: record.and_then(|r| r.address),
            scraped_date: Some(item.published_at.unwrap_or_else(Utc::now)),
        };
        (post, enrichment.used_fallback)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryChange {
    pub post_id: Uuid,
    pub title: String,
    pub from: Option<String>,
    pub to: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecategorizeReport {
    pub dry_run: bool,
    pub examined: usize,
    pub changes: Vec<CategoryChange>,
}

/// Re-run the keyword categorizer over every post that is not deleted and
/// store new categories and tags where they differ. With `dry_run` nothing
/// is written.
pub async fn recategorize_posts<S>(store: &S, dry_run: bool) -> Result<RecategorizeReport>
where
    S: PostStore + ?Sized,
{
    let categorizer = Categorizer::new();
    let posts = store.list_posts(&PostQuery::default()).await?;

    let mut report = RecategorizeReport {
        dry_run,
        examined: 0,
        changes: Vec::new(),
    };

    for post in posts.into_iter().filter(|p| p.status != PostStatus::Deleted) {
        report.examined += 1;
        let body = post.summary.as_deref().unwrap_or("");
        let result = categorizer.categorize(&post.title, body);

        if post.category.as_deref() == Some(result.category.as_str()) && post.tags == result.tags {
            continue;
        }

        if !dry_run {
            store
                .update_post(
                    post.id,
                    PostUpdate {
                        category: Some(result.category.clone()),
                        tags: Some(result.tags.clone()),
                        ..Default::default()
                    },
                )
                .await?;
        }

        report.changes.push(CategoryChange {
            post_id: post.id,
            title: post.title,
            from: post.category,
            to: result.category,
            tags: result.tags,
        });
    }

    info!(
        "Recategorized {} of {} posts{}",
        report.changes.len(),
        report.examined,
        if dry_run { " (dry run)" } else { "" }
    );
    Ok(report)
}

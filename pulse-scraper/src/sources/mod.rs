//! Where scraped items come from.

pub mod public_records;
pub mod rss_feed;

pub use public_records::PublicRecordSource;
pub use rss_feed::RssFeedSource;

use crate::fetcher::Fetcher;
use crate::types::{PublicRecord, Result, ScraperError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interfaces::DataType;
use std::sync::Arc;

/// One candidate post pulled from a source, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    pub title: String,
    /// Plain text used for summarization.
    pub body: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Present for public-record items.
    pub record: Option<PublicRecord>,
}

/// A source the ingester can pull from.
#[async_trait]
pub trait PullSource: Send + Sync {
    /// Human-readable name, stored as the post's `source_name`.
    fn source_name(&self) -> String;

    /// Fetch the source's current items.
    async fn pull(&self) -> Result<Vec<SourceItem>>;

    /// Drop any conditional-request state so the next `pull` refetches
    /// everything. Called when the last pull was not fully stored.
    async fn forget_cache(&self) {}
}

/// Split a source list on commas and newlines, dropping blanks.
fn split_specs(specs: &str) -> impl Iterator<Item = &str> {
    specs
        .split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Build RSS sources from `name|url` entries (as in `PULSE_FEEDS`).
pub fn rss_sources_from_specs(
    specs: &str,
    fetcher: Arc<Fetcher>,
) -> Result<Vec<Box<dyn PullSource>>> {
    split_specs(specs)
        .map(|spec| {
            let (name, url) = spec
                .split_once('|')
                .ok_or_else(|| ScraperError::InvalidSource(format!("expected name|url, got '{}'", spec)))?;
            let url = url::Url::parse(url.trim())?;
            Ok(Box::new(RssFeedSource::new(name.trim(), url.as_str(), fetcher.clone()))
                as Box<dyn PullSource>)
        })
        .collect()
}

/// Build public-record sources from `data_type|url` entries (as in
/// `PULSE_RECORD_SOURCES`).
pub fn record_sources_from_specs(
    specs: &str,
    fetcher: Arc<Fetcher>,
) -> Result<Vec<Box<dyn PullSource>>> {
    split_specs(specs)
        .map(|spec| {
            let (data_type, url) = spec.split_once('|').ok_or_else(|| {
                ScraperError::InvalidSource(format!("expected data_type|url, got '{}'", spec))
            })?;
            let data_type: DataType = data_type
                .trim()
                .parse()
                .map_err(|e: interfaces::UnknownVariant| ScraperError::InvalidSource(e.to_string()))?;
            let url = url::Url::parse(url.trim())?;
            Ok(Box::new(PublicRecordSource::new(data_type, url.as_str(), fetcher.clone()))
                as Box<dyn PullSource>)
        })
        .collect()
}

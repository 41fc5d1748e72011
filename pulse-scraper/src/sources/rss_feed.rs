use super::{PullSource, SourceItem};
use crate::fetcher::Fetcher;
use crate::parser::FeedParser;
use crate::types::{Result, ScraperError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct CacheHeaders {
    etag: Option<String>,
    last_modified: Option<String>,
}

/// A news RSS/Atom feed.
pub struct RssFeedSource {
    name: String,
    url: String,
    fetcher: Arc<Fetcher>,
    parser: Mutex<FeedParser>,
    cache: Mutex<CacheHeaders>,
}

impl RssFeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            fetcher,
            parser: Mutex::new(FeedParser::new()),
            cache: Mutex::new(CacheHeaders::default()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Turn a fetched feed document into items.
    pub async fn items_from_content(&self, content: &str) -> Result<Vec<SourceItem>> {
        if !FeedParser::is_valid_feed_content(content) {
            return Err(ScraperError::Parse(format!(
                "{} did not return RSS or Atom",
                self.url
            )));
        }

        let mut parser = self.parser.lock().await;
        // Dedup applies within one document; the store decides what is new.
        parser.clear_deduplication_cache();
        let feed = parser.parse_feed(content)?;

        Ok(feed
            .entries
            .into_iter()
            .map(|entry| SourceItem {
                body: entry.body_text(),
                title: entry.title,
                url: entry.url,
                published_at: entry.published_at,
                record: None,
            })
            .collect())
    }
}

#[async_trait]
impl PullSource for RssFeedSource {
    fn source_name(&self) -> String {
        self.name.clone()
    }

    async fn pull(&self) -> Result<Vec<SourceItem>> {
        info!("Pulling RSS feed: {}", self.url);

        let (etag, last_modified) = {
            let cache = self.cache.lock().await;
            (cache.etag.clone(), cache.last_modified.clone())
        };

        let result = self
            .fetcher
            .fetch_feed(&self.url, etag.as_deref(), last_modified.as_deref())
            .await?;

        if !result.success {
            let error_msg = result.error.unwrap_or_else(|| "Fetch failed".to_string());
            error!("Failed to fetch RSS feed {}: {}", self.url, error_msg);
            return Err(ScraperError::General(error_msg));
        }

        let Some(content) = result.content else {
            warn!("No new content for RSS feed {}", self.url);
            return Ok(Vec::new());
        };

        let items = self.items_from_content(&content).await?;

        // Only remember validators for a document that parsed.
        {
            let mut cache = self.cache.lock().await;
            cache.etag = result.etag;
            cache.last_modified = result.last_modified;
        }

        info!("Pulled {} items from {}", items.len(), self.name);
        Ok(items)
    }

    async fn forget_cache(&self) {
        let mut cache = self.cache.lock().await;
        if cache.etag.is_some() || cache.last_modified.is_some() {
            debug!("Clearing cache validators for {}", self.url);
        }
        *cache = CacheHeaders::default();
    }
}

use chrono::{DateTime, Utc};
use interfaces::DataType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub success: bool,
    pub error: Option<String>,
    pub fetch_time: DateTime<Utc>,
    pub response_time_ms: u64,
    pub http_status: Option<u16>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content: Option<String>,
}

impl FetchResult {
    pub(crate) fn failed(fetch_time: DateTime<Utc>, response_time_ms: u64, error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            fetch_time,
            response_time_ms,
            http_status: None,
            etag: None,
            last_modified: None,
            content: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
    /// Minimum spacing between requests to the same host.
    pub min_host_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "OKC-Pulse-Scraper/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
            max_feed_size_mb: 10,
            max_redirects: 5,
            min_host_interval_ms: 1000,
        }
    }
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub guid: Option<String>,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl ParsedEntry {
    /// Plain-text body used for summarization: content when present,
    /// otherwise the description.
    pub fn body_text(&self) -> String {
        let raw = self
            .content
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or("");
        crate::utils::feed::extract_text_from_html(raw)
    }
}

/// One row from a public-records endpoint (permits, licenses, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct PublicRecord {
    pub record_id: String,
    pub data_type: DataType,
    pub title: String,
    pub value: Option<f64>,
    pub address: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
    pub url: String,
}

/// What came out of an ingestion pass for a single source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceReport {
    pub source_name: String,
    pub items_found: usize,
    pub inserted: usize,
    pub skipped_existing: usize,
    pub llm_fallbacks: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub sources: Vec<SourceReport>,
}

impl IngestReport {
    pub fn total_inserted(&self) -> usize {
        self.sources.iter().map(|s| s.inserted).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid source spec: {0}")]
    InvalidSource(String),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, ScraperError>;

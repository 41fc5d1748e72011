//! OKC Pulse scraper: pulls local news feeds and city public-record
//! endpoints, summarizes and categorizes each item, and stores it as a
//! `pending_photo` post for moderation.

pub mod categorizer;
pub mod config;
pub mod enrich;
pub mod fetcher;
pub mod ingest;
pub mod llm_adapter;
pub mod parser;
pub mod sources;
pub mod types;
pub mod utils;

pub use categorizer::{Categorization, Categorizer};
pub use config::ScraperArgs;
pub use enrich::{Enricher, Enrichment};
pub use fetcher::Fetcher;
pub use ingest::{recategorize_posts, CategoryChange, Ingester, RecategorizeReport};
pub use llm_adapter::{ClaudeAdapter, LlmAdapter, LlmError, MockLlmAdapter};
pub use parser::FeedParser;
pub use sources::{PublicRecordSource, PullSource, RssFeedSource, SourceItem};
pub use types::*;

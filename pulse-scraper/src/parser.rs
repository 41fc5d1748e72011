use crate::types::{ParsedEntry, ParsedFeed, Result, ScraperError};
use chrono::Utc;
use feed_rs::parser;
use std::collections::HashSet;
use tracing::{debug, info};

/// Parses RSS/Atom documents, dropping entries already seen by this parser
/// (by GUID, then by link).
pub struct FeedParser {
    seen_guids: HashSet<String>,
    seen_urls: HashSet<String>,
}

impl FeedParser {
    pub fn new() -> Self {
        Self {
            seen_guids: HashSet::new(),
            seen_urls: HashSet::new(),
        }
    }

    pub fn parse_feed(&mut self, content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| ScraperError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let description = feed.description.map(|d| d.content);

        let entries: Vec<ParsedEntry> = feed
            .entries
            .into_iter()
            .filter_map(|entry| self.parse_entry(entry))
            .collect();

        info!("Parsed feed with {} entries", entries.len());

        Ok(ParsedFeed {
            title,
            description,
            entries,
        })
    }

    fn parse_entry(&mut self, entry: feed_rs::model::Entry) -> Option<ParsedEntry> {
        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .unwrap_or_else(|| "Untitled".to_string());

        let url = entry.links.first()?.href.clone();

        let guid = (!entry.id.is_empty()).then(|| entry.id.clone());

        if let Some(ref guid) = guid {
            if !self.seen_guids.insert(guid.clone()) {
                debug!("Skipping duplicate entry with GUID: {}", guid);
                return None;
            }
        }

        if !self.seen_urls.insert(url.clone()) {
            debug!("Skipping duplicate entry with URL: {}", url);
            return None;
        }

        let description = entry.summary.map(|s| s.content);
        let content = entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .or_else(|| description.clone());
        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc));
        let tags = entry.categories.into_iter().map(|c| c.term).collect();

        Some(ParsedEntry {
            guid,
            url,
            title,
            description,
            content,
            published_at,
            tags,
        })
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();
        content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("<channel")
            || content_lower.contains("xmlns:atom")
    }

    pub fn clear_deduplication_cache(&mut self) {
        self.seen_guids.clear();
        self.seen_urls.clear();
        debug!("Cleared deduplication cache");
    }
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}

//! Scraper settings shared by the CLI and the server's cron endpoint.

use crate::enrich::Enricher;
use crate::fetcher::Fetcher;
use crate::ingest::Ingester;
use crate::llm_adapter::{create_adapter, LlmAdapter, LlmResult};
use crate::sources::{record_sources_from_specs, rss_sources_from_specs};
use crate::types::{FetchConfig, Result};
use interfaces::PostStore;
use std::sync::Arc;

#[derive(clap::Args, Debug, Clone)]
pub struct ScraperArgs {
    /// News feeds as comma-separated `name|url` pairs
    #[arg(long, env = "PULSE_FEEDS", default_value = "")]
    pub feeds: String,

    /// Public-record endpoints as comma-separated `data_type|url` pairs
    #[arg(long, env = "PULSE_RECORD_SOURCES", default_value = "")]
    pub record_sources: String,

    /// LLM provider: claude or mock
    #[arg(long, env = "LLM_PROVIDER", default_value = "claude")]
    pub llm_provider: String,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    #[arg(long, env = "LLM_MODEL")]
    pub llm_model: Option<String>,

    /// New posts a single source may add per run
    #[arg(long, env = "PULSE_MAX_ITEMS_PER_SOURCE", default_value = "25")]
    pub max_items_per_source: usize,
}

impl ScraperArgs {
    pub fn build_llm(&self) -> LlmResult<Arc<dyn LlmAdapter>> {
        create_adapter(
            &self.llm_provider,
            self.anthropic_api_key.clone(),
            self.llm_model.clone(),
        )
        .map(Arc::from)
    }

    /// Wire sources, enrichment and storage into an [`Ingester`].
    pub fn build_ingester(
        &self,
        store: Arc<dyn PostStore>,
        llm: Arc<dyn LlmAdapter>,
    ) -> Result<Ingester> {
        let fetcher = Arc::new(Fetcher::new(FetchConfig::default())?);
        let mut sources = rss_sources_from_specs(&self.feeds, fetcher.clone())?;
        sources.extend(record_sources_from_specs(&self.record_sources, fetcher)?);

        Ok(Ingester::new(store, Enricher::new(llm), sources)
            .with_max_items_per_source(self.max_items_per_source))
    }
}

use crate::auth::SessionVerifier;
use crate::billing::CheckoutProvider;
use crate::config::Settings;
use crate::pages::PageCache;
use interfaces::Store;
use pulse_scraper::{Ingester, LlmAdapter};
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub llm: Arc<dyn LlmAdapter>,
    pub billing: Arc<dyn CheckoutProvider>,
    /// Absent when no scraper sources are configured.
    pub ingester: Option<Arc<Ingester>>,
    pub sessions: Arc<SessionVerifier>,
    pub settings: Arc<Settings>,
    pub pages: Arc<PageCache>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn LlmAdapter>,
        billing: Arc<dyn CheckoutProvider>,
        jwt_secret: &str,
        settings: Settings,
    ) -> Self {
        let pages = PageCache::new(Duration::from_secs(settings.page_cache_ttl_secs));
        Self {
            store,
            llm,
            billing,
            ingester: None,
            sessions: Arc::new(SessionVerifier::new(jwt_secret)),
            settings: Arc::new(settings),
            pages: Arc::new(pages),
        }
    }

    pub fn with_ingester(mut self, ingester: Ingester) -> Self {
        self.ingester = Some(Arc::new(ingester));
        self
    }
}

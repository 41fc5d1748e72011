use anyhow::Context;
use clap::Parser;
use dealsprints_server::{billing::StripeClient, router, AppState, Args, Settings};
use interfaces::{MemoryStore, PgStore, Store};
use pulse_scraper::Ingester;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dealsprints_server=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let llm = args
        .scraper
        .build_llm()
        .context("Failed to configure LLM adapter")?;
    let billing = StripeClient::new(args.stripe.stripe_secret_key.clone())
        .context("Failed to build Stripe client")?;
    if args.stripe.stripe_secret_key.is_none() {
        warn!("STRIPE_SECRET_KEY not set; checkout endpoints will return 503");
    }

    let (store, ingester): (Arc<dyn Store>, Ingester) = match &args.database_url {
        Some(database_url) if !args.memory => {
            let store = PgStore::connect(database_url, args.database_max_connections)
                .await
                .context("Failed to connect to database")?;
            store.migrate().await.context("Failed to run migrations")?;
            let store = Arc::new(store);
            let ingester = args.scraper.build_ingester(store.clone(), llm.clone())?;
            (store as Arc<dyn Store>, ingester)
        }
        _ => {
            warn!("Using the in-memory store; nothing will be persisted");
            let store = Arc::new(MemoryStore::new());
            let ingester = args.scraper.build_ingester(store.clone(), llm.clone())?;
            (store as Arc<dyn Store>, ingester)
        }
    };

    let mut state = AppState::new(
        store,
        llm,
        Arc::new(billing),
        &args.supabase_jwt_secret,
        Settings::from(&args),
    );
    if ingester.source_count() > 0 {
        info!("Scraper ready with {} sources", ingester.source_count());
        state = state.with_ingester(ingester);
    } else {
        warn!("No scraper sources configured; /api/admin/run-scraper is disabled");
    }

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!("Listening on {}", args.listen);
    axum::serve(listener, app).await?;

    Ok(())
}

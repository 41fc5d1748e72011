use anyhow::Context;
use clap::{Parser, Subcommand};
use interfaces::PgStore;
use pulse_scraper::{recategorize_posts, ScraperArgs};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pulse-scraper")]
#[command(about = "Scrape and categorize OKC Pulse posts")]
#[command(version)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "5")]
    max_connections: u32,

    #[command(flatten)]
    scraper: ScraperArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one ingestion pass over every configured source
    Run,
    /// Re-apply the keyword categorizer to stored posts
    Categorize {
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,pulse_scraper=debug")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let store = PgStore::connect(&cli.database_url, cli.max_connections)
        .await
        .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to run migrations")?;
    let store = Arc::new(store);

    match cli.command {
        Command::Run => {
            let llm = cli.scraper.build_llm()?;
            let ingester = cli.scraper.build_ingester(store, llm)?;
            if ingester.source_count() == 0 {
                warn!("No sources configured; set PULSE_FEEDS or PULSE_RECORD_SOURCES");
            }
            let report = ingester.run().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Categorize { dry_run } => {
            let report = recategorize_posts(store.as_ref(), dry_run).await?;
            for change in &report.changes {
                info!(
                    "{}: {} -> {}",
                    change.title,
                    change.from.as_deref().unwrap_or("(none)"),
                    change.to
                );
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

//! Entry point for the `spider` crawler binary: loads configuration,
//! opens the shared Postgres pool, and runs the frontier to quiescence.

mod frontier;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use index_core::{Config, HttpFetcher, HttpFetcherConfig, IndexStore, PostgresIndexStore};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use frontier::Frontier;

/// Default number of pages fetched concurrently. Not currently exposed
/// as a config key.
const DEFAULT_WORKER_COUNT: usize = 2;

#[derive(Parser, Debug)]
#[command(name = "spider", about = "Concurrent fetch-parse-index crawler")]
struct Args {
    /// Path to the flat key=value configuration file.
    #[arg(default_value = "./config.ini")]
    config_path: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "spider exited with a fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config_path)
        .with_context(|| format!("loading configuration from {}", args.config_path))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url())
        .await
        .context("connecting to postgres")?;

    let store: Arc<dyn IndexStore> = Arc::new(PostgresIndexStore::new(pool));
    store.ensure_schema().await.context("ensuring schema")?;

    let fetcher = Arc::new(HttpFetcher::new(HttpFetcherConfig::default()));

    let frontier = Arc::new(Frontier::new(
        fetcher,
        store,
        &config.start_page,
        config.recursion_depth,
        DEFAULT_WORKER_COUNT,
    ));

    tracing::info!(
        start_page = %config.start_page,
        max_depth = config.recursion_depth,
        workers = DEFAULT_WORKER_COUNT,
        "starting crawl"
    );

    // On Ctrl-C, stop enqueuing new work and let already-spawned tasks
    // drain normally; the crawl future below still only resolves once the
    // frontier actually reaches quiescence.
    let shutdown_watcher = {
        let frontier = Arc::clone(&frontier);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("received ctrl-c, finishing in-flight work and stopping new crawls");
                frontier.shutdown();
            }
        })
    };

    let summary = frontier.run(config.start_page.clone()).await;
    shutdown_watcher.abort();

    tracing::info!(
        pages_indexed = summary.pages_indexed,
        errors = summary.errors,
        urls_visited = summary.urls_visited,
        "crawl complete"
    );

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

//! Entry point for the `searcher` query server binary.

mod server;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use index_core::{Config, IndexStore, PostgresIndexStore, QueryEngine};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use server::AppState;

#[derive(Parser, Debug)]
#[command(name = "searcher", about = "HTTP front-end over the ranked term search")]
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
            tracing::error!(error = %err, "searcher exited with a fatal error");
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

    let engine = Arc::new(QueryEngine::new(store));
    let app = server::router(AppState { engine });

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!(addr = %addr, "searcher listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving query server")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received ctrl-c, shutting down");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

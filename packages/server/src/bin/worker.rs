// Main entry point for the crawler worker

use std::sync::Arc;

use anyhow::{Context, Result};
use server_core::registry::MemoryRegistry;
use server_core::storage::PostgresStore;
use server_core::worker::CrawlerWorker;
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,ingestion=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting crawler worker");

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let store = Arc::new(PostgresStore::new(pool));
    let registry = Arc::new(MemoryRegistry::new());

    let worker = Arc::new(
        CrawlerWorker::new(config, store, registry).context("Failed to build worker")?,
    );
    tracing::info!(worker_id = worker.worker_id(), "Worker initialized");

    // SIGINT/SIGTERM drain the worker: current batch finishes, background
    // tasks complete their iteration, then the process exits
    let shutdown = worker.shutdown_token();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Received shutdown signal, draining worker");
        shutdown.cancel();
    });

    worker.run().await
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

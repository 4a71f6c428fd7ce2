use anyhow::Result;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use telegram_indexer::api;
use telegram_indexer::config::Config;
use telegram_indexer::db::init_database;
use telegram_indexer::engine::Engine;
use telegram_indexer::telegram::sim::SimRpcFactory;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,telegram_indexer=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::init()?.clone();
    info!("Initialized configuration");

    // Initialize database
    let db = Arc::new(init_database(&config.database).await?);
    info!("Connected to database");

    // The upstream adapter is pluggable behind RpcFactory; the in-memory
    // deterministic upstream serves local runs until a TL-client adapter is
    // wired in deployment builds.
    let factory = Arc::new(SimRpcFactory::new());

    // Build the engine and restore sessions for authorized accounts
    let engine = Engine::build(config.clone(), db, factory).await?;
    if let Err(e) = engine.manager.restore_active_sessions().await {
        error!("Failed to restore sessions: {}", e);
    }

    // Start API server
    let api_engine = engine.clone();
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::start_api_server(&api_config, api_engine).await {
            error!("API server error: {}", e);
        }
    });

    // Handle shutdown signals
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, initiating graceful shutdown"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    engine.shutdown().await;
    api_handle.abort();

    info!("Telegram indexer shutdown complete");
    Ok(())
}

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use catalog_cache::api;
use catalog_cache::config::Config;
use catalog_cache::storage::SqliteStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {:#}", e);
        e
    })?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(config.logging.style != "never")
        .init();

    info!("Starting server on {}", config.server_address());

    // Initialize the session-scoped cache store
    let storage = Arc::new(
        SqliteStorage::new(&config.storage.url)
            .map_err(|e| {
                error!("Failed to initialize cache storage: {}", e);
                e
            })
            .with_context(|| format!("Cannot open cache storage at {}", config.storage.url))?,
    );
    info!("Cache storage ready at {}", config.storage.url);

    // Create router with state
    let app: Router = api::routes::create_router_with_state(storage, config.clone())
        .context("Failed to build engine transport")?;

    // Start server
    let addr: SocketAddr = config
        .server_address()
        .parse()
        .with_context(|| format!("Invalid server address {}", config.server_address()))?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

mod models;
mod handlers;
mod services;
mod middleware;
mod routes;
mod config;
mod errors;

use anyhow::Context;
use std::sync::Arc;
use crate::{
    config::{Config, StoreBackend},
    routes::AppState,
    services::{DocumentStore, MemoryStore, RedisService},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize basic tracing subscriber
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Pick the document store
    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackend::Redis => {
            let redis_client = redis::Client::open(config.redis_url()?)
                .context("Invalid Redis URL")?;
            let redis_service = RedisService::connect(redis_client)
                .await
                .context("Failed to connect to Redis")?;
            Arc::new(redis_service)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    tracing::info!("Document store: {}", store.backend());

    let app = routes::build_router(AppState::new(store), &config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server running on {}", addr);
    axum::serve(listener, app.into_make_service())
        .await
        .context("Server error")?;

    Ok(())
}

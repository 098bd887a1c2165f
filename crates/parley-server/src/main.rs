//! Parley Server
//!
//! Chat backend: a websocket echo endpoint plus the chat persistence layer
//! (contact lists, chat documents and conversation range queries) backed by
//! Redis Stack.

mod settings;
mod extractors;
mod handlers;
mod storage;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use parley_core::Cache;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use settings::{ServerConfig, StoreBackend};
use storage::{MemoryCache, RedisCache};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn Cache>,
    pub config: Arc<ServerConfig>,
}

#[tokio::main]
async fn main() {
    // Set up panic hook to log crashes
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()));
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[PANIC] at {:?}: {}", location, payload);
        tracing::error!("PANIC at {:?}: {}", location, payload);
    }));

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("[FATAL] Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!("Starting Parley Server v{}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}", std::process::id());

    if let Err(e) = run_server().await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_server() -> Result<()> {
    info!("Loading configuration...");
    let config = settings::load().context("Failed to load configuration")?;
    info!(
        "Config loaded: bind={}, store={:?}@{}",
        config.bind_address, config.store.backend, config.store.address
    );

    let cache = open_cache(&config).await?;

    let state = AppState {
        cache,
        config: Arc::new(config.clone()),
    };
    let app = build_router(state);

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .context("Failed to parse bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The router, and with it the last store handle, is gone once serve returns
    info!("Server stopped, store connection closed");
    Ok(())
}

async fn open_cache(config: &ServerConfig) -> Result<Arc<dyn Cache>> {
    match config.store.backend {
        StoreBackend::Redis => {
            let cache = RedisCache::connect(&config.store)
                .await
                .context("Failed to initialize store")?;
            if config.store.create_index {
                cache
                    .create_chat_index()
                    .await
                    .context("Failed to create chat index")?;
            }
            Ok(Arc::new(cache))
        }
        StoreBackend::Memory => {
            info!("Using in-memory store, chats are lost on restart");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/echo", get(handlers::ws::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
pub(crate) fn test_state(cache: Arc<dyn Cache>) -> AppState {
    AppState {
        cache,
        config: Arc::new(ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            allowed_origin: "http://localhost:8080".to_string(),
            allowed_host: "localhost:8080".to_string(),
            store: settings::StoreConfig {
                backend: StoreBackend::Memory,
                ..Default::default()
            },
        }),
    }
}

//! Axum server setup
//!
//! Server skeleton with:
//! - Localhost-only CORS by default
//! - Tracing middleware
//! - Graceful shutdown on SIGTERM/Ctrl+C, then the worker pool is closed

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use todoctl_core::pool::DEFAULT_MAX_WORKERS;
use todoctl_core::Services;

use super::routes;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:3030)
    pub bind_addr: SocketAddr,

    /// Allow permissive CORS (default: false = localhost only)
    ///
    /// WARNING: Setting this to true allows any origin.
    pub cors_permissive: bool,

    /// Largest worker count `PUT /pool` accepts
    pub max_pool_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&todoctl_core::config::ServerConfig::default())
    }
}

impl From<&todoctl_core::config::ServerConfig> for ServerConfig {
    fn from(config: &todoctl_core::config::ServerConfig) -> Self {
        Self {
            bind_addr: config.bind,
            cors_permissive: config.cors_permissive,
            max_pool_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl ServerConfig {
    pub fn with_max_pool_workers(mut self, max: usize) -> Self {
        self.max_pool_workers = max;
        self
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub max_pool_workers: usize,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            max_pool_workers: DEFAULT_MAX_WORKERS,
        }
    }

    pub fn with_max_pool_workers(mut self, max: usize) -> Self {
        self.max_pool_workers = max;
        self
    }
}

/// Build the router with every route, without CORS or tracing layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::users::router())
        .merge(routes::tasks::router())
        .merge(routes::pool::router())
        .with_state(state)
}

fn cors_layer(permissive: bool) -> CorsLayer {
    if permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://localhost:3030"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://127.0.0.1:3030"),
        ])
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Run the HTTP server until a shutdown signal, then drain the worker pool.
///
/// # Example
///
/// ```ignore
/// let services = Services::new(store, pool, cache, notifier, &config.cache);
/// run_server(services, ServerConfig::default()).await?;
/// ```
pub async fn run_server(services: Services, config: ServerConfig) -> Result<(), ServerError> {
    let state = Arc::new(
        AppState::new(services.clone()).with_max_pool_workers(config.max_pool_workers),
    );

    let app = build_router(state)
        .layer(cors_layer(config.cors_permissive))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Listener stopped, closing worker pool");
    services.pool().close().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// A signal handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

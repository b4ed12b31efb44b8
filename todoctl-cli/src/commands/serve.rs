//! HTTP server command
//!
//! Runs the todoctl HTTP server over PostgreSQL, or entirely in memory
//! with `--memory`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use todoctl_core::{MemoryStore, RecordStore, TodoConfig};
use todoctl_server::{run_server, ServerConfig};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default from config: 127.0.0.1:3030)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Number of pool workers executing writes
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Keep records in memory instead of PostgreSQL (lost on exit)
    #[arg(long)]
    pub memory: bool,
}

/// Run the HTTP server until Ctrl+C/SIGTERM
pub async fn run_serve(args: ServeArgs, mut config: TodoConfig) -> Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(workers) = args.workers {
        config.pool.workers = workers;
    }
    if args.cors_permissive {
        config.server.cors_permissive = true;
    }
    config.validate()?;

    let store: Arc<dyn RecordStore> = if args.memory {
        tracing::warn!("Using in-memory store - records are lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let store = super::connect(&config).await?;
        store
            .ensure_schema()
            .await
            .context("Failed to create schema")?;
        Arc::new(store)
    };

    tracing::info!(
        workers = config.pool.workers,
        "Starting todoctl server on {}",
        config.server.bind
    );

    let services = super::build_services(store, &config);
    let server = ServerConfig::from(&config.server).with_max_pool_workers(config.pool.max_workers);
    run_server(services, server)
        .await
        .context("Server error")?;

    Ok(())
}

//! Command implementations for the todoctl CLI

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use todoctl_core::store::{create_pool_with_options, PgStore};
use todoctl_core::{LogNotifier, MemoryCache, RecordStore, Services, TodoConfig, WorkerPool};

pub mod db;
pub mod serve;
pub mod task;
pub mod user;

pub use db::run_init_db;
pub use serve::run_serve;
pub use task::run_task;
pub use user::run_user;

/// Connect to the configured PostgreSQL database.
pub(crate) async fn connect(config: &TodoConfig) -> Result<PgStore> {
    let url = config.database_url()?;
    let pool = create_pool_with_options(url, config.database.max_connections)
        .await
        .context("Failed to create database pool")?;
    Ok(PgStore::new(pool))
}

/// Wire services over `store` with an in-process cache and log notifications.
///
/// Expired cache entries are purged in the background for as long as the
/// services live.
pub(crate) fn build_services(store: Arc<dyn RecordStore>, config: &TodoConfig) -> Services {
    let pool = WorkerPool::with_capacity(config.pool.workers, config.pool.queue_capacity);
    let cache = Arc::new(MemoryCache::new());
    MemoryCache::spawn_purger(&cache, config.cache.purge_interval());
    Services::new(store, pool, cache, Arc::new(LogNotifier), &config.cache)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! User and task services
//!
//! Writes run on the shared [`WorkerPool`](crate::pool::WorkerPool): each
//! work item commits one store transaction, invalidates the affected cache
//! keys and then publishes a change event. Callers await the item's result,
//! so every write looks like a plain async call.
//!
//! Reads go cache-first and repopulate on a miss. Listing bypasses both the
//! cache and the pool.

use std::sync::Arc;

use crate::cache::{CacheAside, CacheStore};
use crate::config::CacheConfig;
use crate::notify::{ChangeEvent, Notifier};
use crate::pool::WorkerPool;
use crate::store::RecordStore;

pub mod tasks;
pub mod users;

pub use tasks::TaskService;
pub use users::UserService;

/// Publish `event`, logging instead of failing.
pub(crate) async fn publish(notifier: &dyn Notifier, event: ChangeEvent) {
    if let Err(err) = notifier.publish(&event).await {
        tracing::warn!(
            operation = %event.operation,
            id = event.id,
            error = %err,
            "failed to publish change event"
        );
    }
}

/// Both services over one store, pool, cache and notifier
#[derive(Clone)]
pub struct Services {
    pub users: UserService,
    pub tasks: TaskService,
    pool: WorkerPool,
}

impl Services {
    pub fn new(
        store: Arc<dyn RecordStore>,
        pool: WorkerPool,
        cache: Arc<dyn CacheStore>,
        notifier: Arc<dyn Notifier>,
        config: &CacheConfig,
    ) -> Self {
        let users = UserService::new(
            Arc::clone(&store),
            pool.clone(),
            CacheAside::new(Arc::clone(&cache), "user", config.user_ttl()),
            CacheAside::new(Arc::clone(&cache), "user_name", config.user_ttl()),
            Arc::clone(&notifier),
        );
        let tasks = TaskService::new(
            store,
            pool.clone(),
            CacheAside::new(cache, "task", config.task_ttl()),
            users.clone(),
            notifier,
        );
        Self { users, tasks, pool }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

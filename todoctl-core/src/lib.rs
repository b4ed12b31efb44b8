//! Core of todoctl: a user/task record store behind a resizable worker pool
//! and a cache-aside layer.
//!
//! - [`tx`] runs each store operation in exactly one transaction
//! - [`store`] implements the operations for PostgreSQL and in memory
//! - [`pool`] caps write concurrency independent of caller concurrency
//! - [`cache`] keeps TTL projections, invalidated after every write
//! - [`service`] ties them together for the protocol layers

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod pool;
pub mod service;
pub mod store;
pub mod tx;

pub use cache::{CacheAside, CacheError, CacheStore, MemoryCache};
pub use config::TodoConfig;
pub use error::{Entity, Error, PoolError, Result, StoreError};
pub use notify::{BroadcastNotifier, ChangeEvent, LogNotifier, NoopNotifier, Notifier};
pub use pool::{PoolState, PoolStatus, WorkHandle, WorkerPool};
pub use service::{Services, TaskService, UserService};
pub use store::{MemoryStore, PgStore, RecordStore};
pub use tx::{IsolationLevel, TransactionManager};

//! Record store - one transaction per entity operation
//!
//! # Design Principles
//!
//! - Each operation is a single transaction body run through `tx::run_transaction`
//! - Isolation level comes from `Action::isolation()`, never from the caller
//! - Rely on DB constraints, map violations to `StoreError::ConstraintViolation`
//! - Delete is idempotent here; callers decide whether "already gone" is an error

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{NewTask, NewUser, Task, TaskPatch, User, UserPatch};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, MemoryTransactionManager, MemoryTx};
pub use postgres::{create_pool, create_pool_with_options, PgStore, PgTransactionManager};

/// Authoritative storage for users and tasks.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Insert a user and return its assigned identifier.
    async fn create_user(&self, user: NewUser) -> Result<i64, StoreError>;

    async fn get_user(&self, id: i64) -> Result<User, StoreError>;

    async fn get_username(&self, id: i64) -> Result<String, StoreError>;

    /// All users, in store-defined order.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Read-modify-write of one user inside a single transaction.
    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<User, StoreError>;

    /// Remove a user. Returns whether a row was removed; an absent row is not an error.
    async fn delete_user(&self, id: i64) -> Result<bool, StoreError>;

    /// Insert a task and return its assigned identifier.
    async fn create_task(&self, task: NewTask) -> Result<i64, StoreError>;

    async fn get_task(&self, id: i64) -> Result<Task, StoreError>;

    /// All tasks, in store-defined order.
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;

    /// Read-modify-write of one task; bumps `updated_at`.
    async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Task, StoreError>;

    /// Remove a task. Returns whether a row was removed.
    async fn delete_task(&self, id: i64) -> Result<bool, StoreError>;
}

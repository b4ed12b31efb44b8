//! In-memory record store
//!
//! Transactions are fully serialized: `begin` takes an owned lock on the
//! tables and works on a copy, `commit` writes the copy back and `rollback`
//! drops it. Serial execution satisfies every isolation level, so the level
//! passed to `begin` is only recorded in the trace output.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::RecordStore;
use crate::error::{Action, BoxError, Entity, OpContext, StoreError};
use crate::model::{NewTask, NewUser, Task, TaskPatch, User, UserPatch};
use crate::tx::{run_transaction, IsolationLevel, TransactionManager};

#[derive(Debug, Clone)]
struct Tables {
    users: BTreeMap<i64, User>,
    tasks: BTreeMap<i64, Task>,
    next_user_id: i64,
    next_task_id: i64,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            users: BTreeMap::new(),
            tasks: BTreeMap::new(),
            next_user_id: 1,
            next_task_id: 1,
        }
    }
}

impl Tables {
    fn username_taken(&self, username: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }
}

/// Open in-memory transaction: the table lock plus a working copy.
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

/// Serializing transaction manager over shared in-memory tables.
#[derive(Default)]
pub struct MemoryTransactionManager {
    tables: Arc<Mutex<Tables>>,
    fail_next_commit: AtomicBool,
}

impl MemoryTransactionManager {
    /// Make the next commit fail without applying its writes.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransactionManager for MemoryTransactionManager {
    type Tx = MemoryTx;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, BoxError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        tracing::trace!(?isolation, "begin memory transaction");
        let working = guard.clone();
        Ok(MemoryTx { guard, working })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), BoxError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err("injected commit failure".into());
        }
        let MemoryTx { mut guard, working } = tx;
        *guard = working;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), BoxError> {
        drop(tx);
        Ok(())
    }
}

/// Record store kept in process memory.
///
/// Identifiers start at 1 and are never reused. Listing returns rows in
/// ascending identifier order. The constraints mirror the SQL schema:
/// unique usernames and tasks referencing an existing user.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tx: Arc<MemoryTransactionManager>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail. The write is discarded.
    pub fn fail_next_commit(&self) {
        self.tx.fail_next_commit();
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<i64, StoreError> {
        let context = OpContext::new(Entity::User, Action::Create);
        run_transaction(&*self.tx, Action::Create.isolation(), context, move |tx| {
            Box::pin(async move {
                let tables = &mut tx.working;
                if tables.username_taken(user.username.as_str(), None) {
                    return Err(StoreError::constraint(
                        context,
                        format!("username {:?} already exists", user.username.as_str()),
                    ));
                }
                let id = tables.next_user_id;
                tables.next_user_id += 1;
                tables.users.insert(
                    id,
                    User {
                        id,
                        username: user.username.into_string(),
                        created_at: user.created_at,
                    },
                );
                Ok(id)
            })
        })
        .await
    }

    async fn get_user(&self, id: i64) -> Result<User, StoreError> {
        let context = OpContext::new(Entity::User, Action::Get).with_id(id);
        run_transaction(&*self.tx, Action::Get.isolation(), context, move |tx| {
            Box::pin(async move {
                tx.working
                    .users
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| StoreError::not_found(Entity::User, id))
            })
        })
        .await
    }

    async fn get_username(&self, id: i64) -> Result<String, StoreError> {
        let context = OpContext::new(Entity::User, Action::GetName).with_id(id);
        run_transaction(&*self.tx, Action::GetName.isolation(), context, move |tx| {
            Box::pin(async move {
                tx.working
                    .users
                    .get(&id)
                    .map(|u| u.username.clone())
                    .ok_or_else(|| StoreError::not_found(Entity::User, id))
            })
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let context = OpContext::new(Entity::User, Action::List);
        run_transaction(&*self.tx, Action::List.isolation(), context, move |tx| {
            Box::pin(async move { Ok(tx.working.users.values().cloned().collect()) })
        })
        .await
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<User, StoreError> {
        let context = OpContext::new(Entity::User, Action::Update).with_id(id);
        run_transaction(&*self.tx, Action::Update.isolation(), context, move |tx| {
            Box::pin(async move {
                let tables = &mut tx.working;
                if let Some(name) = &patch.username {
                    if tables.username_taken(name.as_str(), Some(id)) {
                        return Err(StoreError::constraint(
                            context,
                            format!("username {:?} already exists", name.as_str()),
                        ));
                    }
                }
                let user = tables
                    .users
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::not_found(Entity::User, id))?;
                patch.apply(user);
                Ok(user.clone())
            })
        })
        .await
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let context = OpContext::new(Entity::User, Action::Delete).with_id(id);
        run_transaction(&*self.tx, Action::Delete.isolation(), context, move |tx| {
            Box::pin(async move {
                let tables = &mut tx.working;
                if tables.tasks.values().any(|t| t.user_id == id) {
                    return Err(StoreError::constraint(
                        context,
                        format!("user {id} still owns tasks"),
                    ));
                }
                Ok(tables.users.remove(&id).is_some())
            })
        })
        .await
    }

    async fn create_task(&self, task: NewTask) -> Result<i64, StoreError> {
        let context = OpContext::new(Entity::Task, Action::Create);
        run_transaction(&*self.tx, Action::Create.isolation(), context, move |tx| {
            Box::pin(async move {
                let tables = &mut tx.working;
                if !tables.users.contains_key(&task.user_id) {
                    return Err(StoreError::constraint(
                        context,
                        format!("user {} does not exist", task.user_id),
                    ));
                }
                let id = tables.next_task_id;
                tables.next_task_id += 1;
                tables.tasks.insert(
                    id,
                    Task {
                        id,
                        user_id: task.user_id,
                        title: task.title.into_string(),
                        note: task.note.into_string(),
                        done: task.done,
                        created_at: task.created_at,
                        updated_at: task.updated_at,
                    },
                );
                Ok(id)
            })
        })
        .await
    }

    async fn get_task(&self, id: i64) -> Result<Task, StoreError> {
        let context = OpContext::new(Entity::Task, Action::Get).with_id(id);
        run_transaction(&*self.tx, Action::Get.isolation(), context, move |tx| {
            Box::pin(async move {
                tx.working
                    .tasks
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| StoreError::not_found(Entity::Task, id))
            })
        })
        .await
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let context = OpContext::new(Entity::Task, Action::List);
        run_transaction(&*self.tx, Action::List.isolation(), context, move |tx| {
            Box::pin(async move { Ok(tx.working.tasks.values().cloned().collect()) })
        })
        .await
    }

    async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Task, StoreError> {
        let context = OpContext::new(Entity::Task, Action::Update).with_id(id);
        run_transaction(&*self.tx, Action::Update.isolation(), context, move |tx| {
            Box::pin(async move {
                let task = tx
                    .working
                    .tasks
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::not_found(Entity::Task, id))?;
                patch.apply(task, crate::model::now());
                Ok(task.clone())
            })
        })
        .await
    }

    async fn delete_task(&self, id: i64) -> Result<bool, StoreError> {
        let context = OpContext::new(Entity::Task, Action::Delete).with_id(id);
        run_transaction(&*self.tx, Action::Delete.isolation(), context, move |tx| {
            Box::pin(async move { Ok(tx.working.tasks.remove(&id).is_some()) })
        })
        .await
    }
}

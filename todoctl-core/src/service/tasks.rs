use std::sync::Arc;

use crate::cache::CacheAside;
use crate::error::{Action, Entity, Error, Result, StoreError};
use crate::model::{NewTask, Task, TaskNote, TaskPatch, TaskTitle};
use crate::notify::{ChangeEvent, Notifier};
use crate::pool::WorkerPool;
use crate::store::RecordStore;

use super::{publish, UserService};

/// Task operations with cache-aside reads and pooled writes
#[derive(Clone)]
pub struct TaskService {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn RecordStore>,
    pool: WorkerPool,
    tasks: CacheAside<Task>,
    users: UserService,
    notifier: Arc<dyn Notifier>,
}

impl TaskService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        pool: WorkerPool,
        tasks: CacheAside<Task>,
        users: UserService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                pool,
                tasks,
                users,
                notifier,
            }),
        }
    }

    /// Create a task owned by `user_id` and return its identifier.
    ///
    /// The owner must exist; an unknown owner is `NotFound` for the user.
    pub async fn create_task(&self, user_id: i64, title: TaskTitle, note: TaskNote) -> Result<i64> {
        self.inner.users.get_user(user_id).await?;

        let inner = Arc::clone(&self.inner);
        let id = self
            .inner
            .pool
            .run(move || async move {
                let id = inner
                    .store
                    .create_task(NewTask::new(user_id, title, note))
                    .await?;
                inner.tasks.invalidate(&inner.tasks.key(id)).await;
                let event = ChangeEvent::new(Entity::Task, Action::Create, id).with_user(user_id);
                publish(&*inner.notifier, event).await;
                Ok::<_, Error>(id)
            })
            .await??;

        tracing::info!(entity = "task", id, user_id, "task created");
        Ok(id)
    }

    pub async fn get_task(&self, id: i64) -> Result<Task> {
        let key = self.inner.tasks.key(id);
        if let Some(task) = self.inner.tasks.read(&key).await {
            return Ok(task);
        }

        let task = self.inner.store.get_task(id).await?;
        self.inner.tasks.populate(&key, &task).await;
        Ok(task)
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.inner.store.list_tasks().await?)
    }

    /// Apply `patch` to task `id`, bump `updated_at` and return the stored result.
    pub async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Task> {
        let inner = Arc::clone(&self.inner);
        let task = self
            .inner
            .pool
            .run(move || async move {
                let task = inner.store.update_task(id, patch).await?;
                inner.tasks.invalidate(&inner.tasks.key(id)).await;
                let event = ChangeEvent::new(Entity::Task, Action::Update, id).with_user(task.user_id);
                publish(&*inner.notifier, event).await;
                Ok::<_, Error>(task)
            })
            .await??;

        tracing::info!(entity = "task", id, "task updated");
        Ok(task)
    }

    /// Delete task `id`. Deleting an absent task is `NotFound`.
    pub async fn delete_task(&self, id: i64) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .pool
            .run(move || async move {
                let removed = inner.store.delete_task(id).await?;
                inner.tasks.invalidate(&inner.tasks.key(id)).await;
                if !removed {
                    return Err(StoreError::not_found(Entity::Task, id).into());
                }
                publish(&*inner.notifier, ChangeEvent::new(Entity::Task, Action::Delete, id)).await;
                Ok::<_, Error>(())
            })
            .await??;

        tracing::info!(entity = "task", id, "task deleted");
        Ok(())
    }
}

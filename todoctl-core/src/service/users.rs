use std::sync::Arc;

use crate::cache::CacheAside;
use crate::error::{Action, Entity, Error, Result, StoreError};
use crate::model::{NewUser, User, UserPatch, Username};
use crate::notify::{ChangeEvent, Notifier};
use crate::pool::WorkerPool;
use crate::store::RecordStore;

use super::publish;

/// User operations with cache-aside reads and pooled writes
#[derive(Clone)]
pub struct UserService {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn RecordStore>,
    pool: WorkerPool,
    users: CacheAside<User>,
    names: CacheAside<String>,
    notifier: Arc<dyn Notifier>,
}

impl Inner {
    /// Drop every cached projection of user `id`.
    async fn invalidate(&self, id: i64) {
        self.users.invalidate(&self.users.key(id)).await;
        self.names.invalidate(&self.names.key(id)).await;
    }
}

impl UserService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        pool: WorkerPool,
        users: CacheAside<User>,
        names: CacheAside<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                pool,
                users,
                names,
                notifier,
            }),
        }
    }

    /// Create a user and return its identifier.
    pub async fn create_user(&self, username: Username) -> Result<i64> {
        let inner = Arc::clone(&self.inner);
        let id = self
            .inner
            .pool
            .run(move || async move {
                let id = inner.store.create_user(NewUser::new(username)).await?;
                inner.invalidate(id).await;
                publish(&*inner.notifier, ChangeEvent::new(Entity::User, Action::Create, id)).await;
                Ok::<_, Error>(id)
            })
            .await??;

        tracing::info!(entity = "user", id, "user created");
        Ok(id)
    }

    pub async fn get_user(&self, id: i64) -> Result<User> {
        let key = self.inner.users.key(id);
        if let Some(user) = self.inner.users.read(&key).await {
            return Ok(user);
        }

        let user = self.inner.store.get_user(id).await?;
        self.inner.users.populate(&key, &user).await;
        Ok(user)
    }

    pub async fn get_username(&self, id: i64) -> Result<String> {
        let key = self.inner.names.key(id);
        if let Some(name) = self.inner.names.read(&key).await {
            return Ok(name);
        }

        let name = self.inner.store.get_username(id).await?;
        self.inner.names.populate(&key, &name).await;
        Ok(name)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.inner.store.list_users().await?)
    }

    /// Apply `patch` to user `id` and return the stored result.
    pub async fn update_user(&self, id: i64, patch: UserPatch) -> Result<User> {
        let inner = Arc::clone(&self.inner);
        let user = self
            .inner
            .pool
            .run(move || async move {
                let user = inner.store.update_user(id, patch).await?;
                inner.invalidate(id).await;
                publish(&*inner.notifier, ChangeEvent::new(Entity::User, Action::Update, id)).await;
                Ok::<_, Error>(user)
            })
            .await??;

        tracing::info!(entity = "user", id, "user updated");
        Ok(user)
    }

    /// Delete user `id`. Deleting an absent user is `NotFound`.
    pub async fn delete_user(&self, id: i64) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .pool
            .run(move || async move {
                let removed = inner.store.delete_user(id).await?;
                inner.invalidate(id).await;
                if !removed {
                    return Err(StoreError::not_found(Entity::User, id).into());
                }
                publish(&*inner.notifier, ChangeEvent::new(Entity::User, Action::Delete, id)).await;
                Ok::<_, Error>(())
            })
            .await??;

        tracing::info!(entity = "user", id, "user deleted");
        Ok(())
    }
}

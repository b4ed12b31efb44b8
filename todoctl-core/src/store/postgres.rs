//! PostgreSQL record store
//!
//! Uses a sqlx PgPool with explicit connection limits. Connections are
//! acquired per transaction and released on commit/rollback.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::RecordStore;
use crate::error::{Action, BoxError, Entity, OpContext, StoreError};
use crate::model::{NewTask, NewUser, Task, TaskPatch, User, UserPatch};
use crate::tx::{run_transaction, IsolationLevel, TransactionManager};

/// Default maximum connections for the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Create a PostgreSQL connection pool.
///
/// # Errors
///
/// Returns an error if the connection fails.
///
/// # Example
///
/// ```ignore
/// let pool = create_pool("postgres://localhost/todoctl").await?;
/// ```
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    create_pool_with_options(database_url, DEFAULT_MAX_CONNECTIONS).await
}

/// Create a PostgreSQL connection pool with custom options.
pub async fn create_pool_with_options(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Begins pooled transactions at an explicit isolation level.
#[derive(Clone)]
pub struct PgTransactionManager {
    pool: PgPool,
}

impl PgTransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, BoxError> {
        let mut tx = self.pool.begin().await?;
        // dropping `tx` on error rolls it back
        sqlx::query(isolation.set_statement())
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), BoxError> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), BoxError> {
        tx.rollback().await?;
        Ok(())
    }
}

/// Map a statement error, separating constraint violations from other failures.
fn classify(context: OpContext, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation() {
            return StoreError::constraint(context, db.message());
        }
    }
    StoreError::query(context, err)
}

/// Record store backed by PostgreSQL
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    tx: PgTransactionManager,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            tx: PgTransactionManager::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `users` and `tasks` tables if they are missing.
    ///
    /// Bootstrap only: existing tables are left as they are.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        tracing::info!("Ensuring database schema...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id),
                title TEXT NOT NULL,
                note TEXT NOT NULL DEFAULT '',
                done BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id)")
            .execute(&self.pool)
            .await?;

        tracing::info!("Database schema ready");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<i64, StoreError> {
        let context = OpContext::new(Entity::User, Action::Create);
        run_transaction(&self.tx, Action::Create.isolation(), context, move |tx| {
            Box::pin(async move {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO users (username, created_at) VALUES ($1, $2) RETURNING id",
                )
                .bind(user.username.as_str())
                .bind(user.created_at)
                .fetch_one(&mut **tx)
                .await
                .map_err(|e| classify(context, e))
            })
        })
        .await
    }

    async fn get_user(&self, id: i64) -> Result<User, StoreError> {
        let context = OpContext::new(Entity::User, Action::Get).with_id(id);
        run_transaction(&self.tx, Action::Get.isolation(), context, move |tx| {
            Box::pin(async move {
                sqlx::query_as::<_, User>(
                    "SELECT id, username, created_at FROM users WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| classify(context, e))?
                .ok_or_else(|| StoreError::not_found(Entity::User, id))
            })
        })
        .await
    }

    async fn get_username(&self, id: i64) -> Result<String, StoreError> {
        let context = OpContext::new(Entity::User, Action::GetName).with_id(id);
        run_transaction(&self.tx, Action::GetName.isolation(), context, move |tx| {
            Box::pin(async move {
                sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(|e| classify(context, e))?
                    .ok_or_else(|| StoreError::not_found(Entity::User, id))
            })
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let context = OpContext::new(Entity::User, Action::List);
        run_transaction(&self.tx, Action::List.isolation(), context, move |tx| {
            Box::pin(async move {
                sqlx::query_as::<_, User>("SELECT id, username, created_at FROM users ORDER BY id")
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(|e| classify(context, e))
            })
        })
        .await
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<User, StoreError> {
        let context = OpContext::new(Entity::User, Action::Update).with_id(id);
        run_transaction(&self.tx, Action::Update.isolation(), context, move |tx| {
            Box::pin(async move {
                let mut user = sqlx::query_as::<_, User>(
                    "SELECT id, username, created_at FROM users WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| classify(context, e))?
                .ok_or_else(|| StoreError::not_found(Entity::User, id))?;

                patch.apply(&mut user);

                sqlx::query("UPDATE users SET username = $2 WHERE id = $1")
                    .bind(id)
                    .bind(&user.username)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| classify(context, e))?;

                Ok(user)
            })
        })
        .await
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let context = OpContext::new(Entity::User, Action::Delete).with_id(id);
        run_transaction(&self.tx, Action::Delete.isolation(), context, move |tx| {
            Box::pin(async move {
                let result = sqlx::query("DELETE FROM users WHERE id = $1")
                    .bind(id)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| classify(context, e))?;
                Ok(result.rows_affected() > 0)
            })
        })
        .await
    }

    async fn create_task(&self, task: NewTask) -> Result<i64, StoreError> {
        let context = OpContext::new(Entity::Task, Action::Create);
        run_transaction(&self.tx, Action::Create.isolation(), context, move |tx| {
            Box::pin(async move {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO tasks (user_id, title, note, done, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING id
                    "#,
                )
                .bind(task.user_id)
                .bind(task.title.as_str())
                .bind(task.note.as_str())
                .bind(task.done)
                .bind(task.created_at)
                .bind(task.updated_at)
                .fetch_one(&mut **tx)
                .await
                .map_err(|e| classify(context, e))
            })
        })
        .await
    }

    async fn get_task(&self, id: i64) -> Result<Task, StoreError> {
        let context = OpContext::new(Entity::Task, Action::Get).with_id(id);
        run_transaction(&self.tx, Action::Get.isolation(), context, move |tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Task>(
                    r#"
                    SELECT id, user_id, title, note, done, created_at, updated_at
                    FROM tasks
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| classify(context, e))?
                .ok_or_else(|| StoreError::not_found(Entity::Task, id))
            })
        })
        .await
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let context = OpContext::new(Entity::Task, Action::List);
        run_transaction(&self.tx, Action::List.isolation(), context, move |tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Task>(
                    r#"
                    SELECT id, user_id, title, note, done, created_at, updated_at
                    FROM tasks
                    ORDER BY id
                    "#,
                )
                .fetch_all(&mut **tx)
                .await
                .map_err(|e| classify(context, e))
            })
        })
        .await
    }

    async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Task, StoreError> {
        let context = OpContext::new(Entity::Task, Action::Update).with_id(id);
        run_transaction(&self.tx, Action::Update.isolation(), context, move |tx| {
            Box::pin(async move {
                let mut task = sqlx::query_as::<_, Task>(
                    r#"
                    SELECT id, user_id, title, note, done, created_at, updated_at
                    FROM tasks
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| classify(context, e))?
                .ok_or_else(|| StoreError::not_found(Entity::Task, id))?;

                patch.apply(&mut task, crate::model::now());

                sqlx::query(
                    r#"
                    UPDATE tasks
                    SET title = $2, note = $3, done = $4, updated_at = $5
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(&task.title)
                .bind(&task.note)
                .bind(task.done)
                .bind(task.updated_at)
                .execute(&mut **tx)
                .await
                .map_err(|e| classify(context, e))?;

                Ok(task)
            })
        })
        .await
    }

    async fn delete_task(&self, id: i64) -> Result<bool, StoreError> {
        let context = OpContext::new(Entity::Task, Action::Delete).with_id(id);
        run_transaction(&self.tx, Action::Delete.isolation(), context, move |tx| {
            Box::pin(async move {
                let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
                    .bind(id)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| classify(context, e))?;
                Ok(result.rows_affected() > 0)
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TaskNote, TaskTitle, Username};

    // Integration tests require a real database
    // Run with: DATABASE_URL=postgres://... cargo test -p todoctl-core -- --ignored

    async fn store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url).await.expect("pool creation failed");
        let store = PgStore::new(pool);
        store.ensure_schema().await.expect("schema bootstrap failed");
        store
    }

    fn unique_name(prefix: &str) -> Username {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Username::new(&format!("{prefix}-{nanos}")).unwrap()
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn user_crud_roundtrip() {
        let store = store().await;
        let name = unique_name("alice");

        let id = store.create_user(NewUser::new(name.clone())).await.unwrap();
        let user = store.get_user(id).await.unwrap();
        assert_eq!(user.username, name.as_str());

        let renamed = unique_name("alicia");
        let updated = store
            .update_user(
                id,
                UserPatch {
                    username: Some(renamed.clone()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username, renamed.as_str());
        assert_eq!(updated.created_at, user.created_at);

        assert!(store.delete_user(id).await.unwrap());
        assert!(!store.delete_user(id).await.unwrap());
        assert!(store.get_user(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn duplicate_username_is_constraint_violation() {
        let store = store().await;
        let name = unique_name("dup");

        let id = store.create_user(NewUser::new(name.clone())).await.unwrap();
        let err = store.create_user(NewUser::new(name)).await.unwrap_err();
        assert!(err.is_constraint_violation());

        store.delete_user(id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn task_with_unknown_user_is_constraint_violation() {
        let store = store().await;
        let task = NewTask::new(
            i64::MAX,
            TaskTitle::new("orphan").unwrap(),
            TaskNote::default(),
        );
        let err = store.create_task(task).await.unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn updated_task_matches_stored_row() {
        let store = store().await;
        let owner = store
            .create_user(NewUser::new(unique_name("owner")))
            .await
            .unwrap();
        let id = store
            .create_task(NewTask::new(
                owner,
                TaskTitle::new("draft").unwrap(),
                TaskNote::default(),
            ))
            .await
            .unwrap();

        let updated = store
            .update_task(
                id,
                TaskPatch {
                    done: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(store.get_task(id).await.unwrap(), updated);

        store.delete_task(id).await.unwrap();
        store.delete_user(owner).await.unwrap();
    }
}

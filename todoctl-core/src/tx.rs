//! Transaction lifecycle
//!
//! Every record-store operation is a transaction body run through
//! [`run_transaction`], which begins at the requested isolation level and
//! then commits or rolls back exactly once on every exit path.

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::{Action, BoxError, OpContext, StoreError, TxStage};

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// SQL statement selecting this level; must be the first statement of
    /// the transaction.
    pub fn set_statement(self) -> &'static str {
        match self {
            Self::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            Self::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            Self::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

impl Action {
    /// Isolation level used for this kind of operation.
    ///
    /// Inserts only need to avoid dirty reads. Point reads and the
    /// read-modify-write of an update must not see a row change under them.
    /// Deletes and full scans run serializable so concurrent structural
    /// changes cannot produce write skew.
    pub fn isolation(self) -> IsolationLevel {
        match self {
            Action::Create => IsolationLevel::ReadCommitted,
            Action::Get | Action::GetName | Action::Update => IsolationLevel::RepeatableRead,
            Action::Delete | Action::List => IsolationLevel::Serializable,
        }
    }
}

/// Begins, commits and rolls back transactions on some backend.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Open transaction handle. Dropping it without commit must discard it.
    type Tx: Send;

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Tx, BoxError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), BoxError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), BoxError>;
}

/// Run `body` inside one transaction.
///
/// - begin failure: `StoreError::Transaction { stage: Begin }`, body never runs
/// - body error: rolled back, the body's error is returned
/// - commit failure: `StoreError::Transaction { stage: Commit }`
///
/// A failed rollback is logged and never replaces the body's error.
pub async fn run_transaction<M, T, F>(
    manager: &M,
    isolation: IsolationLevel,
    context: OpContext,
    body: F,
) -> Result<T, StoreError>
where
    M: TransactionManager + ?Sized,
    T: Send,
    F: for<'t> FnOnce(&'t mut M::Tx) -> BoxFuture<'t, Result<T, StoreError>> + Send,
{
    let mut tx = manager
        .begin(isolation)
        .await
        .map_err(|source| StoreError::Transaction {
            context,
            stage: TxStage::Begin,
            source,
        })?;

    match body(&mut tx).await {
        Ok(value) => {
            manager
                .commit(tx)
                .await
                .map_err(|source| StoreError::Transaction {
                    context,
                    stage: TxStage::Commit,
                    source,
                })?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = manager.rollback(tx).await {
                tracing::error!(
                    operation = %context,
                    error = %rollback_err,
                    "transaction rollback failed"
                );
            }
            Err(err)
        }
    }
}

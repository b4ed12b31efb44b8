/// Structured error types for todoctl-core.
///
/// Store, pool and service errors are `thiserror` enums so the protocol
/// layer can map them to status codes. Binary crates (todoctl-cli) use
/// `anyhow` on top. Cache and notification errors live next to their
/// modules because they never propagate past them.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::ValidationError;

/// Boxed backend error (sqlx, in-memory fault, ...)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Entity kind an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    User,
    Task,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Task => f.write_str("task"),
        }
    }
}

/// Verb of a record-store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Get,
    GetName,
    List,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Create => "create",
            Self::Get => "get",
            Self::GetName => "get name of",
            Self::List => "list",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(verb)
    }
}

/// What was being attempted when an error happened: entity, action, identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpContext {
    pub entity: Entity,
    pub action: Action,
    pub id: Option<i64>,
}

impl OpContext {
    pub fn new(entity: Entity, action: Action) -> Self {
        Self {
            entity,
            action,
            id: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

impl fmt::Display for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.action, self.id) {
            (Action::List, _) => write!(f, "list {}s", self.entity),
            (action, Some(id)) => write!(f, "{} {} {}", action, self.entity, id),
            (action, None) => write!(f, "{} {}", action, self.entity),
        }
    }
}

/// Transaction infrastructure step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStage {
    Begin,
    Commit,
}

impl fmt::Display for TxStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => f.write_str("begin"),
            Self::Commit => f.write_str("commit"),
        }
    }
}

/// Record store error
#[derive(Error, Debug)]
pub enum StoreError {
    /// No row for the identifier
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    /// Insert/update rejected by a unique, foreign-key or check constraint
    #[error("{context}: constraint violation: {message}")]
    ConstraintViolation { context: OpContext, message: String },

    /// Begin or commit failed. A commit failure may have applied the write.
    #[error("{context}: failed to {stage} transaction: {source}")]
    Transaction {
        context: OpContext,
        stage: TxStage,
        source: BoxError,
    },

    /// A statement inside the transaction failed; nothing was applied
    #[error("{context}: {source}")]
    Query { context: OpContext, source: BoxError },
}

impl StoreError {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn constraint(context: OpContext, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            context,
            message: message.into(),
        }
    }

    pub fn query(context: OpContext, source: impl Into<BoxError>) -> Self {
        Self::Query {
            context,
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }

    /// True only when the body succeeded but commit failed: the caller
    /// cannot tell whether the write landed.
    pub fn may_have_applied(&self) -> bool {
        matches!(
            self,
            Self::Transaction {
                stage: TxStage::Commit,
                ..
            }
        )
    }
}

/// Worker pool error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,

    #[error("work item finished without delivering a result")]
    Abandoned,
}

/// Service-level error returned to the protocol layer
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Result type alias for todoctl-core services
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_constraint_violation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn context_display() {
        let ctx = OpContext::new(Entity::Task, Action::Update).with_id(7);
        assert_eq!(ctx.to_string(), "update task 7");

        let ctx = OpContext::new(Entity::User, Action::List);
        assert_eq!(ctx.to_string(), "list users");

        let ctx = OpContext::new(Entity::User, Action::Create);
        assert_eq!(ctx.to_string(), "create user");
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::not_found(Entity::User, 1);
        assert_eq!(err.to_string(), "user 1 not found");

        let err = StoreError::Transaction {
            context: OpContext::new(Entity::Task, Action::Delete).with_id(4),
            stage: TxStage::Commit,
            source: Box::new(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset")),
        };
        assert_eq!(
            err.to_string(),
            "delete task 4: failed to commit transaction: connection reset"
        );
    }

    #[test]
    fn only_commit_failures_may_have_applied() {
        let ctx = OpContext::new(Entity::User, Action::Create);
        let commit = StoreError::Transaction {
            context: ctx,
            stage: TxStage::Commit,
            source: "boom".into(),
        };
        let begin = StoreError::Transaction {
            context: ctx,
            stage: TxStage::Begin,
            source: "boom".into(),
        };
        let query = StoreError::query(ctx, "syntax error");

        assert!(commit.may_have_applied());
        assert!(!begin.may_have_applied());
        assert!(!query.may_have_applied());
    }

    #[test]
    fn service_error_helpers() {
        let err: Error = StoreError::not_found(Entity::Task, 9).into();
        assert!(err.is_not_found());
        assert!(!err.is_constraint_violation());

        let err: Error = PoolError::Closed.into();
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "worker pool is closed");
    }
}

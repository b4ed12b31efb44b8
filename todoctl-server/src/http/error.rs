//! API error types with IntoResponse
//!
//! Errors are converted to JSON responses with appropriate status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use todoctl_core::error::Entity;
use todoctl_core::model::ValidationError;
use todoctl_core::{Error, PoolError, StoreError};

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Validation failed (400)
    Validation(ValidationError),

    /// Malformed request that is not a field validation (400)
    BadRequest { message: String },

    /// Resource not found (404)
    NotFound { entity: Entity, id: i64 },

    /// Constraint violation, e.g. duplicate username (409)
    Conflict { message: String },

    /// Worker pool closed, server shutting down (503)
    Unavailable,

    /// Transaction, query or pool failure (500, logged)
    Internal { message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(e) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation_error",
                    "message": e.to_string()
                }),
            ),
            Self::BadRequest { message } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "bad_request",
                    "message": message
                }),
            ),
            Self::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("{} {} not found", entity, id)
                }),
            ),
            Self::Conflict { message } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "conflict",
                    "message": message
                }),
            ),
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "unavailable",
                    "message": "service is shutting down"
                }),
            ),
            Self::Internal { message } => {
                // Log the actual error, return generic message
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "internal_error",
                        "message": "an internal error occurred"
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Validation(e) => Self::Validation(e),
            Error::Store(StoreError::NotFound { entity, id }) => Self::NotFound { entity, id },
            Error::Store(e @ StoreError::ConstraintViolation { .. }) => Self::Conflict {
                message: e.to_string(),
            },
            Error::Pool(PoolError::Closed) => Self::Unavailable,
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use todoctl_core::error::{Action, OpContext, TxStage};

    #[tokio::test]
    async fn validation_error_is_400() {
        let err = ApiError::Validation(ValidationError::Empty { field: "title" });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn not_found_is_404_with_message() {
        let err: ApiError = Error::from(StoreError::not_found(Entity::Task, 9)).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "not_found");
        assert_eq!(json["message"], "task 9 not found");
    }

    #[tokio::test]
    async fn constraint_violation_is_409() {
        let ctx = OpContext::new(Entity::User, Action::Create);
        let err: ApiError = Error::from(StoreError::constraint(ctx, "duplicate username")).into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn closed_pool_is_503() {
        let err: ApiError = Error::from(PoolError::Closed).into();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn commit_failure_is_500_without_details() {
        let err: ApiError = Error::from(StoreError::Transaction {
            context: OpContext::new(Entity::Task, Action::Update).with_id(2),
            stage: TxStage::Commit,
            source: "connection reset".into(),
        })
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!String::from_utf8_lossy(&body).contains("connection reset"));
    }
}

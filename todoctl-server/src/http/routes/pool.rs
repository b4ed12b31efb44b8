//! Worker pool status and runtime resize

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Deserialize;

use todoctl_core::{Error, PoolStatus};

use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Resize request
#[derive(Deserialize)]
pub struct ResizeRequest {
    pub workers: usize,
}

/// GET /pool
async fn status(State(state): State<Arc<AppState>>) -> Json<PoolStatus> {
    Json(state.services.pool().status())
}

/// PUT /pool - replace the worker generation
async fn resize(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResizeRequest>,
) -> Result<Json<PoolStatus>, ApiError> {
    if req.workers == 0 {
        return Err(ApiError::BadRequest {
            message: "workers must be at least 1".into(),
        });
    }
    if req.workers > state.max_pool_workers {
        return Err(ApiError::BadRequest {
            message: format!("workers must be at most {}", state.max_pool_workers),
        });
    }

    let pool = state.services.pool();
    pool.resize(req.workers).await.map_err(Error::from)?;
    tracing::info!(workers = req.workers, "pool resized over HTTP");
    Ok(Json(pool.status()))
}

/// Pool routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/pool", get(status).put(resize))
}

//! Task endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Deserialize;

use todoctl_core::model::{Task, TaskNote, TaskPatch, TaskTitle, ValidationError};

use super::CreatedResponse;
use crate::http::error::ApiError;
use crate::http::extractors::ValidId;
use crate::http::server::AppState;

/// Create task request
#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub user_id: i64,
    pub title: String,
    #[serde(default)]
    pub note: String,
}

/// Update task request. Absent fields keep their stored value.
#[derive(Deserialize, Default)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub note: Option<String>,
    pub done: Option<bool>,
}

impl TryFrom<UpdateTaskRequest> for TaskPatch {
    type Error = ValidationError;

    fn try_from(req: UpdateTaskRequest) -> Result<Self, Self::Error> {
        Ok(TaskPatch {
            title: req.title.as_deref().map(TaskTitle::new).transpose()?,
            note: req.note.as_deref().map(TaskNote::new).transpose()?,
            done: req.done,
        })
    }
}

/// GET /tasks - list all tasks
async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.services.tasks.list_tasks().await?))
}

/// POST /tasks - create a task for an existing user
async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let title = TaskTitle::new(&req.title)?;
    let note = TaskNote::new(&req.note)?;
    let id = state
        .services
        .tasks
        .create_task(req.user_id, title, note)
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// GET /tasks/{id}
async fn get_task(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.services.tasks.get_task(id).await?))
}

/// PUT /tasks/{id} - change title, note or completion
async fn update_task(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    let patch = TaskPatch::try_from(req)?;
    Ok(Json(state.services.tasks.update_task(id, patch).await?))
}

/// DELETE /tasks/{id}
async fn delete_task(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<StatusCode, ApiError> {
    state.services.tasks.delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Task routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_validates_present_fields_only() {
        let patch = TaskPatch::try_from(UpdateTaskRequest {
            done: Some(true),
            ..Default::default()
        })
        .unwrap();
        assert!(patch.title.is_none());
        assert_eq!(patch.done, Some(true));

        let err = TaskPatch::try_from(UpdateTaskRequest {
            title: Some("  ".into()),
            ..Default::default()
        });
        assert!(err.is_err());
    }
}

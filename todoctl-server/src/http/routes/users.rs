//! User endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use todoctl_core::model::{User, UserPatch, Username};

use super::CreatedResponse;
use crate::http::error::ApiError;
use crate::http::extractors::ValidId;
use crate::http::server::AppState;

/// Create user request
#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

/// Update user request
#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
}

/// Username lookup response
#[derive(Serialize)]
pub struct UsernameResponse {
    pub id: i64,
    pub username: String,
}

/// GET /users - list all users
async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.services.users.list_users().await?))
}

/// POST /users - create a user
async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let username = Username::new(&req.username)?;
    let id = state.services.users.create_user(username).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// GET /users/{id}
async fn get_user(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.services.users.get_user(id).await?))
}

/// GET /users/{id}/name
async fn get_username(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<Json<UsernameResponse>, ApiError> {
    let username = state.services.users.get_username(id).await?;
    Ok(Json(UsernameResponse { id, username }))
}

/// PUT /users/{id} - rename a user
async fn update_user(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let patch = UserPatch {
        username: req.username.as_deref().map(Username::new).transpose()?,
    };
    Ok(Json(state.services.users.update_user(id, patch).await?))
}

/// DELETE /users/{id}
async fn delete_user(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<StatusCode, ApiError> {
    state.services.users.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// User routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{id}/name", get(get_username))
}

//! Route tests against the in-memory store.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use todoctl_core::config::CacheConfig;
use todoctl_core::{MemoryCache, MemoryStore, NoopNotifier, Services, WorkerPool};
use todoctl_server::{build_router, AppState};

fn app() -> (Router, Services) {
    let services = Services::new(
        Arc::new(MemoryStore::new()),
        WorkerPool::new(2),
        Arc::new(MemoryCache::new()),
        Arc::new(NoopNotifier),
        &CacheConfig::default(),
    );
    let router = build_router(Arc::new(AppState::new(services.clone())));
    (router, services)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_endpoint() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pool"], "running");
}

#[tokio::test]
async fn user_lifecycle() {
    let (app, _) = app();

    let (status, body) = send(&app, "POST", "/users", Some(json!({"username": "alice"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], 1);

    let (status, body) = send(&app, "GET", "/users/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");

    let (status, body) = send(&app, "PUT", "/users/1", Some(json!({"username": "alicia"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alicia");

    let (_, body) = send(&app, "GET", "/users/1/name", None).await;
    assert_eq!(body["username"], "alicia");

    let (status, _) = send(&app, "DELETE", "/users/1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "GET", "/users/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = send(&app, "DELETE", "/users/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_input_is_400() {
    let (app, _) = app();

    let (status, body) = send(&app, "POST", "/users", Some(json!({"username": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = send(&app, "GET", "/users/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn duplicate_username_is_409() {
    let (app, _) = app();
    send(&app, "POST", "/users", Some(json!({"username": "bob"}))).await;
    let (status, body) = send(&app, "POST", "/users", Some(json!({"username": "bob"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn task_lifecycle() {
    let (app, _) = app();
    send(&app, "POST", "/users", Some(json!({"username": "carol"}))).await;

    let (status, body) = send(
        &app,
        "POST",
        "/tasks",
        Some(json!({"user_id": 1, "title": "write report"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_i64().unwrap();

    let (status, body) = send(&app, "PUT", &format!("/tasks/{id}"), Some(json!({"done": true}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["done"], true);
    assert_eq!(body["title"], "write report");
    assert_eq!(body["note"], "");

    let (_, body) = send(&app, "GET", "/tasks", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", &format!("/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", &format!("/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn task_for_unknown_user_is_404() {
    let (app, _) = app();
    let (status, body) = send(&app, "POST", "/tasks", Some(json!({"user_id": 7, "title": "x"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "user 7 not found");
}

#[tokio::test]
async fn pool_resize_and_status() {
    let (app, services) = app();

    let (status, body) = send(&app, "GET", "/pool", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workers"], 2);

    let (status, body) = send(&app, "PUT", "/pool", Some(json!({"workers": 4}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workers"], 4);
    assert_eq!(services.pool().worker_count(), 4);

    let (status, _) = send(&app, "PUT", "/pool", Some(json!({"workers": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pool_resize_above_max_is_400() {
    let (_, services) = app();
    let state = AppState::new(services.clone()).with_max_pool_workers(8);
    let app = build_router(Arc::new(state));

    let (status, body) = send(&app, "PUT", "/pool", Some(json!({"workers": 100_000_000}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "workers must be at most 8");
    assert_eq!(services.pool().worker_count(), 2);

    let (status, body) = send(&app, "PUT", "/pool", Some(json!({"workers": 8}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workers"], 8);
}

#[tokio::test]
async fn writes_after_close_are_503() {
    let (app, services) = app();
    services.pool().close().await;

    let (status, body) = send(&app, "POST", "/users", Some(json!({"username": "late"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "unavailable");

    let (_, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(body["status"], "draining");
}

//! REST surface tests, driven through the router with in-memory adapters.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn test_app() -> axum::Router {
    coedit::server::create_app(&common::test_config(0))
        .await
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_register_then_login() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/register",
            json!({ "username": "alice", "password": "hunter2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let user = body_json(response).await;
    assert_eq!(user["username"], "alice");
    assert!(user.get("passwordHash").is_none());

    let response = app
        .oneshot(post_json(
            "/api/auth/login",
            json!({ "username": "alice", "password": "hunter2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["username"], "alice");
}

#[tokio::test]
async fn test_register_duplicate_conflicts() {
    let app = test_app().await;
    let request = || {
        post_json(
            "/api/auth/register",
            json!({ "username": "alice", "password": "pw" }),
        )
    };

    let first = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app.oneshot(request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_login_wrong_password_unauthorized() {
    let app = test_app().await;
    app.clone()
        .oneshot(post_json(
            "/api/auth/register",
            json!({ "username": "alice", "password": "pw" }),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/api/auth/login",
            json!({ "username": "alice", "password": "wrong" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reads_require_bearer_token() {
    let app = test_app().await;

    let bare = Request::builder()
        .uri("/api/posts")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(bare).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let config = common::test_config(0);
    let token = common::token_for(&config, "alice");
    let authed = Request::builder()
        .uri("/api/posts")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(authed).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn test_get_missing_post_is_not_found() {
    let app = test_app().await;
    let config = common::test_config(0);
    let token = common::token_for(&config, "alice");

    let request = Request::builder()
        .uri("/api/posts/4f3a2f00-1111-4222-8333-444455556666")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

//! REST account handlers: registration and login.
//!
//! These are the only unauthenticated HTTP endpoints. Login failures for a
//! missing user and a wrong password are indistinguishable to the caller.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::models::User;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ServiceError> {
    let user = state
        .service
        .register_user(&req.username, &req.password)
        .await?;
    tracing::info!(username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ServiceError> {
    let (token, user) = state
        .service
        .login_user(&req.username, &req.password)
        .await?;
    tracing::info!(username = %user.username, "user logged in");
    Ok(Json(AuthResponse { token, user }))
}

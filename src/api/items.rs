//! Metadata read endpoints. Content never travels over HTTP; it lives on
//! the WebSocket path where versions are tracked.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::middleware::AuthUser;
use crate::error::ServiceError;
use crate::models::{CodeFile, Post};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

pub async fn list_posts(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Post>>, ServiceError> {
    let posts = state
        .service
        .list_posts(&user_id, params.limit.max(1), params.offset.max(0))
        .await?;
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Post>, ServiceError> {
    Ok(Json(state.service.get_post(&user_id, id).await?))
}

pub async fn list_code_files(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<CodeFile>>, ServiceError> {
    let files = state
        .service
        .list_code_files(&user_id, params.limit.max(1), params.offset.max(0))
        .await?;
    Ok(Json(files))
}

pub async fn get_code_file(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<CodeFile>, ServiceError> {
    Ok(Json(state.service.get_code_file(&user_id, id).await?))
}

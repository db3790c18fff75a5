//! Service-level error types.
//!
//! `ServiceError` is the single error surface the coordinator and handlers
//! speak. Adapter-level errors (`store::StoreError`, `blob::BlobError`) are
//! mapped into it at the service boundary, so callers never see which
//! backend tripped. Each variant carries a stable wire code used in error
//! frames and an HTTP status used by the REST handlers.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("item not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("invalid item type specified")]
    InvalidItemType,

    /// Client edited against a stale base version. Carries the actual
    /// current version so the client can rebase.
    #[error("version conflict: item is at version {current}")]
    VersionConflict { current: i64 },

    #[error("failed to apply changes to content: {0}")]
    ApplyFailed(String),

    #[error("revert is only allowed for create or snapshot actions")]
    RevertNotAllowed,

    #[error("failed to read or write content storage")]
    StorageFailed,

    /// Content was written but the metadata compare-and-set failed for a
    /// reason other than a version race. The blob may hold orphaned bytes.
    #[error("critical inconsistency between content storage and metadata")]
    Inconsistent,

    #[error("authentication required")]
    Unauthenticated,

    #[error("malformed payload: {0}")]
    BadPayload(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable wire code for error frames.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials | Self::Unauthenticated => "UNAUTHENTICATED",
            Self::UsernameTaken | Self::ApplyFailed(_) | Self::RevertNotAllowed => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::InvalidItemType | Self::BadPayload(_) => "BAD_PAYLOAD",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::StorageFailed | Self::Inconsistent | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for the REST surface.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::UsernameTaken | Self::VersionConflict { .. } | Self::RevertNotAllowed => {
                StatusCode::CONFLICT
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::InvalidItemType | Self::BadPayload(_) | Self::ApplyFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::StorageFailed | Self::Inconsistent | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl axum::response::IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let body = axum::Json(serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        }));
        (self.status(), body).into_response()
    }
}

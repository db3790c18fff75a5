//! Bearer-token middleware for the REST read endpoints.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ServiceError;
use crate::server::AppState;

/// Authenticated identity attached to the request after verification.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(ServiceError::Unauthenticated)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(ServiceError::Unauthenticated)?;

    let user_id = state.service.verify_token(token)?;
    request.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(request).await)
}

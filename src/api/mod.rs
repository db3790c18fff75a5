//! HTTP router: account endpoints, authenticated metadata reads, and the
//! WebSocket upgrade.

use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::handlers as account;
use crate::server::AppState;
use crate::ws::session;

pub mod items;
pub mod middleware;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/posts", get(items::list_posts))
        .route("/api/posts/{id}", get(items::get_post))
        .route("/api/code", get(items::list_code_files))
        .route("/api/code/{id}", get(items::get_code_file))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .route("/api/auth/register", post(account::register))
        .route("/api/auth/login", post(account::login))
        .route("/ws", get(ws_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Upgrade to a WebSocket session. Authentication happens in-band via the
/// `auth` action, so the upgrade itself is open.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(session::MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| session::run(socket, state.service, state.hub))
}

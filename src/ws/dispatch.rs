//! Message dispatch: decode the frame envelope and route by action tag.
//!
//! `auth` is the only action accepted before authentication. Every other
//! action resolves the session's user, runs the matching coordinator
//! operation, replies to the caller (echoing `seq`), and - for mutations
//! other subscribers care about - hands a broadcast to the hub.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::{item_key, ItemType};
use crate::protocol::{
    ApplyChangesRequest, AuthRequest, AuthSuccess, ChangesApplied, ClientFrame, ContentChanged,
    ContentReplaced, ContentRequest, ContentResponse, CreateCodeFileRequest, CreatePostRequest,
    DeleteItemRequest, ErrorPayload, GetHistoryRequest, ItemDeleted, RevertRequest, RevertSuccess,
    ServerFrame, SubscribeRequest, SubscriptionAck,
};
use crate::service::Service;
use crate::ws::session::Session;

pub async fn process_frame(session: &mut Session, service: &Arc<Service>, raw: &str) {
    let frame: ClientFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(session = %session.id, error = %e, "undecodable frame");
            session.send_error(format!("malformed frame: {e}"), "BAD_PAYLOAD", None, None);
            return;
        }
    };
    let seq = frame.seq;

    if frame.action == "auth" {
        handle_auth(session, service, frame.payload, seq);
        return;
    }

    let Some(user_id) = session.authenticated_user().map(String::from) else {
        session.send_error(
            "authentication required",
            "UNAUTHENTICATED",
            Some(&frame.action),
            seq,
        );
        return;
    };

    match frame.action.as_str() {
        "get_content" => handle_get_content(session, service, &user_id, frame.payload, seq).await,
        "apply_changes" => {
            handle_apply_changes(session, service, &user_id, frame.payload, seq).await
        }
        "create_post" => handle_create_post(session, service, &user_id, frame.payload, seq).await,
        "create_codefile" => {
            handle_create_code_file(session, service, &user_id, frame.payload, seq).await
        }
        "delete_item" => handle_delete_item(session, service, &user_id, frame.payload, seq).await,
        "subscribe" => handle_subscribe(session, frame.payload, seq, true).await,
        "unsubscribe" => handle_subscribe(session, frame.payload, seq, false).await,
        "get_history" => handle_get_history(session, service, &user_id, frame.payload, seq).await,
        "revert_action" => handle_revert(session, service, &user_id, frame.payload, seq).await,
        other => {
            session.send_error(
                format!("unknown action: {other}"),
                "UNKNOWN_ACTION",
                Some(other),
                seq,
            );
        }
    }
}

/// Decode an action payload, reporting `BAD_PAYLOAD` on failure.
fn decode<T: DeserializeOwned>(
    session: &Session,
    payload: Value,
    action: &str,
    seq: Option<i64>,
) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            session.send_error(
                format!("invalid {action} payload: {e}"),
                "BAD_PAYLOAD",
                Some(action),
                seq,
            );
            None
        }
    }
}

/// Parse an item type field, reporting `BAD_PAYLOAD` on failure.
fn parse_type(
    session: &Session,
    raw: &str,
    action: &str,
    seq: Option<i64>,
) -> Option<ItemType> {
    match ItemType::parse(raw) {
        Some(item_type) => Some(item_type),
        None => {
            session.send_error(
                format!("invalid item type: {raw}"),
                "BAD_PAYLOAD",
                Some(action),
                seq,
            );
            None
        }
    }
}

fn handle_auth(session: &mut Session, service: &Arc<Service>, payload: Value, seq: Option<i64>) {
    let Some(req) = decode::<AuthRequest>(session, payload, "auth", seq) else {
        return;
    };
    match service.verify_token(&req.token) {
        Ok(user_id) => {
            tracing::info!(session = %session.id, user = %user_id, "session authenticated");
            session.user_id = Some(user_id.clone());
            session.send(ServerFrame::new("auth_success", AuthSuccess { user_id }, seq));
        }
        Err(_) => {
            tracing::debug!(session = %session.id, "authentication failed");
            session.send(ServerFrame::new(
                "auth_error",
                ErrorPayload {
                    message: "invalid or expired token".to_string(),
                    code: "UNAUTHENTICATED",
                    action: Some("auth".to_string()),
                    seq,
                    current_version: None,
                },
                seq,
            ));
        }
    }
}

async fn handle_get_content(
    session: &Session,
    service: &Arc<Service>,
    user_id: &str,
    payload: Value,
    seq: Option<i64>,
) {
    let Some(req) = decode::<ContentRequest>(session, payload, "get_content", seq) else {
        return;
    };
    let Some(item_type) = parse_type(session, &req.item_type, "get_content", seq) else {
        return;
    };

    match service
        .get_item_content(user_id, req.item_id, &req.item_type)
        .await
    {
        Ok((content, version)) => session.send(ServerFrame::new(
            "content_response",
            ContentResponse {
                item_id: req.item_id,
                item_type,
                content,
                version,
            },
            seq,
        )),
        Err(e) => session.send_service_error(&e, "get_content", seq),
    }
}

async fn handle_apply_changes(
    session: &Session,
    service: &Arc<Service>,
    user_id: &str,
    payload: Value,
    seq: Option<i64>,
) {
    let Some(req) = decode::<ApplyChangesRequest>(session, payload, "apply_changes", seq) else {
        return;
    };
    let Some(item_type) = parse_type(session, &req.item_type, "apply_changes", seq) else {
        return;
    };
    if req.changes.is_empty() {
        session.send_error(
            "changes must not be empty",
            "BAD_PAYLOAD",
            Some("apply_changes"),
            seq,
        );
        return;
    }

    let (new_version, applied) = match service
        .apply_item_changes(
            user_id,
            req.item_id,
            &req.item_type,
            req.base_version,
            req.changes,
        )
        .await
    {
        Ok(result) => result,
        Err(e) => {
            session.send_service_error(&e, "apply_changes", seq);
            return;
        }
    };

    session.send(ServerFrame::new(
        "changes_applied",
        ChangesApplied {
            item_id: req.item_id,
            item_type,
            new_version,
            message: "Changes applied successfully",
        },
        seq,
    ));

    // Mirror the applied delta to the item's other subscribers.
    let broadcast = ServerFrame::new(
        "content_changed",
        ContentChanged {
            item_id: req.item_id,
            item_type,
            changes: applied,
            new_version,
            originator: user_id.to_string(),
        },
        None,
    );
    session
        .hub
        .broadcast(
            item_key(item_type, req.item_id),
            broadcast.encode(),
            Some(session.id),
        )
        .await;
}

async fn handle_create_post(
    session: &Session,
    service: &Arc<Service>,
    user_id: &str,
    payload: Value,
    seq: Option<i64>,
) {
    let Some(req) = decode::<CreatePostRequest>(session, payload, "create_post", seq) else {
        return;
    };
    match service
        .create_post(user_id, &req.title, &req.initial_content)
        .await
    {
        Ok(post) => session.send(ServerFrame::new("create_success", post, seq)),
        Err(e) => session.send_service_error(&e, "create_post", seq),
    }
}

async fn handle_create_code_file(
    session: &Session,
    service: &Arc<Service>,
    user_id: &str,
    payload: Value,
    seq: Option<i64>,
) {
    let Some(req) = decode::<CreateCodeFileRequest>(session, payload, "create_codefile", seq)
    else {
        return;
    };
    match service
        .create_code_file(user_id, &req.file_name, &req.language, &req.initial_content)
        .await
    {
        Ok(file) => session.send(ServerFrame::new("create_success", file, seq)),
        Err(e) => session.send_service_error(&e, "create_codefile", seq),
    }
}

async fn handle_delete_item(
    session: &Session,
    service: &Arc<Service>,
    user_id: &str,
    payload: Value,
    seq: Option<i64>,
) {
    let Some(req) = decode::<DeleteItemRequest>(session, payload, "delete_item", seq) else {
        return;
    };
    let Some(item_type) = parse_type(session, &req.item_type, "delete_item", seq) else {
        return;
    };

    if let Err(e) = service.delete_item(user_id, req.item_id, &req.item_type).await {
        session.send_service_error(&e, "delete_item", seq);
        return;
    }

    let payload = ItemDeleted {
        item_id: req.item_id,
        item_type,
    };
    session.send(ServerFrame::new("delete_success", &payload, seq));

    let broadcast = ServerFrame::new("item_deleted", &payload, None);
    session
        .hub
        .broadcast(
            item_key(item_type, req.item_id),
            broadcast.encode(),
            Some(session.id),
        )
        .await;
}

async fn handle_subscribe(
    session: &Session,
    payload: Value,
    seq: Option<i64>,
    subscribe: bool,
) {
    let action = if subscribe { "subscribe" } else { "unsubscribe" };
    let Some(req) = decode::<SubscribeRequest>(session, payload, action, seq) else {
        return;
    };
    let Some(item_type) = parse_type(session, &req.item_type, action, seq) else {
        return;
    };

    let key = item_key(item_type, req.item_id);
    if subscribe {
        session.hub.subscribe(session.id, key).await;
    } else {
        session.hub.unsubscribe(session.id, key).await;
    }

    let tag = if subscribe {
        "subscribe_success"
    } else {
        "unsubscribe_success"
    };
    session.send(ServerFrame::new(
        tag,
        SubscriptionAck {
            item_id: req.item_id,
            item_type,
        },
        seq,
    ));
}

async fn handle_get_history(
    session: &Session,
    service: &Arc<Service>,
    user_id: &str,
    payload: Value,
    seq: Option<i64>,
) {
    let Some(req) = decode::<GetHistoryRequest>(session, payload, "get_history", seq) else {
        return;
    };
    if parse_type(session, &req.item_type, "get_history", seq).is_none() {
        return;
    }

    let limit = req.limit.unwrap_or(50) as i64;
    match service
        .get_history(user_id, req.item_id, &req.item_type, limit)
        .await
    {
        Ok(entries) => session.send(ServerFrame::new("history_data", entries, seq)),
        Err(e) => session.send_service_error(&e, "get_history", seq),
    }
}

async fn handle_revert(
    session: &Session,
    service: &Arc<Service>,
    user_id: &str,
    payload: Value,
    seq: Option<i64>,
) {
    let Some(req) = decode::<RevertRequest>(session, payload, "revert_action", seq) else {
        return;
    };

    let outcome = match service.revert_to_action(user_id, req.target_log_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            session.send_service_error(&e, "revert_action", seq);
            return;
        }
    };

    session.send(ServerFrame::new(
        "revert_success",
        RevertSuccess {
            message: format!(
                "Reverted item {} to the state recorded by log {}",
                outcome.item_id, req.target_log_id
            ),
            item_id: outcome.item_id,
            item_type: outcome.item_type,
            new_version: outcome.new_version,
        },
        seq,
    ));

    // Reverts have no delta to mirror; other subscribers get the full
    // materialized content instead.
    let broadcast = ServerFrame::new(
        "content_replaced",
        ContentReplaced {
            item_id: outcome.item_id,
            item_type: outcome.item_type,
            content: outcome.content,
            new_version: outcome.new_version,
            originator: user_id.to_string(),
        },
        None,
    );
    session
        .hub
        .broadcast(
            item_key(outcome.item_type, outcome.item_id),
            broadcast.encode(),
            Some(session.id),
        )
        .await;
}

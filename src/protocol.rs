//! WebSocket wire protocol.
//!
//! Every frame is a JSON object `{action, payload, seq?}`. Client-initiated
//! requests may carry a `seq` token which is echoed on the direct response
//! (success or error); broadcasts never carry one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Change, ItemType};

/// Incoming frame envelope.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub seq: Option<i64>,
}

/// Outgoing frame envelope.
#[derive(Debug, Serialize)]
pub struct ServerFrame {
    pub action: &'static str,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
}

impl ServerFrame {
    pub fn new(action: &'static str, payload: impl Serialize, seq: Option<i64>) -> Self {
        Self {
            action,
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
            seq,
        }
    }

    /// Serialize for the wire. Infallible by construction: the payload is
    /// already a `Value`.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

// --- Request payloads ---

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub item_id: Uuid,
    pub item_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyChangesRequest {
    pub item_id: Uuid,
    pub item_type: String,
    /// The version the client based its changes on.
    pub base_version: i64,
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub title: String,
    #[serde(default)]
    pub initial_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCodeFileRequest {
    pub file_name: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub initial_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItemRequest {
    pub item_id: Uuid,
    pub item_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub item_id: Uuid,
    pub item_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHistoryRequest {
    pub item_id: Uuid,
    pub item_type: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertRequest {
    /// History log entry to revert TO (must be a create or snapshot).
    pub target_log_id: Uuid,
}

// --- Response payloads ---

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
    /// Set on `VERSION_CONFLICT` so the client can rebase without a
    /// round-trip.
    #[serde(rename = "currentVersion", skip_serializing_if = "Option::is_none")]
    pub current_version: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccess {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    pub item_id: Uuid,
    pub item_type: ItemType,
    pub content: String,
    pub version: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesApplied {
    pub item_id: Uuid,
    pub item_type: ItemType,
    pub new_version: i64,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionAck {
    pub item_id: Uuid,
    pub item_type: ItemType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertSuccess {
    pub message: String,
    pub item_id: Uuid,
    pub item_type: ItemType,
    pub new_version: i64,
}

// --- Broadcast payloads ---

/// Sent to every other subscriber of an item after a successful patch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChanged {
    pub item_id: Uuid,
    pub item_type: ItemType,
    pub changes: Vec<Change>,
    pub new_version: i64,
    /// Who made the change, for client-side bookkeeping.
    pub originator: String,
}

/// Sent to every other subscriber when an item is deleted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDeleted {
    pub item_id: Uuid,
    pub item_type: ItemType,
}

/// Sent to every other subscriber after a revert. Unlike `ContentChanged`
/// this carries the full materialized content, since no delta exists.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentReplaced {
    pub item_id: Uuid,
    pub item_type: ItemType,
    pub content: String,
    pub new_version: i64,
    pub originator: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_decodes_without_seq() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"action":"auth","payload":{"token":"t"}}"#).unwrap();
        assert_eq!(frame.action, "auth");
        assert_eq!(frame.seq, None);
    }

    #[test]
    fn test_server_frame_omits_empty_seq() {
        let frame = ServerFrame::new("item_deleted", serde_json::json!({}), None);
        let encoded = frame.encode();
        assert!(!encoded.contains("seq"));

        let with_seq = ServerFrame::new("subscribe_success", serde_json::json!({}), Some(9));
        assert!(with_seq.encode().contains("\"seq\":9"));
    }

    #[test]
    fn test_apply_changes_request_shape() {
        let req: ApplyChangesRequest = serde_json::from_str(
            r#"{"itemId":"8c7f2f8e-0b1a-4f57-9d17-0e5b3c2a1d00","itemType":"post",
                "baseVersion":1,"changes":[{"line":0,"column":3,"text":"d","removed":0}]}"#,
        )
        .unwrap();
        assert_eq!(req.base_version, 1);
        assert_eq!(req.changes.len(), 1);
        assert_eq!(req.changes[0].column, 3);
    }

    #[test]
    fn test_error_payload_shape() {
        let payload = ErrorPayload {
            message: "nope".into(),
            code: "NOT_FOUND",
            action: Some("get_content".into()),
            seq: None,
            current_version: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert!(json.get("seq").is_none());
        assert!(json.get("currentVersion").is_none());
    }
}

//! End-to-end suite: a real server on a loopback port, driven through real
//! WebSocket clients.

mod common;

use std::time::Duration;

use serde_json::json;

use common::*;

#[tokio::test]
async fn test_actions_require_authentication() {
    let (addr, _config) = spawn_server(0).await;
    let mut ws = connect(addr).await;

    send_action(
        &mut ws,
        "get_content",
        json!({ "itemId": "9b2d7f61-49c5-4d44-8a29-8d9f72a6a000", "itemType": "post" }),
        Some(1),
    )
    .await;

    let reply = recv_frame(&mut ws).await;
    assert_eq!(reply["action"], "error");
    assert_eq!(reply["payload"]["code"], "UNAUTHENTICATED");
    assert_eq!(reply["seq"], 1);
}

#[tokio::test]
async fn test_auth_with_garbage_token_fails() {
    let (addr, _config) = spawn_server(0).await;
    let mut ws = connect(addr).await;

    send_action(&mut ws, "auth", json!({ "token": "junk" }), Some(7)).await;
    let reply = recv_frame(&mut ws).await;
    assert_eq!(reply["action"], "auth_error");
    assert_eq!(reply["payload"]["code"], "UNAUTHENTICATED");
    assert_eq!(reply["seq"], 7);
}

#[tokio::test]
async fn test_unknown_action_reports_code() {
    let (addr, config) = spawn_server(0).await;
    let mut ws = connect_authed(addr, &config, "alice").await;

    send_action(&mut ws, "make_coffee", json!({}), Some(3)).await;
    let reply = recv_frame(&mut ws).await;
    assert_eq!(reply["action"], "error");
    assert_eq!(reply["payload"]["code"], "UNKNOWN_ACTION");
    assert_eq!(reply["seq"], 3);
}

#[tokio::test]
async fn test_happy_patch_roundtrip() {
    let (addr, config) = spawn_server(0).await;
    let mut ws = connect_authed(addr, &config, "alice").await;

    send_action(
        &mut ws,
        "create_post",
        json!({ "title": "Hello", "initialContent": "abc\n" }),
        Some(1),
    )
    .await;
    let created = recv_frame(&mut ws).await;
    assert_eq!(created["action"], "create_success");
    assert_eq!(created["seq"], 1);
    assert_eq!(created["payload"]["version"], 1);
    let item_id = created["payload"]["id"].as_str().unwrap().to_string();

    send_action(
        &mut ws,
        "apply_changes",
        json!({
            "itemId": item_id,
            "itemType": "post",
            "baseVersion": 1,
            "changes": [{ "line": 0, "column": 3, "removed": 0, "text": "d" }],
        }),
        Some(2),
    )
    .await;
    let applied = recv_frame(&mut ws).await;
    assert_eq!(applied["action"], "changes_applied");
    assert_eq!(applied["payload"]["newVersion"], 2);
    assert_eq!(applied["seq"], 2);

    send_action(
        &mut ws,
        "get_content",
        json!({ "itemId": item_id, "itemType": "post" }),
        Some(3),
    )
    .await;
    let content = recv_frame(&mut ws).await;
    assert_eq!(content["action"], "content_response");
    assert_eq!(content["payload"]["content"], "abcd\n");
    assert_eq!(content["payload"]["version"], 2);
}

#[tokio::test]
async fn test_broadcast_reaches_other_subscribers_once() {
    let (addr, config) = spawn_server(0).await;
    let mut x = connect_authed(addr, &config, "alice").await;
    let mut y = connect_authed(addr, &config, "alice").await;
    let mut z = connect_authed(addr, &config, "alice").await;

    send_action(
        &mut x,
        "create_post",
        json!({ "title": "Shared", "initialContent": "" }),
        Some(1),
    )
    .await;
    let created = recv_frame(&mut x).await;
    let item_id = created["payload"]["id"].as_str().unwrap().to_string();

    for ws in [&mut x, &mut y, &mut z] {
        send_action(
            ws,
            "subscribe",
            json!({ "itemId": item_id, "itemType": "post" }),
            Some(2),
        )
        .await;
        let ack = recv_frame(ws).await;
        assert_eq!(ack["action"], "subscribe_success");
    }

    send_action(
        &mut x,
        "apply_changes",
        json!({
            "itemId": item_id,
            "itemType": "post",
            "baseVersion": 1,
            "changes": [{ "line": 0, "column": 0, "removed": 0, "text": "hi" }],
        }),
        Some(3),
    )
    .await;
    let applied = recv_frame(&mut x).await;
    assert_eq!(applied["action"], "changes_applied");

    for ws in [&mut y, &mut z] {
        let broadcast = recv_frame(ws).await;
        assert_eq!(broadcast["action"], "content_changed");
        assert_eq!(broadcast["payload"]["newVersion"], 2);
        assert_eq!(broadcast["payload"]["originator"], "alice");
        assert_eq!(broadcast["payload"]["changes"][0]["text"], "hi");
        assert!(broadcast.get("seq").is_none());
        // Exactly one broadcast each.
        assert_silent(ws, Duration::from_millis(300)).await;
    }

    // The originator gets its direct reply only, never the mirror.
    assert_silent(&mut x, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_stale_base_version_conflicts() {
    let (addr, config) = spawn_server(0).await;
    let mut a = connect_authed(addr, &config, "alice").await;
    let mut b = connect_authed(addr, &config, "alice").await;

    send_action(
        &mut a,
        "create_post",
        json!({ "title": "Race", "initialContent": "abc\n" }),
        Some(1),
    )
    .await;
    let created = recv_frame(&mut a).await;
    let item_id = created["payload"]["id"].as_str().unwrap().to_string();

    send_action(
        &mut a,
        "apply_changes",
        json!({
            "itemId": item_id,
            "itemType": "post",
            "baseVersion": 1,
            "changes": [{ "line": 0, "column": 3, "removed": 0, "text": "d" }],
        }),
        Some(2),
    )
    .await;
    assert_eq!(recv_frame(&mut a).await["action"], "changes_applied");

    // B still bases its edit on version 1.
    send_action(
        &mut b,
        "apply_changes",
        json!({
            "itemId": item_id,
            "itemType": "post",
            "baseVersion": 1,
            "changes": [{ "line": 0, "column": 0, "removed": 0, "text": "z" }],
        }),
        Some(9),
    )
    .await;
    let conflict = recv_frame(&mut b).await;
    assert_eq!(conflict["action"], "error");
    assert_eq!(conflict["payload"]["code"], "VERSION_CONFLICT");
    assert_eq!(conflict["payload"]["currentVersion"], 2);
    assert_eq!(conflict["seq"], 9);

    // Only A's write landed.
    send_action(
        &mut b,
        "get_content",
        json!({ "itemId": item_id, "itemType": "post" }),
        Some(10),
    )
    .await;
    let content = recv_frame(&mut b).await;
    assert_eq!(content["payload"]["content"], "abcd\n");
    assert_eq!(content["payload"]["version"], 2);
}

#[tokio::test]
async fn test_revert_restores_snapshot_and_replaces_content() {
    let (addr, config) = spawn_server(0).await;
    let mut editor = connect_authed(addr, &config, "alice").await;
    let mut watcher = connect_authed(addr, &config, "alice").await;

    send_action(
        &mut editor,
        "create_codefile",
        json!({ "fileName": "main.rs", "language": "rust", "initialContent": "A" }),
        Some(1),
    )
    .await;
    let created = recv_frame(&mut editor).await;
    assert_eq!(created["action"], "create_success");
    let item_id = created["payload"]["id"].as_str().unwrap().to_string();

    for ws in [&mut editor, &mut watcher] {
        send_action(
            ws,
            "subscribe",
            json!({ "itemId": item_id, "itemType": "codefile" }),
            None,
        )
        .await;
        assert_eq!(recv_frame(ws).await["action"], "subscribe_success");
    }

    send_action(
        &mut editor,
        "apply_changes",
        json!({
            "itemId": item_id,
            "itemType": "codefile",
            "baseVersion": 1,
            "changes": [{ "line": 0, "column": 1, "removed": 0, "text": "B" }],
        }),
        Some(2),
    )
    .await;
    assert_eq!(recv_frame(&mut editor).await["action"], "changes_applied");
    assert_eq!(recv_frame(&mut watcher).await["action"], "content_changed");

    send_action(
        &mut editor,
        "get_history",
        json!({ "itemId": item_id, "itemType": "codefile" }),
        Some(3),
    )
    .await;
    let history = recv_frame(&mut editor).await;
    assert_eq!(history["action"], "history_data");
    let create_log = history["payload"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["action"] == "create")
        .expect("create entry present");
    let target_log_id = create_log["id"].as_str().unwrap().to_string();

    send_action(
        &mut editor,
        "revert_action",
        json!({ "targetLogId": target_log_id }),
        Some(4),
    )
    .await;
    let reverted = recv_frame(&mut editor).await;
    assert_eq!(reverted["action"], "revert_success");
    assert_eq!(reverted["payload"]["newVersion"], 3);
    assert_eq!(reverted["seq"], 4);

    // Other subscribers receive the full re-materialized content.
    let replaced = recv_frame(&mut watcher).await;
    assert_eq!(replaced["action"], "content_replaced");
    assert_eq!(replaced["payload"]["content"], "A");
    assert_eq!(replaced["payload"]["newVersion"], 3);

    send_action(
        &mut editor,
        "get_content",
        json!({ "itemId": item_id, "itemType": "codefile" }),
        Some(5),
    )
    .await;
    let content = recv_frame(&mut editor).await;
    assert_eq!(content["payload"]["content"], "A");
    assert_eq!(content["payload"]["version"], 3);
}

#[tokio::test]
async fn test_delete_broadcasts_to_subscribers() {
    let (addr, config) = spawn_server(0).await;
    let mut owner = connect_authed(addr, &config, "alice").await;
    let mut watcher = connect_authed(addr, &config, "alice").await;

    send_action(
        &mut owner,
        "create_post",
        json!({ "title": "Doomed", "initialContent": "x" }),
        Some(1),
    )
    .await;
    let created = recv_frame(&mut owner).await;
    let item_id = created["payload"]["id"].as_str().unwrap().to_string();

    send_action(
        &mut watcher,
        "subscribe",
        json!({ "itemId": item_id, "itemType": "post" }),
        None,
    )
    .await;
    assert_eq!(recv_frame(&mut watcher).await["action"], "subscribe_success");

    send_action(
        &mut owner,
        "delete_item",
        json!({ "itemId": item_id, "itemType": "post" }),
        Some(2),
    )
    .await;
    let deleted = recv_frame(&mut owner).await;
    assert_eq!(deleted["action"], "delete_success");
    assert_eq!(deleted["seq"], 2);

    let notice = recv_frame(&mut watcher).await;
    assert_eq!(notice["action"], "item_deleted");
    assert_eq!(notice["payload"]["itemId"], item_id.as_str());
}

#[tokio::test]
async fn test_foreign_items_are_invisible() {
    let (addr, config) = spawn_server(0).await;
    let mut alice = connect_authed(addr, &config, "alice").await;
    let mut mallory = connect_authed(addr, &config, "mallory").await;

    send_action(
        &mut alice,
        "create_post",
        json!({ "title": "Private", "initialContent": "secret" }),
        Some(1),
    )
    .await;
    let created = recv_frame(&mut alice).await;
    let item_id = created["payload"]["id"].as_str().unwrap().to_string();

    send_action(
        &mut mallory,
        "get_content",
        json!({ "itemId": item_id, "itemType": "post" }),
        Some(2),
    )
    .await;
    let reply = recv_frame(&mut mallory).await;
    assert_eq!(reply["action"], "error");
    assert_eq!(reply["payload"]["code"], "PERMISSION_DENIED");
}

#[tokio::test]
async fn test_snapshot_cadence_over_wire() {
    let (addr, config) = spawn_server(3).await;
    let mut ws = connect_authed(addr, &config, "alice").await;

    send_action(
        &mut ws,
        "create_post",
        json!({ "title": "Snap", "initialContent": "" }),
        Some(1),
    )
    .await;
    let created = recv_frame(&mut ws).await;
    let item_id = created["payload"]["id"].as_str().unwrap().to_string();

    for base in 1..=3 {
        send_action(
            &mut ws,
            "apply_changes",
            json!({
                "itemId": item_id,
                "itemType": "post",
                "baseVersion": base,
                "changes": [{ "line": 0, "column": 0, "removed": 0, "text": "x" }],
            }),
            None,
        )
        .await;
        assert_eq!(recv_frame(&mut ws).await["action"], "changes_applied");
    }

    send_action(
        &mut ws,
        "get_history",
        json!({ "itemId": item_id, "itemType": "post" }),
        Some(2),
    )
    .await;
    let history = recv_frame(&mut ws).await;
    let snapshots: Vec<_> = history["payload"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["action"] == "snapshot")
        .collect();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0]["itemVersion"], 4);
}

#![allow(dead_code)]

//! Shared helpers for the integration and end-to-end suites.
//!
//! Servers are assembled from the in-memory adapters so every test is
//! hermetic: no database, no object storage, no network beyond the
//! loopback WebSocket.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use coedit::config::{
    CacheConfig, Config, DatabaseConfig, JwtConfig, ServerConfig, SnapshotConfig, StorageConfig,
};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config(snapshot_interval: u32) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
            expiration: Duration::from_secs(3600),
        },
        database: DatabaseConfig {
            kind: "memory".to_string(),
            url: String::new(),
        },
        storage: StorageConfig {
            kind: "memory".to_string(),
            s3_bucket: String::new(),
            s3_endpoint: String::new(),
            s3_force_path_style: false,
            local_dir: String::new(),
        },
        cache: CacheConfig { enabled: true },
        snapshot: SnapshotConfig {
            interval_changes: snapshot_interval,
        },
    }
}

/// Boot a server on an ephemeral port; returns its address and config.
pub async fn spawn_server(snapshot_interval: u32) -> (SocketAddr, Config) {
    let config = test_config(snapshot_interval);
    let app = coedit::server::create_app(&config).await.unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, config)
}

pub fn token_for(config: &Config, username: &str) -> String {
    coedit::auth::jwt::create_token(&config.jwt, username).unwrap()
}

pub async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    ws
}

pub async fn send_action(ws: &mut WsClient, action: &str, payload: Value, seq: Option<i64>) {
    let mut frame = json!({ "action": action, "payload": payload });
    if let Some(seq) = seq {
        frame["seq"] = json!(seq);
    }
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

/// Receive the next JSON frame, skipping protocol-level ping/pong noise.
/// Panics if nothing arrives within `RECV_TIMEOUT`.
pub async fn recv_frame(ws: &mut WsClient) -> Value {
    loop {
        let message = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("websocket error");
        match message {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

/// Assert that no text frame arrives within the window. Pings are ignored.
pub async fn assert_silent(ws: &mut WsClient, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        match tokio::time::timeout(remaining, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(Some(Ok(Message::Text(text)))) => {
                panic!("expected silence, got frame: {text}")
            }
            Ok(other) => panic!("expected silence, got: {other:?}"),
        }
    }
}

/// Connect and authenticate in one step.
pub async fn connect_authed(addr: SocketAddr, config: &Config, username: &str) -> WsClient {
    let mut ws = connect(addr).await;
    let token = token_for(config, username);
    send_action(&mut ws, "auth", json!({ "token": token }), None).await;
    let reply = recv_frame(&mut ws).await;
    assert_eq!(reply["action"], "auth_success", "auth failed: {reply}");
    ws
}

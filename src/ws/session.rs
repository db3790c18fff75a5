//! Per-connection session: read pump, write pump, outbound queue.
//!
//! A session starts unauthenticated; the only action accepted in that state
//! is `auth`. The read pump enforces a rolling read deadline refreshed by
//! every incoming frame (pongs included); the write pump drains the bounded
//! outbound queue under a per-write deadline and keeps the peer's deadline
//! fresh with periodic pings. Hub-side eviction closes the session's
//! shutdown signal, which the write pump answers with a close frame.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::protocol::{ErrorPayload, ServerFrame};
use crate::service::Service;
use crate::ws::dispatch;
use crate::ws::hub::{HubHandle, SessionHandle, SessionId, OUTBOUND_QUEUE_CAPACITY};

/// Maximum inbound frame size: 2 MiB, sized for whole-document pastes.
pub const MAX_MESSAGE_SIZE: usize = 2048 * 1024;

/// Time allowed without any inbound frame (messages or pongs).
const READ_DEADLINE: Duration = Duration::from_secs(60);

/// Time allowed for a single outbound write.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// Ping cadence. Must stay under `READ_DEADLINE` so the peer's replies keep
/// resetting our read deadline.
const PING_PERIOD: Duration = Duration::from_secs(54);

pub struct Session {
    pub id: SessionId,
    /// Set on successful `auth`; `None` means unauthenticated.
    pub user_id: Option<String>,
    out: mpsc::Sender<String>,
    pub hub: HubHandle,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn authenticated_user(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Non-blocking enqueue of a direct response. If the queue is full the
    /// frame is dropped; the hub's eviction policy deals with consumers
    /// that stay full.
    pub fn send(&self, frame: ServerFrame) {
        if self.out.try_send(frame.encode()).is_err() {
            tracing::warn!(session = %self.id, action = frame.action,
                "outbound queue full, dropping direct response");
        }
    }

    pub fn send_error(
        &self,
        message: impl Into<String>,
        code: &'static str,
        action: Option<&str>,
        seq: Option<i64>,
    ) {
        self.send(ServerFrame::new(
            "error",
            ErrorPayload {
                message: message.into(),
                code,
                action: action.map(String::from),
                seq,
                current_version: None,
            },
            seq,
        ));
    }

    pub fn send_service_error(&self, err: &ServiceError, action: &str, seq: Option<i64>) {
        let current_version = match err {
            ServiceError::VersionConflict { current } => Some(*current),
            _ => None,
        };
        self.send(ServerFrame::new(
            "error",
            ErrorPayload {
                message: err.to_string(),
                code: err.code(),
                action: Some(action.to_string()),
                seq,
                current_version,
            },
            seq,
        ));
    }
}

/// Drive one WebSocket connection to completion.
pub async fn run(socket: WebSocket, service: Arc<Service>, hub: HubHandle) {
    let id = Uuid::new_v4();
    let (ws_tx, ws_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    hub.register(SessionHandle::new(id, out_tx.clone(), shutdown_tx))
        .await;

    let mut session = Session {
        id,
        user_id: None,
        out: out_tx,
        hub: hub.clone(),
    };

    let writer = tokio::spawn(write_pump(id, ws_tx, out_rx, shutdown_rx));
    read_pump(&mut session, &service, ws_rx).await;

    // Read side done: unregister (dropping the hub's queue sender and
    // shutdown signal) and release our own sender so the write pump drains
    // and exits.
    hub.unregister(id).await;
    drop(session);
    let _ = writer.await;
    tracing::debug!(session = %id, "session closed");
}

async fn read_pump(
    session: &mut Session,
    service: &Arc<Service>,
    mut ws_rx: SplitStream<WebSocket>,
) {
    loop {
        let frame = match tokio::time::timeout(READ_DEADLINE, ws_rx.next()).await {
            Err(_) => {
                tracing::debug!(session = %session.id, "read deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(session = %session.id, error = %e, "read error");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                dispatch::process_frame(session, service, trimmed).await;
            }
            Message::Close(_) => break,
            // Pongs and pings only serve to refresh the read deadline;
            // binary frames are ignored outright.
            Message::Pong(_) | Message::Ping(_) | Message::Binary(_) => {}
        }
    }
}

async fn write_pump(
    id: SessionId,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(PING_PERIOD);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            maybe = out_rx.recv() => match maybe {
                Some(message) => {
                    let write = ws_tx.send(Message::Text(message.into()));
                    match tokio::time::timeout(WRITE_DEADLINE, write).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::debug!(session = %id, error = %e, "write error");
                            break;
                        }
                        Err(_) => {
                            tracing::debug!(session = %id, "write deadline expired");
                            break;
                        }
                    }
                }
                // Queue closed: every sender (session + hub) is gone.
                None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            },
            changed = shutdown.changed() => {
                // Hub dropped the handle (eviction) or flagged shutdown.
                if changed.is_err() || *shutdown.borrow() {
                    tracing::debug!(session = %id, "hub closed session");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
            _ = ticker.tick() => {
                let ping = ws_tx.send(Message::Ping(Vec::new().into()));
                match tokio::time::timeout(WRITE_DEADLINE, ping).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(session = %id, error = %e, "ping failed");
                        break;
                    }
                    Err(_) => {
                        tracing::debug!(session = %id, "ping deadline expired");
                        break;
                    }
                }
            }
        }
    }
}

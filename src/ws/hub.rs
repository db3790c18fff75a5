//! Subscription hub.
//!
//! The hub owns the per-item subscriber sets. All map mutations flow
//! through a single event loop over a command channel, so no lock guards
//! the maps. Delivery to a session is a non-blocking enqueue onto its
//! bounded outbound queue: a full queue marks the consumer dead, the
//! message is dropped for that consumer, and the session is unregistered
//! (which closes its queue and tears the connection down). A slow
//! subscriber can therefore never stall the edit coordinator or its peers.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

pub type SessionId = Uuid;

/// Capacity of the hub's command channel. Large enough that submitting an
/// event is near-instant in practice.
const COMMAND_BUFFER: usize = 256;

/// Per-session outbound queue depth. A session that falls this many
/// messages behind is evicted.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// A session as the hub sees it: an id, the producer side of its outbound
/// queue, and the shutdown signal whose drop tells the session's write pump
/// to close the connection. The session's write pump owns the consumer
/// side of the queue.
pub struct SessionHandle {
    pub id: SessionId,
    sender: mpsc::Sender<String>,
    _shutdown: watch::Sender<bool>,
}

impl SessionHandle {
    pub fn new(id: SessionId, sender: mpsc::Sender<String>, shutdown: watch::Sender<bool>) -> Self {
        Self {
            id,
            sender,
            _shutdown: shutdown,
        }
    }
}

enum Command {
    Register(SessionHandle),
    Unregister(SessionId),
    Subscribe {
        session: SessionId,
        item_key: String,
    },
    Unsubscribe {
        session: SessionId,
        item_key: String,
    },
    Broadcast {
        item_key: String,
        message: String,
        originator: Option<SessionId>,
    },
}

/// Cheap cloneable handle for submitting hub events.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<Command>,
}

impl HubHandle {
    pub async fn register(&self, session: SessionHandle) {
        let _ = self.tx.send(Command::Register(session)).await;
    }

    pub async fn unregister(&self, session: SessionId) {
        let _ = self.tx.send(Command::Unregister(session)).await;
    }

    pub async fn subscribe(&self, session: SessionId, item_key: String) {
        let _ = self
            .tx
            .send(Command::Subscribe { session, item_key })
            .await;
    }

    pub async fn unsubscribe(&self, session: SessionId, item_key: String) {
        let _ = self
            .tx
            .send(Command::Unsubscribe { session, item_key })
            .await;
    }

    /// Enqueue `message` to every subscriber of `item_key` except the
    /// originator. Delivery order per subscriber matches submission order.
    pub async fn broadcast(&self, item_key: String, message: String, originator: Option<SessionId>) {
        let _ = self
            .tx
            .send(Command::Broadcast {
                item_key,
                message,
                originator,
            })
            .await;
    }
}

pub struct Hub {
    sessions: HashMap<SessionId, SessionHandle>,
    subscribers: HashMap<String, HashSet<SessionId>>,
    /// Reverse index so unregister can clean every subscription.
    memberships: HashMap<SessionId, HashSet<String>>,
}

impl Hub {
    /// Start the hub event loop; returns the handle for submitting events.
    pub fn spawn() -> HubHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let hub = Hub {
            sessions: HashMap::new(),
            subscribers: HashMap::new(),
            memberships: HashMap::new(),
        };
        tokio::spawn(hub.run(rx));
        tracing::info!("subscription hub started");
        HubHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Register(handle) => {
                    tracing::debug!(session = %handle.id, total = self.sessions.len() + 1,
                        "session registered");
                    self.sessions.insert(handle.id, handle);
                }
                Command::Unregister(id) => self.remove_session(id),
                Command::Subscribe { session, item_key } => {
                    if !self.sessions.contains_key(&session) {
                        continue;
                    }
                    self.subscribers
                        .entry(item_key.clone())
                        .or_default()
                        .insert(session);
                    self.memberships.entry(session).or_default().insert(item_key);
                }
                Command::Unsubscribe { session, item_key } => {
                    if let Some(set) = self.subscribers.get_mut(&item_key) {
                        set.remove(&session);
                        if set.is_empty() {
                            self.subscribers.remove(&item_key);
                        }
                    }
                    if let Some(keys) = self.memberships.get_mut(&session) {
                        keys.remove(&item_key);
                    }
                }
                Command::Broadcast {
                    item_key,
                    message,
                    originator,
                } => {
                    let dead = self.dispatch(&item_key, &message, originator);
                    for id in dead {
                        tracing::warn!(session = %id, item_key = %item_key,
                            "outbound queue full, evicting slow subscriber");
                        self.remove_session(id);
                    }
                }
            }
        }
    }

    /// Enqueue to every live subscriber except the originator; returns the
    /// sessions whose queues were full or closed.
    fn dispatch(
        &self,
        item_key: &str,
        message: &str,
        originator: Option<SessionId>,
    ) -> Vec<SessionId> {
        let Some(subscribers) = self.subscribers.get(item_key) else {
            return Vec::new();
        };

        let mut dead = Vec::new();
        for id in subscribers {
            if Some(*id) == originator {
                continue;
            }
            let Some(handle) = self.sessions.get(id) else {
                continue;
            };
            if handle.sender.try_send(message.to_string()).is_err() {
                dead.push(*id);
            }
        }
        dead
    }

    /// Drop a session everywhere. Dropping the last sender closes the
    /// session's outbound queue, which its write pump treats as the signal
    /// to send a close frame and shut down.
    fn remove_session(&mut self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            tracing::debug!(session = %id, total = self.sessions.len(),
                "session unregistered");
        }
        if let Some(keys) = self.memberships.remove(&id) {
            for key in keys {
                if let Some(set) = self.subscribers.get_mut(&key) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.subscribers.remove(&key);
                    }
                }
            }
        }
    }
}

//! WebSocket layer: subscription hub, per-connection sessions and the
//! message dispatcher.

pub mod dispatch;
pub mod hub;
pub mod session;

pub use hub::{Hub, HubHandle, SessionHandle};

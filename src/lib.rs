//! Coedit - collaborative editing backend
//!
//! Coedit stores two kinds of user-owned items - long-form posts and code
//! files - and lets multiple authenticated sessions edit them concurrently
//! with incremental, causally-ordered patches. Clients connect over a
//! WebSocket, subscribe to the items they care about, and exchange small
//! edit deltas instead of whole documents.
//!
//! # Module Structure
//!
//! - **`applier`** - pure text patching (line/column anchored changes)
//! - **`service`** - the edit coordinator: optimistic concurrency pipeline
//!   over the metadata store, blob store and cache
//! - **`history`** - append-only action log, snapshot cadence, revert
//!   target resolution
//! - **`ws`** - subscription hub, per-connection session pumps and the
//!   WebSocket message dispatcher
//! - **`store`** / **`blob`** / **`cache`** - pluggable adapters for
//!   metadata, content bytes and best-effort caching
//! - **`auth`** - JWT issue/verify and the REST account handlers
//! - **`api`** - HTTP router (auth, metadata reads, WebSocket upgrade)
//!
//! # Concurrency
//!
//! Writers are coordinated solely by a compare-and-set on the item version
//! in the metadata store; the hub serializes its subscriber map on a single
//! event loop, and slow subscribers are evicted rather than ever blocking
//! the write path.

pub mod api;
pub mod applier;
pub mod auth;
pub mod blob;
pub mod cache;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod protocol;
pub mod server;
pub mod service;
pub mod store;
pub mod ws;

//! Best-effort caching.
//!
//! Every operation is infallible from the caller's point of view: a miss
//! and a backend failure look the same (`None`), and writes that fail are
//! silently dropped after logging. Content is keyed by
//! `(itemType, itemId, version)`, so a reader that already knows the
//! version can never observe stale content; staleness risk is confined to
//! metadata, which the write-path compare-and-set recovers from.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{ItemMeta, ItemType, User};

pub mod memory;

pub use memory::MemoryCache;

#[async_trait]
pub trait ContentCache: Send + Sync {
    async fn get_user(&self, username: &str) -> Option<User>;
    async fn set_user(&self, user: &User, ttl: Duration);
    async fn delete_user(&self, username: &str);

    async fn get_item_meta(&self, id: Uuid, item_type: ItemType) -> Option<ItemMeta>;
    async fn set_item_meta(&self, meta: &ItemMeta, ttl: Duration);
    async fn delete_item_meta(&self, id: Uuid, item_type: ItemType);

    async fn get_item_content(&self, id: Uuid, item_type: ItemType, version: i64)
        -> Option<String>;
    async fn set_item_content(
        &self,
        id: Uuid,
        item_type: ItemType,
        version: i64,
        content: &str,
        ttl: Duration,
    );
    /// Remove every cached content version for the item.
    async fn invalidate_item_content(&self, id: Uuid, item_type: ItemType);
}

/// Cache that stores nothing. Used when caching is disabled.
pub struct NoopCache;

#[async_trait]
impl ContentCache for NoopCache {
    async fn get_user(&self, _username: &str) -> Option<User> {
        None
    }
    async fn set_user(&self, _user: &User, _ttl: Duration) {}
    async fn delete_user(&self, _username: &str) {}

    async fn get_item_meta(&self, _id: Uuid, _item_type: ItemType) -> Option<ItemMeta> {
        None
    }
    async fn set_item_meta(&self, _meta: &ItemMeta, _ttl: Duration) {}
    async fn delete_item_meta(&self, _id: Uuid, _item_type: ItemType) {}

    async fn get_item_content(
        &self,
        _id: Uuid,
        _item_type: ItemType,
        _version: i64,
    ) -> Option<String> {
        None
    }
    async fn set_item_content(
        &self,
        _id: Uuid,
        _item_type: ItemType,
        _version: i64,
        _content: &str,
        _ttl: Duration,
    ) {
    }
    async fn invalidate_item_content(&self, _id: Uuid, _item_type: ItemType) {}
}

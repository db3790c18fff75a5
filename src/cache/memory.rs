//! In-process TTL cache.
//!
//! Entries expire lazily: an expired entry is evicted the next time it is
//! read. Locks are held only across map operations, never across I/O.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use super::ContentCache;
use crate::models::{ItemMeta, ItemType, User};

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Entry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn live(&self) -> Option<T> {
        (Instant::now() < self.expires_at).then(|| self.value.clone())
    }
}

fn get_live<K: std::hash::Hash + Eq, T: Clone>(
    map: &Mutex<HashMap<K, Entry<T>>>,
    key: &K,
) -> Option<T>
where
    K: Clone,
{
    let mut map = map.lock().unwrap();
    match map.get(key).and_then(Entry::live) {
        Some(value) => Some(value),
        None => {
            map.remove(key);
            None
        }
    }
}

#[derive(Default)]
pub struct MemoryCache {
    users: Mutex<HashMap<String, Entry<User>>>,
    metas: Mutex<HashMap<(ItemType, Uuid), Entry<ItemMeta>>>,
    contents: Mutex<HashMap<(ItemType, Uuid, i64), Entry<String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentCache for MemoryCache {
    async fn get_user(&self, username: &str) -> Option<User> {
        get_live(&self.users, &username.to_string())
    }

    async fn set_user(&self, user: &User, ttl: Duration) {
        self.users
            .lock()
            .unwrap()
            .insert(user.username.clone(), Entry::new(user.clone(), ttl));
    }

    async fn delete_user(&self, username: &str) {
        self.users.lock().unwrap().remove(username);
    }

    async fn get_item_meta(&self, id: Uuid, item_type: ItemType) -> Option<ItemMeta> {
        get_live(&self.metas, &(item_type, id))
    }

    async fn set_item_meta(&self, meta: &ItemMeta, ttl: Duration) {
        self.metas
            .lock()
            .unwrap()
            .insert((meta.item_type(), meta.id()), Entry::new(meta.clone(), ttl));
    }

    async fn delete_item_meta(&self, id: Uuid, item_type: ItemType) {
        self.metas.lock().unwrap().remove(&(item_type, id));
    }

    async fn get_item_content(
        &self,
        id: Uuid,
        item_type: ItemType,
        version: i64,
    ) -> Option<String> {
        get_live(&self.contents, &(item_type, id, version))
    }

    async fn set_item_content(
        &self,
        id: Uuid,
        item_type: ItemType,
        version: i64,
        content: &str,
        ttl: Duration,
    ) {
        self.contents.lock().unwrap().insert(
            (item_type, id, version),
            Entry::new(content.to_string(), ttl),
        );
    }

    async fn invalidate_item_content(&self, id: Uuid, item_type: ItemType) {
        self.contents
            .lock()
            .unwrap()
            .retain(|(t, i, _), _| !(*t == item_type && *i == id));
    }
}

//! History engine: append-only action log, snapshot cadence and revert
//! target resolution.
//!
//! Appends are best-effort from the coordinator's point of view - a failed
//! history write never fails the operation that triggered it. Snapshot
//! counters are process-local, keyed by `(itemType, itemId)`, and guarded by
//! a mutex held only across the integer update, never across I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{HistoryAction, HistoryLog, ItemType};
use crate::store::{MetadataStore, StoreError};

/// Resolved revert target: where the content bytes to restore live.
#[derive(Debug, Clone)]
pub struct RevertTarget {
    pub item_id: Uuid,
    pub item_type: ItemType,
    /// Blob address recorded by the create/snapshot entry being reverted to.
    pub source_blob_key: String,
    pub expected_owner: String,
}

pub struct HistoryEngine {
    store: Arc<dyn MetadataStore>,
    /// Emit a snapshot every N applied changes; 0 disables snapshotting.
    interval: u32,
    counters: Mutex<HashMap<(ItemType, Uuid), u32>>,
}

impl HistoryEngine {
    pub fn new(store: Arc<dyn MetadataStore>, interval: u32) -> Self {
        Self {
            store,
            interval,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Durable append. Returns the new log id.
    pub async fn append(&self, entry: &HistoryLog) -> Result<Uuid, StoreError> {
        self.store.append_history(entry).await
    }

    /// Newest-first listing.
    pub async fn list(
        &self,
        item_id: Uuid,
        item_type: ItemType,
        limit: i64,
    ) -> Result<Vec<HistoryLog>, StoreError> {
        self.store.list_history(item_id, item_type, limit).await
    }

    pub async fn get(&self, log_id: Uuid) -> Result<HistoryLog, StoreError> {
        self.store.get_history(log_id).await
    }

    /// Record `count` applied changes against the item's running total.
    /// Returns true when the total reaches the configured interval, in which
    /// case the counter resets and the caller should emit a snapshot entry.
    pub fn register_changes(&self, item_type: ItemType, item_id: Uuid, count: usize) -> bool {
        if self.interval == 0 {
            return false;
        }
        let mut counters = self.counters.lock().unwrap();
        let entry = counters.entry((item_type, item_id)).or_insert(0);
        *entry += count as u32;
        if *entry >= self.interval {
            *entry = 0;
            return true;
        }
        false
    }

    /// Forget the running change total, e.g. after delete or revert.
    pub fn reset_counter(&self, item_type: ItemType, item_id: Uuid) {
        self.counters.lock().unwrap().remove(&(item_type, item_id));
    }

    /// Resolve a revert request against the log.
    ///
    /// Only `create` and `snapshot` entries are restore points - they are
    /// the only actions that record a self-contained blob. The requester
    /// must own the item the entry refers to, and the item must still
    /// exist.
    pub async fn resolve_revert(
        &self,
        log_id: Uuid,
        requester: &str,
    ) -> Result<RevertTarget, ServiceError> {
        let log = self.store.get_history(log_id).await.map_err(|e| match e {
            StoreError::NotFound => ServiceError::NotFound,
            other => ServiceError::Internal(other.to_string()),
        })?;

        if !matches!(log.action, HistoryAction::Create | HistoryAction::Snapshot) {
            return Err(ServiceError::RevertNotAllowed);
        }
        let source_blob_key = match log.blob_key_after {
            Some(ref key) if !key.is_empty() => key.clone(),
            _ => {
                tracing::error!(
                    log_id = %log_id,
                    action = log.action.as_str(),
                    "revert target entry is missing its content address"
                );
                return Err(ServiceError::Internal(
                    "revert target is missing its content address".to_string(),
                ));
            }
        };

        let meta = self
            .store
            .get_item_meta(log.item_id, log.item_type)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ServiceError::NotFound,
                other => ServiceError::Internal(other.to_string()),
            })?;
        if meta.owner() != requester {
            return Err(ServiceError::PermissionDenied);
        }

        Ok(RevertTarget {
            item_id: log.item_id,
            item_type: log.item_type,
            source_blob_key,
            expected_owner: meta.owner().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Post;
    use crate::store::MemoryMetadataStore;
    use chrono::Utc;

    fn entry(item_id: Uuid, action: HistoryAction, blob_key_after: Option<&str>) -> HistoryLog {
        HistoryLog {
            id: Uuid::new_v4(),
            user_id: "alice".into(),
            item_id,
            item_type: ItemType::Post,
            action,
            timestamp: Utc::now(),
            change_data: None,
            blob_key_before: None,
            blob_key_after: blob_key_after.map(String::from),
            item_version: 1,
            reverted_to_log_id: None,
        }
    }

    async fn store_with_post(owner: &str) -> (Arc<MemoryMetadataStore>, Uuid) {
        let store = Arc::new(MemoryMetadataStore::new());
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            user_id: owner.into(),
            title: "T".into(),
            slug: "t".into(),
            created_at: now,
            updated_at: now,
            blob_key: "post/alice/x".into(),
            version: 1,
        };
        store.create_post_meta(&post).await.unwrap();
        (store, post.id)
    }

    #[test]
    fn test_counter_fires_at_interval_and_resets() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let engine = HistoryEngine::new(store, 3);
        let id = Uuid::new_v4();

        assert!(!engine.register_changes(ItemType::Post, id, 1));
        assert!(!engine.register_changes(ItemType::Post, id, 1));
        assert!(engine.register_changes(ItemType::Post, id, 1));
        // Counter reset: the next change starts a fresh run.
        assert!(!engine.register_changes(ItemType::Post, id, 1));
    }

    #[test]
    fn test_counter_fires_on_overshoot() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let engine = HistoryEngine::new(store, 3);
        let id = Uuid::new_v4();
        assert!(engine.register_changes(ItemType::Post, id, 5));
    }

    #[test]
    fn test_zero_interval_disables_snapshots() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let engine = HistoryEngine::new(store, 0);
        let id = Uuid::new_v4();
        assert!(!engine.register_changes(ItemType::Post, id, 1000));
    }

    #[test]
    fn test_counters_are_per_item() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let engine = HistoryEngine::new(store, 2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(!engine.register_changes(ItemType::Post, a, 1));
        assert!(!engine.register_changes(ItemType::Post, b, 1));
        assert!(engine.register_changes(ItemType::Post, a, 1));
    }

    #[test]
    fn test_reset_counter_clears_progress() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let engine = HistoryEngine::new(store, 2);
        let id = Uuid::new_v4();
        assert!(!engine.register_changes(ItemType::Post, id, 1));
        engine.reset_counter(ItemType::Post, id);
        assert!(!engine.register_changes(ItemType::Post, id, 1));
        assert!(engine.register_changes(ItemType::Post, id, 1));
    }

    #[tokio::test]
    async fn test_resolve_revert_accepts_snapshot() {
        let (store, item_id) = store_with_post("alice").await;
        let engine = HistoryEngine::new(store.clone(), 0);
        let log = entry(item_id, HistoryAction::Snapshot, Some("post/alice/x"));
        store.append_history(&log).await.unwrap();

        let target = engine.resolve_revert(log.id, "alice").await.unwrap();
        assert_eq!(target.item_id, item_id);
        assert_eq!(target.source_blob_key, "post/alice/x");
        assert_eq!(target.expected_owner, "alice");
    }

    #[tokio::test]
    async fn test_resolve_revert_rejects_patch_entries() {
        let (store, item_id) = store_with_post("alice").await;
        let engine = HistoryEngine::new(store.clone(), 0);
        let log = entry(item_id, HistoryAction::Patch, Some("post/alice/x"));
        store.append_history(&log).await.unwrap();

        assert!(matches!(
            engine.resolve_revert(log.id, "alice").await,
            Err(ServiceError::RevertNotAllowed)
        ));
    }

    #[tokio::test]
    async fn test_resolve_revert_rejects_foreign_requester() {
        let (store, item_id) = store_with_post("alice").await;
        let engine = HistoryEngine::new(store.clone(), 0);
        let log = entry(item_id, HistoryAction::Create, Some("post/alice/x"));
        store.append_history(&log).await.unwrap();

        assert!(matches!(
            engine.resolve_revert(log.id, "mallory").await,
            Err(ServiceError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn test_resolve_revert_missing_log_is_not_found() {
        let (store, _) = store_with_post("alice").await;
        let engine = HistoryEngine::new(store, 0);
        assert!(matches!(
            engine.resolve_revert(Uuid::new_v4(), "alice").await,
            Err(ServiceError::NotFound)
        ));
    }
}

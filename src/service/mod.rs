//! The edit coordinator.
//!
//! Orchestrates the metadata store, blob store, cache and history engine
//! behind every content operation. The coordinator itself is stateless and
//! fully reentrant; concurrent writers are serialized only by the metadata
//! compare-and-set, and blob writes always happen before the metadata
//! commit so a crash can at worst leak unreferenced bytes, never publish a
//! dangling content pointer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::applier;
use crate::auth::jwt;
use crate::blob::{BlobError, BlobStore};
use crate::cache::ContentCache;
use crate::config::JwtConfig;
use crate::error::ServiceError;
use crate::history::HistoryEngine;
use crate::models::{
    Change, CodeFile, HistoryAction, HistoryLog, ItemMeta, ItemType, Post, User,
};
use crate::store::{MetadataStore, StoreError};

const USER_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const ITEM_META_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
const ITEM_CONTENT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Hard deadline on blob writes; a hung upload surfaces as `StorageFailed`.
const BLOB_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Hard deadline on the metadata compare-and-set. Tripping it after a blob
/// write is an `Inconsistent` outcome, not a retry.
const CAS_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of a revert, carrying everything the session layer needs for the
/// reply and the `content_replaced` broadcast.
#[derive(Debug, Clone)]
pub struct RevertOutcome {
    pub item_id: Uuid,
    pub item_type: ItemType,
    pub new_version: i64,
    pub content: String,
}

pub struct Service {
    store: Arc<dyn MetadataStore>,
    blob: Arc<dyn BlobStore>,
    cache: Arc<dyn ContentCache>,
    history: HistoryEngine,
    jwt: JwtConfig,
}

impl Service {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blob: Arc<dyn BlobStore>,
        cache: Arc<dyn ContentCache>,
        jwt: JwtConfig,
        snapshot_interval: u32,
    ) -> Self {
        let history = HistoryEngine::new(store.clone(), snapshot_interval);
        Self {
            store,
            blob,
            cache,
            history,
            jwt,
        }
    }

    // --- Users ---

    pub async fn register_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, ServiceError> {
        if username.is_empty() || password.is_empty() {
            return Err(ServiceError::BadPayload(
                "username and password are required".to_string(),
            ));
        }

        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let mut user = User {
            username: username.to_string(),
            password_hash,
            created_at: Utc::now(),
        };

        self.store.create_user(&user).await.map_err(|e| match e {
            StoreError::DuplicateUser => ServiceError::UsernameTaken,
            other => ServiceError::Internal(other.to_string()),
        })?;

        user.password_hash.clear();
        Ok(user)
    }

    pub async fn login_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(String, User), ServiceError> {
        let mut user = self.store.get_user(username).await.map_err(|e| match e {
            StoreError::NotFound => ServiceError::InvalidCredentials,
            other => ServiceError::Internal(other.to_string()),
        })?;

        let valid = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        if !valid {
            return Err(ServiceError::InvalidCredentials);
        }

        let token = jwt::create_token(&self.jwt, username)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        user.password_hash.clear();
        self.cache.set_user(&user, USER_CACHE_TTL).await;
        Ok((token, user))
    }

    /// Verify a bearer token and return the authenticated username.
    pub fn verify_token(&self, token: &str) -> Result<String, ServiceError> {
        jwt::verify_token(&self.jwt, token)
            .map(|claims| claims.sub)
            .map_err(|_| ServiceError::Unauthenticated)
    }

    // --- Metadata reads ---

    async fn item_meta_cached(
        &self,
        item_id: Uuid,
        item_type: ItemType,
    ) -> Result<ItemMeta, ServiceError> {
        if let Some(meta) = self.cache.get_item_meta(item_id, item_type).await {
            return Ok(meta);
        }
        let meta = self
            .store
            .get_item_meta(item_id, item_type)
            .await
            .map_err(map_store_error)?;
        self.cache.set_item_meta(&meta, ITEM_META_CACHE_TTL).await;
        Ok(meta)
    }

    pub async fn get_post(&self, user_id: &str, post_id: Uuid) -> Result<Post, ServiceError> {
        match self.item_meta_cached(post_id, ItemType::Post).await? {
            ItemMeta::Post(post) if post.user_id == user_id => Ok(post),
            ItemMeta::Post(_) => Err(ServiceError::PermissionDenied),
            _ => Err(ServiceError::NotFound),
        }
    }

    pub async fn get_code_file(
        &self,
        user_id: &str,
        file_id: Uuid,
    ) -> Result<CodeFile, ServiceError> {
        match self.item_meta_cached(file_id, ItemType::CodeFile).await? {
            ItemMeta::CodeFile(file) if file.user_id == user_id => Ok(file),
            ItemMeta::CodeFile(_) => Err(ServiceError::PermissionDenied),
            _ => Err(ServiceError::NotFound),
        }
    }

    pub async fn list_posts(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, ServiceError> {
        self.store
            .list_post_meta_by_user(user_id, limit, offset)
            .await
            .map_err(map_store_error)
    }

    pub async fn list_code_files(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CodeFile>, ServiceError> {
        self.store
            .list_code_file_meta_by_user(user_id, limit, offset)
            .await
            .map_err(map_store_error)
    }

    // --- Content ---

    /// Return the item's current content and version.
    ///
    /// A missing blob (or an item whose content was never written) reads as
    /// empty text at the current version.
    pub async fn get_item_content(
        &self,
        user_id: &str,
        item_id: Uuid,
        item_type: &str,
    ) -> Result<(String, i64), ServiceError> {
        let item_type = parse_item_type(item_type)?;
        let meta = self.item_meta_cached(item_id, item_type).await?;
        if meta.owner() != user_id {
            return Err(ServiceError::PermissionDenied);
        }
        let version = meta.version();

        if let Some(content) = self.cache.get_item_content(item_id, item_type, version).await {
            return Ok((content, version));
        }

        let content = match self.read_blob_text(meta.blob_key()).await? {
            Some(content) => content,
            None => return Ok((String::new(), version)),
        };

        self.cache
            .set_item_content(item_id, item_type, version, &content, ITEM_CONTENT_CACHE_TTL)
            .await;
        Ok((content, version))
    }

    /// Apply a batch of changes against `base_version`.
    ///
    /// Ordered pipeline: validate -> materialize -> apply -> blob write ->
    /// metadata compare-and-set -> caches/history/snapshot. The blob write
    /// strictly precedes the metadata commit; see module docs.
    pub async fn apply_item_changes(
        &self,
        user_id: &str,
        item_id: Uuid,
        item_type: &str,
        base_version: i64,
        changes: Vec<Change>,
    ) -> Result<(i64, Vec<Change>), ServiceError> {
        let item_type = parse_item_type(item_type)?;

        // 1. Load + validate.
        let mut meta = self.item_meta_cached(item_id, item_type).await?;
        if meta.owner() != user_id {
            return Err(ServiceError::PermissionDenied);
        }
        if meta.version() != base_version {
            tracing::debug!(
                %item_id, item_type = %item_type,
                client_base = base_version, current = meta.version(),
                "rejecting stale edit"
            );
            return Err(ServiceError::VersionConflict {
                current: meta.version(),
            });
        }

        // 2. Allocate a blob key on first write.
        if meta.blob_key().is_empty() {
            let key = blob_key_for(item_type, user_id, item_id);
            tracing::info!(%item_id, item_type = %item_type, key = %key, "allocated blob key");
            meta.set_blob_key(key);
        }

        // 3. Materialize current content (cache, then blob; missing reads
        //    as empty). Not recached here - only the committed result is.
        let current = self
            .content_from_source(item_id, item_type, base_version, meta.blob_key())
            .await?;

        // 4. Apply.
        let new_content = applier::apply_changes(&current, &changes)
            .map_err(|e| ServiceError::ApplyFailed(e.to_string()))?;

        // 5. Blob write, before any metadata mutation.
        self.write_blob_text(meta.blob_key(), &new_content, item_type.content_type())
            .await?;

        // 6. Metadata compare-and-set.
        let now = Utc::now();
        match &mut meta {
            ItemMeta::Post(p) => p.updated_at = now,
            ItemMeta::CodeFile(f) => f.updated_at = now,
        }
        self.commit_meta(&meta).await?;
        let new_version = base_version + 1;

        // 7. Post-commit: caches, history, snapshot cadence. All
        //    best-effort except the content warm, which cannot fail.
        self.cache.delete_item_meta(item_id, item_type).await;
        self.cache.invalidate_item_content(item_id, item_type).await;
        self.cache
            .set_item_content(item_id, item_type, new_version, &new_content, ITEM_CONTENT_CACHE_TTL)
            .await;

        for change in &changes {
            let entry = HistoryLog {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                item_id,
                item_type,
                action: HistoryAction::Patch,
                timestamp: now,
                change_data: Some(change.clone()),
                blob_key_before: None,
                blob_key_after: None,
                item_version: new_version,
                reverted_to_log_id: None,
            };
            if let Err(e) = self.history.append(&entry).await {
                tracing::warn!(%item_id, item_type = %item_type, error = %e,
                    "failed to log patch history entry");
            }
        }

        if self.history.register_changes(item_type, item_id, changes.len()) {
            tracing::info!(%item_id, item_type = %item_type, version = new_version,
                "snapshot interval reached");
            let snapshot = HistoryLog {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                item_id,
                item_type,
                action: HistoryAction::Snapshot,
                timestamp: Utc::now(),
                change_data: None,
                blob_key_before: None,
                blob_key_after: Some(meta.blob_key().to_string()),
                item_version: new_version,
                reverted_to_log_id: None,
            };
            if let Err(e) = self.history.append(&snapshot).await {
                tracing::warn!(%item_id, item_type = %item_type, error = %e,
                    "failed to log snapshot entry");
            }
        }

        Ok((new_version, changes))
    }

    // --- Create ---

    pub async fn create_post(
        &self,
        user_id: &str,
        title: &str,
        initial_content: &str,
    ) -> Result<Post, ServiceError> {
        if title.is_empty() {
            return Err(ServiceError::BadPayload("title is required".to_string()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let post = Post {
            id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            slug: slugify(title),
            created_at: now,
            updated_at: now,
            blob_key: blob_key_for(ItemType::Post, user_id, id),
            version: 1,
        };

        self.write_blob_text(&post.blob_key, initial_content, ItemType::Post.content_type())
            .await?;
        self.store
            .create_post_meta(&post)
            .await
            .map_err(map_store_error)?;

        self.log_create(user_id, id, ItemType::Post, &post.blob_key, now).await;
        let meta = ItemMeta::Post(post.clone());
        self.cache.set_item_meta(&meta, ITEM_META_CACHE_TTL).await;
        self.cache
            .set_item_content(id, ItemType::Post, 1, initial_content, ITEM_CONTENT_CACHE_TTL)
            .await;

        Ok(post)
    }

    pub async fn create_code_file(
        &self,
        user_id: &str,
        file_name: &str,
        language: &str,
        initial_content: &str,
    ) -> Result<CodeFile, ServiceError> {
        if file_name.is_empty() {
            return Err(ServiceError::BadPayload("fileName is required".to_string()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let file = CodeFile {
            id,
            user_id: user_id.to_string(),
            file_name: file_name.to_string(),
            language: language.to_string(),
            created_at: now,
            updated_at: now,
            blob_key: blob_key_for(ItemType::CodeFile, user_id, id),
            version: 1,
        };

        self.write_blob_text(&file.blob_key, initial_content, ItemType::CodeFile.content_type())
            .await?;
        self.store
            .create_code_file_meta(&file)
            .await
            .map_err(map_store_error)?;

        self.log_create(user_id, id, ItemType::CodeFile, &file.blob_key, now).await;
        let meta = ItemMeta::CodeFile(file.clone());
        self.cache.set_item_meta(&meta, ITEM_META_CACHE_TTL).await;
        self.cache
            .set_item_content(id, ItemType::CodeFile, 1, initial_content, ITEM_CONTENT_CACHE_TTL)
            .await;

        Ok(file)
    }

    // --- Delete ---

    /// Delete an item. Metadata removal is authoritative; the blob delete
    /// is best-effort and history is retained.
    pub async fn delete_item(
        &self,
        user_id: &str,
        item_id: Uuid,
        item_type: &str,
    ) -> Result<(), ServiceError> {
        let item_type = parse_item_type(item_type)?;

        let meta = match self.item_meta_cached(item_id, item_type).await {
            Ok(meta) => meta,
            // Already gone: deleting twice is not an error.
            Err(ServiceError::NotFound) => return Ok(()),
            Err(e) => return Err(e),
        };
        if meta.owner() != user_id {
            return Err(ServiceError::PermissionDenied);
        }
        let blob_key = meta.blob_key().to_string();
        let version = meta.version();

        match self.store.delete_item_meta(item_id, item_type).await {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(ServiceError::Internal(e.to_string())),
        }

        if !blob_key.is_empty() {
            if let Err(e) = self.blob.delete(&blob_key).await {
                tracing::warn!(%item_id, key = %blob_key, error = %e,
                    "failed to delete content blob");
            }
        }

        let entry = HistoryLog {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            item_id,
            item_type,
            action: HistoryAction::Delete,
            timestamp: Utc::now(),
            change_data: None,
            blob_key_before: (!blob_key.is_empty()).then(|| blob_key.clone()),
            blob_key_after: None,
            item_version: version,
            reverted_to_log_id: None,
        };
        if let Err(e) = self.history.append(&entry).await {
            tracing::warn!(%item_id, error = %e, "failed to log delete entry");
        }

        self.cache.delete_item_meta(item_id, item_type).await;
        self.cache.invalidate_item_content(item_id, item_type).await;
        self.history.reset_counter(item_type, item_id);

        Ok(())
    }

    // --- History + revert ---

    pub async fn get_history(
        &self,
        user_id: &str,
        item_id: Uuid,
        item_type: &str,
        limit: i64,
    ) -> Result<Vec<HistoryLog>, ServiceError> {
        let item_type = parse_item_type(item_type)?;
        let meta = self.item_meta_cached(item_id, item_type).await?;
        if meta.owner() != user_id {
            return Err(ServiceError::PermissionDenied);
        }

        let limit = if limit <= 0 { 50 } else { limit };
        self.history
            .list(item_id, item_type, limit)
            .await
            .map_err(map_store_error)
    }

    /// Re-materialize the content recorded by a create/snapshot entry as
    /// the item's new head state.
    ///
    /// The restored bytes are written to the item's *current* blob key so
    /// the item keeps its stable address; the version increments like any
    /// other mutation. A compare-and-set failure here is `Inconsistent`
    /// rather than `VersionConflict`: revert is not defined to race with
    /// user edits, so callers treat it as terminal.
    pub async fn revert_to_action(
        &self,
        user_id: &str,
        target_log_id: Uuid,
    ) -> Result<RevertOutcome, ServiceError> {
        let target = self.history.resolve_revert(target_log_id, user_id).await?;

        let mut meta = self.item_meta_cached(target.item_id, target.item_type).await?;
        if meta.owner() != user_id || meta.owner() != target.expected_owner {
            return Err(ServiceError::PermissionDenied);
        }
        let current_key = meta.blob_key().to_string();
        if current_key.is_empty() {
            tracing::error!(item_id = %target.item_id,
                "item exists but has no storage address during revert");
            return Err(ServiceError::Internal(
                "item is missing its storage address".to_string(),
            ));
        }
        let current_version = meta.version();

        let bytes = self.blob.get(&target.source_blob_key).await.map_err(|e| {
            tracing::error!(key = %target.source_blob_key, error = %e,
                "failed to fetch revert source content");
            ServiceError::StorageFailed
        })?;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        self.write_blob_text(&current_key, &content, target.item_type.content_type())
            .await?;

        let now = Utc::now();
        match &mut meta {
            ItemMeta::Post(p) => p.updated_at = now,
            ItemMeta::CodeFile(f) => f.updated_at = now,
        }
        let cas = tokio::time::timeout(CAS_TIMEOUT, self.store.update_item_meta(&meta)).await;
        match cas {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(item_id = %target.item_id, error = %e,
                    "inconsistency: reverted blob written but metadata update failed");
                return Err(ServiceError::Inconsistent);
            }
            Err(_) => {
                tracing::error!(item_id = %target.item_id,
                    "inconsistency: metadata update timed out after revert blob write");
                return Err(ServiceError::Inconsistent);
            }
        }
        let new_version = current_version + 1;

        self.cache.delete_item_meta(target.item_id, target.item_type).await;
        self.cache
            .invalidate_item_content(target.item_id, target.item_type)
            .await;
        self.cache
            .set_item_content(
                target.item_id,
                target.item_type,
                new_version,
                &content,
                ITEM_CONTENT_CACHE_TTL,
            )
            .await;

        let entry = HistoryLog {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            item_id: target.item_id,
            item_type: target.item_type,
            action: HistoryAction::Revert,
            timestamp: now,
            change_data: None,
            blob_key_before: None,
            blob_key_after: Some(current_key),
            item_version: new_version,
            reverted_to_log_id: Some(target_log_id),
        };
        if let Err(e) = self.history.append(&entry).await {
            tracing::warn!(item_id = %target.item_id, error = %e,
                "failed to log revert entry");
        }

        self.history.reset_counter(target.item_type, target.item_id);

        Ok(RevertOutcome {
            item_id: target.item_id,
            item_type: target.item_type,
            new_version,
            content,
        })
    }

    // --- Internals ---

    /// Read a blob as text. `Ok(None)` for an empty key or a missing blob:
    /// documents that were never written behave like empty ones.
    async fn read_blob_text(&self, key: &str) -> Result<Option<String>, ServiceError> {
        if key.is_empty() {
            return Ok(None);
        }
        match self.blob.get(key).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(BlobError::NotFound) => {
                tracing::warn!(key, "blob missing for non-empty key");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(key, error = %e, "failed to download content");
                Err(ServiceError::StorageFailed)
            }
        }
    }

    async fn write_blob_text(
        &self,
        key: &str,
        content: &str,
        content_type: &str,
    ) -> Result<(), ServiceError> {
        let write = self
            .blob
            .put(key, content.as_bytes().to_vec(), content_type);
        match tokio::time::timeout(BLOB_WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(key, error = %e, "failed to upload content");
                Err(ServiceError::StorageFailed)
            }
            Err(_) => {
                tracing::error!(key, "content upload timed out");
                Err(ServiceError::StorageFailed)
            }
        }
    }

    /// Current content for the patch pipeline: cache first, then blob.
    async fn content_from_source(
        &self,
        item_id: Uuid,
        item_type: ItemType,
        version: i64,
        blob_key: &str,
    ) -> Result<String, ServiceError> {
        if let Some(content) = self.cache.get_item_content(item_id, item_type, version).await {
            return Ok(content);
        }
        Ok(self.read_blob_text(blob_key).await?.unwrap_or_default())
    }

    /// The compare-and-set of step 6, with the conflict-vs-vanished
    /// distinction and the loud inconsistency logging the blob-first
    /// ordering demands.
    async fn commit_meta(&self, meta: &ItemMeta) -> Result<(), ServiceError> {
        let item_id = meta.id();
        let item_type = meta.item_type();
        let cas = tokio::time::timeout(CAS_TIMEOUT, self.store.update_item_meta(meta)).await;
        let err = match cas {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => {
                tracing::error!(%item_id, item_type = %item_type,
                    "inconsistency: metadata update timed out after blob write");
                return Err(ServiceError::Inconsistent);
            }
        };

        tracing::error!(%item_id, item_type = %item_type, error = %err,
            "inconsistency risk: blob written but metadata update failed");
        match err {
            StoreError::NotFound => Err(ServiceError::NotFound),
            StoreError::VersionMismatch => {
                // Lost the race: fetch the true current version so the
                // client can rebase. The just-written blob holds orphaned
                // bytes; accepted leak.
                match self.store.get_item_meta(item_id, item_type).await {
                    Ok(latest) => Err(ServiceError::VersionConflict {
                        current: latest.version(),
                    }),
                    Err(e) => {
                        tracing::error!(%item_id, error = %e,
                            "failed to fetch current version after conflict");
                        Err(ServiceError::Inconsistent)
                    }
                }
            }
            other => {
                tracing::error!(%item_id, error = %other, "metadata update failed");
                Err(ServiceError::Inconsistent)
            }
        }
    }

    async fn log_create(
        &self,
        user_id: &str,
        item_id: Uuid,
        item_type: ItemType,
        blob_key: &str,
        now: chrono::DateTime<Utc>,
    ) {
        let entry = HistoryLog {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            item_id,
            item_type,
            action: HistoryAction::Create,
            timestamp: now,
            change_data: None,
            blob_key_before: None,
            blob_key_after: Some(blob_key.to_string()),
            item_version: 1,
            reverted_to_log_id: None,
        };
        if let Err(e) = self.history.append(&entry).await {
            tracing::warn!(%item_id, item_type = %item_type, error = %e,
                "failed to log create entry");
        }
    }
}

fn parse_item_type(raw: &str) -> Result<ItemType, ServiceError> {
    ItemType::parse(raw).ok_or(ServiceError::InvalidItemType)
}

fn map_store_error(err: StoreError) -> ServiceError {
    match err {
        StoreError::NotFound => ServiceError::NotFound,
        StoreError::DuplicateUser => ServiceError::UsernameTaken,
        StoreError::VersionMismatch => ServiceError::Inconsistent,
        StoreError::Backend(msg) => ServiceError::Internal(msg),
    }
}

/// Deterministic blob address: `<itemType>/<userId>/<itemId>`. No user
/// input enters the path.
fn blob_key_for(item_type: ItemType, user_id: &str, item_id: Uuid) -> String {
    format!("{}/{}/{}", item_type, user_id, item_id)
}

/// Lowercased, hyphenated slug with a short random suffix for uniqueness.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    let suffix: u32 = rand::thread_rng().gen_range(0..0xff_ffff);
    format!("{slug}-{suffix:06x}")
}

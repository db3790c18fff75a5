//! Metadata store adapters.
//!
//! The trait is provider-agnostic; the coordinator only relies on the
//! compare-and-set contract of `update_post_meta`/`update_code_file_meta`:
//! the update succeeds only when the stored version equals the version in
//! the passed record, and atomically increments it by one. `NotFound` and
//! `VersionMismatch` are distinct errors because the coordinator reports
//! them differently to clients.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CodeFile, HistoryLog, ItemMeta, ItemType, Post, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryMetadataStore;
pub use postgres::PgMetadataStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("username already exists")]
    DuplicateUser,

    /// The compare-and-set predicate failed: the stored version differs
    /// from the expected one.
    #[error("version mismatch")]
    VersionMismatch,

    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    // Users
    async fn get_user(&self, username: &str) -> Result<User, StoreError>;
    async fn create_user(&self, user: &User) -> Result<(), StoreError>;

    // Posts (metadata only)
    async fn create_post_meta(&self, post: &Post) -> Result<Uuid, StoreError>;
    async fn get_post_meta(&self, id: Uuid) -> Result<Post, StoreError>;
    async fn list_post_meta_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, StoreError>;
    /// Compare-and-set on `post.version`; increments on success.
    async fn update_post_meta(&self, post: &Post) -> Result<(), StoreError>;
    async fn delete_post_meta(&self, id: Uuid) -> Result<(), StoreError>;

    // Code files (metadata only)
    async fn create_code_file_meta(&self, file: &CodeFile) -> Result<Uuid, StoreError>;
    async fn get_code_file_meta(&self, id: Uuid) -> Result<CodeFile, StoreError>;
    async fn list_code_file_meta_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CodeFile>, StoreError>;
    /// Compare-and-set on `file.version`; increments on success.
    async fn update_code_file_meta(&self, file: &CodeFile) -> Result<(), StoreError>;
    async fn delete_code_file_meta(&self, id: Uuid) -> Result<(), StoreError>;

    // History log
    async fn append_history(&self, entry: &HistoryLog) -> Result<Uuid, StoreError>;
    /// Newest-first.
    async fn list_history(
        &self,
        item_id: Uuid,
        item_type: ItemType,
        limit: i64,
    ) -> Result<Vec<HistoryLog>, StoreError>;
    async fn get_history(&self, log_id: Uuid) -> Result<HistoryLog, StoreError>;

    // Variant-dispatching conveniences used by the coordinator.

    async fn get_item_meta(&self, id: Uuid, item_type: ItemType) -> Result<ItemMeta, StoreError> {
        match item_type {
            ItemType::Post => Ok(ItemMeta::Post(self.get_post_meta(id).await?)),
            ItemType::CodeFile => Ok(ItemMeta::CodeFile(self.get_code_file_meta(id).await?)),
        }
    }

    async fn update_item_meta(&self, meta: &ItemMeta) -> Result<(), StoreError> {
        match meta {
            ItemMeta::Post(p) => self.update_post_meta(p).await,
            ItemMeta::CodeFile(f) => self.update_code_file_meta(f).await,
        }
    }

    async fn delete_item_meta(&self, id: Uuid, item_type: ItemType) -> Result<(), StoreError> {
        match item_type {
            ItemType::Post => self.delete_post_meta(id).await,
            ItemType::CodeFile => self.delete_code_file_meta(id).await,
        }
    }
}

//! In-memory metadata store.
//!
//! Backs tests and the zero-dependency dev mode (`DB_TYPE=memory`). All
//! state lives behind one mutex; the compare-and-set runs entirely under
//! the lock, which gives it the same one-winner guarantee the SQL backend
//! gets from its conditional UPDATE.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{MetadataStore, StoreError};
use crate::models::{CodeFile, HistoryLog, ItemType, Post, User};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    posts: HashMap<Uuid, Post>,
    code_files: HashMap<Uuid, CodeFile>,
    history: Vec<HistoryLog>,
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    inner: Mutex<Inner>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get_user(&self, username: &str) -> Result<User, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner.users.get(username).cloned().ok_or(StoreError::NotFound)
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.contains_key(&user.username) {
            return Err(StoreError::DuplicateUser);
        }
        inner.users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn create_post_meta(&self, post: &Post) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.posts.insert(post.id, post.clone());
        Ok(post.id)
    }

    async fn get_post_meta(&self, id: Uuid) -> Result<Post, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner.posts.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list_post_meta_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut posts: Vec<Post> = inner
            .posts
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_post_meta(&self, post: &Post) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner.posts.get_mut(&post.id).ok_or(StoreError::NotFound)?;
        if stored.version != post.version {
            return Err(StoreError::VersionMismatch);
        }
        stored.title = post.title.clone();
        stored.slug = post.slug.clone();
        stored.blob_key = post.blob_key.clone();
        stored.updated_at = post.updated_at;
        stored.version = post.version + 1;
        Ok(())
    }

    async fn delete_post_meta(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.posts.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn create_code_file_meta(&self, file: &CodeFile) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.code_files.insert(file.id, file.clone());
        Ok(file.id)
    }

    async fn get_code_file_meta(&self, id: Uuid) -> Result<CodeFile, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner.code_files.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list_code_file_meta_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CodeFile>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut files: Vec<CodeFile> = inner
            .code_files
            .values()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_code_file_meta(&self, file: &CodeFile) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .code_files
            .get_mut(&file.id)
            .ok_or(StoreError::NotFound)?;
        if stored.version != file.version {
            return Err(StoreError::VersionMismatch);
        }
        stored.file_name = file.file_name.clone();
        stored.language = file.language.clone();
        stored.blob_key = file.blob_key.clone();
        stored.updated_at = file.updated_at;
        stored.version = file.version + 1;
        Ok(())
    }

    async fn delete_code_file_meta(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .code_files
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn append_history(&self, entry: &HistoryLog) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.history.push(entry.clone());
        Ok(entry.id)
    }

    async fn list_history(
        &self,
        item_id: Uuid,
        item_type: ItemType,
        limit: i64,
    ) -> Result<Vec<HistoryLog>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<HistoryLog> = inner
            .history
            .iter()
            .filter(|e| e.item_id == item_id && e.item_type == item_type)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn get_history(&self, log_id: Uuid) -> Result<HistoryLog, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .history
            .iter()
            .find(|e| e.id == log_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

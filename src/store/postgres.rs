//! PostgreSQL metadata store backed by sqlx.
//!
//! The compare-and-set is a single conditional UPDATE
//! (`... AND version = $n`) so concurrent writers from the same base
//! version admit exactly one winner. When zero rows are affected the row is
//! re-probed to tell `NotFound` apart from `VersionMismatch`.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::{MetadataStore, StoreError};
use crate::models::{Change, CodeFile, HistoryAction, HistoryLog, ItemType, Post, User};

pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Connect and run pending migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(url).await.map_err(backend)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Flat row for `history_log`; enum columns are stored as text and parsed
/// on the way out.
#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    user_id: String,
    item_id: Uuid,
    item_type: String,
    action: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    change_data: Option<String>,
    blob_key_before: Option<String>,
    blob_key_after: Option<String>,
    item_version: i64,
    reverted_to_log_id: Option<Uuid>,
}

impl TryFrom<HistoryRow> for HistoryLog {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, StoreError> {
        let item_type = ItemType::parse(&row.item_type)
            .ok_or_else(|| StoreError::Backend(format!("bad item_type: {}", row.item_type)))?;
        let action = HistoryAction::parse(&row.action)
            .ok_or_else(|| StoreError::Backend(format!("bad action: {}", row.action)))?;
        let change_data = match row.change_data {
            Some(raw) => Some(
                serde_json::from_str::<Change>(&raw)
                    .map_err(|e| StoreError::Backend(format!("bad change_data: {e}")))?,
            ),
            None => None,
        };
        Ok(HistoryLog {
            id: row.id,
            user_id: row.user_id,
            item_id: row.item_id,
            item_type,
            action,
            timestamp: row.timestamp,
            change_data,
            blob_key_before: row.blob_key_before,
            blob_key_after: row.blob_key_after,
            item_version: row.item_version,
            reverted_to_log_id: row.reverted_to_log_id,
        })
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn get_user(&self, username: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT username, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateUser
            } else {
                backend(e)
            }
        })?;
        Ok(())
    }

    async fn create_post_meta(&self, post: &Post) -> Result<Uuid, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, title, slug, created_at, updated_at, blob_key, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(post.id)
        .bind(&post.user_id)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(post.created_at)
        .bind(post.updated_at)
        .bind(&post.blob_key)
        .bind(post.version)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(post.id)
    }

    async fn get_post_meta(&self, id: Uuid) -> Result<Post, StoreError> {
        sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id, title, slug, created_at, updated_at, blob_key, version
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)
    }

    async fn list_post_meta_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, StoreError> {
        sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id, title, slug, created_at, updated_at, blob_key, version
            FROM posts
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn update_post_meta(&self, post: &Post) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET title = $2, slug = $3, blob_key = $4, updated_at = $5,
                version = version + 1
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.blob_key)
        .bind(post.updated_at)
        .bind(post.version)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            // Tell a vanished row apart from a lost race.
            return match self.get_post_meta(post.id).await {
                Ok(_) => Err(StoreError::VersionMismatch),
                Err(StoreError::NotFound) => Err(StoreError::NotFound),
                Err(e) => Err(e),
            };
        }
        Ok(())
    }

    async fn delete_post_meta(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_code_file_meta(&self, file: &CodeFile) -> Result<Uuid, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO code_files (id, user_id, file_name, language, created_at, updated_at, blob_key, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(file.id)
        .bind(&file.user_id)
        .bind(&file.file_name)
        .bind(&file.language)
        .bind(file.created_at)
        .bind(file.updated_at)
        .bind(&file.blob_key)
        .bind(file.version)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(file.id)
    }

    async fn get_code_file_meta(&self, id: Uuid) -> Result<CodeFile, StoreError> {
        sqlx::query_as::<_, CodeFile>(
            r#"
            SELECT id, user_id, file_name, language, created_at, updated_at, blob_key, version
            FROM code_files
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)
    }

    async fn list_code_file_meta_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CodeFile>, StoreError> {
        sqlx::query_as::<_, CodeFile>(
            r#"
            SELECT id, user_id, file_name, language, created_at, updated_at, blob_key, version
            FROM code_files
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn update_code_file_meta(&self, file: &CodeFile) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE code_files
            SET file_name = $2, language = $3, blob_key = $4, updated_at = $5,
                version = version + 1
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(file.id)
        .bind(&file.file_name)
        .bind(&file.language)
        .bind(&file.blob_key)
        .bind(file.updated_at)
        .bind(file.version)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return match self.get_code_file_meta(file.id).await {
                Ok(_) => Err(StoreError::VersionMismatch),
                Err(StoreError::NotFound) => Err(StoreError::NotFound),
                Err(e) => Err(e),
            };
        }
        Ok(())
    }

    async fn delete_code_file_meta(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM code_files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn append_history(&self, entry: &HistoryLog) -> Result<Uuid, StoreError> {
        let change_data = match &entry.change_data {
            Some(change) => Some(
                serde_json::to_string(change)
                    .map_err(|e| StoreError::Backend(e.to_string()))?,
            ),
            None => None,
        };
        sqlx::query(
            r#"
            INSERT INTO history_log
                (id, user_id, item_id, item_type, action, timestamp,
                 change_data, blob_key_before, blob_key_after, item_version,
                 reverted_to_log_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(entry.item_id)
        .bind(entry.item_type.as_str())
        .bind(entry.action.as_str())
        .bind(entry.timestamp)
        .bind(change_data)
        .bind(&entry.blob_key_before)
        .bind(&entry.blob_key_after)
        .bind(entry.item_version)
        .bind(entry.reverted_to_log_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(entry.id)
    }

    async fn list_history(
        &self,
        item_id: Uuid,
        item_type: ItemType,
        limit: i64,
    ) -> Result<Vec<HistoryLog>, StoreError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, user_id, item_id, item_type, action, timestamp,
                   change_data, blob_key_before, blob_key_after, item_version,
                   reverted_to_log_id
            FROM history_log
            WHERE item_id = $1 AND item_type = $2
            ORDER BY timestamp DESC
            LIMIT $3
            "#,
        )
        .bind(item_id)
        .bind(item_type.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(HistoryLog::try_from).collect()
    }

    async fn get_history(&self, log_id: Uuid) -> Result<HistoryLog, StoreError> {
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, user_id, item_id, item_type, action, timestamp,
                   change_data, blob_key_before, blob_key_after, item_version,
                   reverted_to_log_id
            FROM history_log
            WHERE id = $1
            "#,
        )
        .bind(log_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?;

        HistoryLog::try_from(row)
    }
}

//! Core data model: users, items, changes and history log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two item variants share one lifecycle but carry distinct metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Post,
    CodeFile,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::CodeFile => "codefile",
        }
    }

    /// Parse the wire representation ("post" / "codefile").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Self::Post),
            "codefile" => Some(Self::CodeFile),
            _ => None,
        }
    }

    /// MIME hint used when uploading content bytes.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Post => "text/markdown",
            Self::CodeFile => "text/plain",
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription key for the hub: `<itemType>:<itemId>`.
pub fn item_key(item_type: ItemType, item_id: Uuid) -> String {
    format!("{}:{}", item_type, item_id)
}

/// A registered user. The username doubles as the primary key.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Blog post metadata. Content bytes live in the blob store.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Opaque address of the current content bytes. Empty until first write.
    #[serde(skip_serializing)]
    pub blob_key: String,
    /// Optimistic concurrency token; increments by one on every mutation.
    pub version: i64,
}

/// Code file metadata. Same lifecycle as `Post`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CodeFile {
    pub id: Uuid,
    pub user_id: String,
    pub file_name: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub blob_key: String,
    pub version: i64,
}

/// Tagged metadata view handed to the coordinator.
///
/// The coordinator only ever needs the shared lifecycle fields; accessors
/// below expose them without the caller matching on the variant.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ItemMeta {
    Post(Post),
    CodeFile(CodeFile),
}

impl ItemMeta {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Post(p) => p.id,
            Self::CodeFile(f) => f.id,
        }
    }

    pub fn owner(&self) -> &str {
        match self {
            Self::Post(p) => &p.user_id,
            Self::CodeFile(f) => &f.user_id,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            Self::Post(p) => p.version,
            Self::CodeFile(f) => f.version,
        }
    }

    pub fn blob_key(&self) -> &str {
        match self {
            Self::Post(p) => &p.blob_key,
            Self::CodeFile(f) => &f.blob_key,
        }
    }

    pub fn set_blob_key(&mut self, key: String) {
        match self {
            Self::Post(p) => p.blob_key = key,
            Self::CodeFile(f) => f.blob_key = key,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Post(_) => ItemType::Post,
            Self::CodeFile(_) => ItemType::CodeFile,
        }
    }
}

/// A single modification within a document.
///
/// `line`/`column` anchor the change in the text as it exists when the
/// change is applied (0-based, counted in Unicode codepoints, lines split
/// on `\n`). `removed` codepoints are deleted forward from the anchor, then
/// `text` is inserted in their place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub line: usize,
    pub column: usize,
    pub text: String,
    pub removed: usize,
}

/// Action recorded by a history log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Create,
    Patch,
    Delete,
    Snapshot,
    Revert,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::Snapshot => "snapshot",
            Self::Revert => "revert",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "patch" => Some(Self::Patch),
            "delete" => Some(Self::Delete),
            "snapshot" => Some(Self::Snapshot),
            "revert" => Some(Self::Revert),
            _ => None,
        }
    }
}

/// Append-only action log entry. Entries are immutable once written.
///
/// Blob keys are persisted but never serialized to clients; they are an
/// internal storage detail. `blob_key_after` is set for create/snapshot/
/// revert (the self-contained restore points plus the revert head),
/// `blob_key_before` for delete.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryLog {
    pub id: Uuid,
    pub user_id: String,
    pub item_id: Uuid,
    pub item_type: ItemType,
    pub action: HistoryAction,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_data: Option<Change>,
    #[serde(skip_serializing)]
    pub blob_key_before: Option<String>,
    #[serde(skip_serializing)]
    pub blob_key_after: Option<String>,
    pub item_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverted_to_log_id: Option<Uuid>,
}

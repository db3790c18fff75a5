//! Blob store adapters.
//!
//! Content bytes are addressed by opaque string keys. The system forms keys
//! as `<itemType>/<userId>/<itemId>` but never interprets them afterwards.
//! Writes to a single key are atomic at the backend; the coordinator's
//! blob-before-metadata ordering relies on that.

use async_trait::async_trait;
use thiserror::Error;

pub mod fs;
pub mod memory;
pub mod s3;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found")]
    NotFound,

    #[error("blob backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
    async fn exists(&self, key: &str) -> Result<bool, BlobError>;
}

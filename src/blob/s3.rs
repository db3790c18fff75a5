//! S3 blob store (AWS or any S3-compatible endpoint such as MinIO).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use super::{BlobError, BlobStore};
use crate::config::StorageConfig;

pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Build a client from the ambient AWS configuration (env vars, shared
    /// config, IAM role), with optional endpoint/path-style overrides for
    /// S3-compatible servers.
    pub async fn new(cfg: &StorageConfig) -> Result<Self, BlobError> {
        if cfg.s3_bucket.is_empty() {
            return Err(BlobError::Backend(
                "S3 storage selected but S3_BUCKET_NAME is not set".to_string(),
            ));
        }

        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(cfg.s3_force_path_style);
        if !cfg.s3_endpoint.is_empty() {
            builder = builder.endpoint_url(&cfg.s3_endpoint);
        }
        let client = Client::from_conf(builder.build());

        tracing::info!(bucket = %cfg.s3_bucket, "S3 blob store initialized");
        Ok(Self {
            client,
            bucket: cfg.s3_bucket.clone(),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BlobError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    BlobError::NotFound
                } else {
                    BlobError::Backend(service_err.to_string())
                }
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| BlobError::Backend(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| BlobError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(BlobError::Backend(service_err.to_string()))
                }
            }
        }
    }
}

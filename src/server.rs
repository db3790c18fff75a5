//! Application assembly: adapter construction from configuration, shared
//! state, and the top-level router.

use std::sync::Arc;

use axum::Router;

use crate::blob::{BlobStore, FsBlobStore, MemoryBlobStore, S3BlobStore};
use crate::cache::{ContentCache, MemoryCache, NoopCache};
use crate::config::Config;
use crate::service::Service;
use crate::store::{MemoryMetadataStore, MetadataStore, PgMetadataStore};
use crate::ws::{Hub, HubHandle};
use crate::{api, error::ServiceError};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
    pub hub: HubHandle,
}

/// Build the full application from configuration: adapters, coordinator,
/// hub, router.
pub async fn create_app(config: &Config) -> Result<Router, ServiceError> {
    let store = build_store(config).await?;
    let blob = build_blob(config).await?;
    let cache = build_cache(config);

    let service = Arc::new(Service::new(
        store,
        blob,
        cache,
        config.jwt.clone(),
        config.snapshot.interval_changes,
    ));
    let hub = Hub::spawn();

    Ok(api::router(AppState { service, hub }))
}

async fn build_store(config: &Config) -> Result<Arc<dyn MetadataStore>, ServiceError> {
    match config.database.kind.as_str() {
        "memory" => {
            tracing::info!("metadata store: in-memory");
            Ok(Arc::new(MemoryMetadataStore::new()))
        }
        "postgres" => {
            if config.database.url.is_empty() {
                return Err(ServiceError::Internal(
                    "DB_TYPE is postgres but DATABASE_URL is not set".to_string(),
                ));
            }
            let store = PgMetadataStore::connect(&config.database.url)
                .await
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            tracing::info!("metadata store: postgres");
            Ok(Arc::new(store))
        }
        other => Err(ServiceError::Internal(format!(
            "unsupported DB_TYPE: {other}"
        ))),
    }
}

async fn build_blob(config: &Config) -> Result<Arc<dyn BlobStore>, ServiceError> {
    match config.storage.kind.as_str() {
        "s3" => {
            let store = S3BlobStore::new(&config.storage)
                .await
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            Ok(Arc::new(store))
        }
        "local" => {
            tracing::info!(dir = %config.storage.local_dir, "blob store: local filesystem");
            Ok(Arc::new(FsBlobStore::new(config.storage.local_dir.as_str())))
        }
        "memory" => Ok(Arc::new(MemoryBlobStore::new())),
        other => Err(ServiceError::Internal(format!(
            "unsupported STORAGE_TYPE: {other}"
        ))),
    }
}

fn build_cache(config: &Config) -> Arc<dyn ContentCache> {
    if config.cache.enabled {
        tracing::info!("cache: in-process TTL");
        Arc::new(MemoryCache::new())
    } else {
        tracing::info!("cache: disabled");
        Arc::new(NoopCache)
    }
}

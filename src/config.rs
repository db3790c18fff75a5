//! Server configuration.
//!
//! Configuration is loaded from environment variables (a `.env` file is
//! honored if present), with sensible defaults for local development.
//! Insecure or incomplete settings are logged as warnings at startup but do
//! not prevent the server from running; adapter construction decides what
//! is actually fatal.

use std::time::Duration;

/// Listen address for the HTTP/WebSocket server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// JWT signing parameters.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration: Duration,
}

/// Metadata store selection.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// "postgres" or "memory"
    pub kind: String,
    pub url: String,
}

/// Blob store selection.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// "s3" or "local"
    pub kind: String,
    pub s3_bucket: String,
    /// Optional custom endpoint (MinIO and friends).
    pub s3_endpoint: String,
    pub s3_force_path_style: bool,
    /// Root directory for the "local" backend.
    pub local_dir: String,
}

/// Cache selection.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
}

/// Snapshot cadence for the history engine.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Emit a snapshot history entry every N applied changes. 0 disables.
    pub interval_changes: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub snapshot: SnapshotConfig,
}

const DEFAULT_JWT_SECRET: &str = "insecure-dev-secret";

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let jwt_exp_minutes: u64 = env_or("JWT_EXPIRATION_MINUTES", "60")
            .parse()
            .unwrap_or(60);
        let snapshot_interval: u32 = env_or("SNAPSHOT_INTERVAL_CHANGES", "50")
            .parse()
            .unwrap_or(50);

        let cfg = Self {
            server: ServerConfig {
                host: env_or("SERVER_HOST", "0.0.0.0"),
                port: env_or("SERVER_PORT", "8080").parse().unwrap_or(8080),
            },
            jwt: JwtConfig {
                secret: env_or("JWT_SECRET", DEFAULT_JWT_SECRET),
                expiration: Duration::from_secs(jwt_exp_minutes * 60),
            },
            database: DatabaseConfig {
                kind: env_or("DB_TYPE", "postgres"),
                url: env_or("DATABASE_URL", ""),
            },
            storage: StorageConfig {
                kind: env_or("STORAGE_TYPE", "local"),
                s3_bucket: env_or("S3_BUCKET_NAME", ""),
                s3_endpoint: env_or("S3_ENDPOINT", ""),
                s3_force_path_style: env_or("S3_USE_PATH_STYLE", "false")
                    .parse()
                    .unwrap_or(false),
                local_dir: env_or("LOCAL_STORAGE_DIR", "./data/blobs"),
            },
            cache: CacheConfig {
                enabled: env_or("CACHE_ENABLED", "true").parse().unwrap_or(true),
            },
            snapshot: SnapshotConfig {
                interval_changes: snapshot_interval,
            },
        };

        if cfg.jwt.secret == DEFAULT_JWT_SECRET {
            tracing::warn!("JWT_SECRET is set to the default insecure value");
        }
        if cfg.storage.kind == "s3" && cfg.storage.s3_bucket.is_empty() {
            tracing::warn!("STORAGE_TYPE is s3 but S3_BUCKET_NAME is not set");
        }
        if cfg.database.kind == "postgres" && cfg.database.url.is_empty() {
            tracing::warn!("DB_TYPE is postgres but DATABASE_URL is not set");
        }

        cfg
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

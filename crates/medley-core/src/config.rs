//! Configuration module
//!
//! Environment-driven configuration for the API service, the metadata index,
//! the asset store backends, and the upload queue. Every knob has a typed
//! default so a bare `.env` boots a working local setup.

use std::env;

use anyhow::{bail, Context};

// Common defaults
const SERVER_PORT: u16 = 3100;
const MAX_BULK_BATCH_SIZE: usize = 50;
const UPLOAD_MAX_CONCURRENT: usize = 3;
const UPLOAD_MAX_RETRIES: u32 = 2;
const UPLOAD_RETRY_BACKOFF_BASE_MS: u64 = 500;
const UPLOAD_TRANSFER_TIMEOUT_SECS: u64 = 300;
const BACKEND_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Which key/value store backs the metadata index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    Memory,
    File,
}

/// Which asset store implementation serves a media kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Http,
    Local,
}

/// Configuration for one external asset store service.
#[derive(Clone, Debug)]
pub struct AssetStoreConfig {
    pub backend: StoreBackend,
    /// HTTP backend: upload endpoint, e.g. `https://img.example/v1/upload`.
    pub endpoint: Option<String>,
    /// HTTP backend: bearer token.
    pub api_key: Option<String>,
    /// Local backend: directory files are written under.
    pub local_path: Option<String>,
    /// Local backend: base URL files are served from.
    pub local_base_url: Option<String>,
    pub request_timeout_secs: u64,
}

/// Upload queue tuning.
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub transfer_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub index_backend: IndexBackend,
    /// FileKv base directory; required when `index_backend` is `File`.
    pub index_path: Option<String>,
    pub image_store: AssetStoreConfig,
    pub video_store: AssetStoreConfig,
    pub upload: UploadConfig,
    pub max_bulk_batch_size: usize,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn store_from_env(prefix: &str) -> anyhow::Result<AssetStoreConfig> {
    let backend = match env::var(format!("{prefix}_STORE_BACKEND")).as_deref() {
        Ok("http") => StoreBackend::Http,
        Ok("local") | Err(_) => StoreBackend::Local,
        Ok(other) => bail!("{prefix}_STORE_BACKEND: unknown backend '{other}'"),
    };
    Ok(AssetStoreConfig {
        backend,
        endpoint: env::var(format!("{prefix}_STORE_ENDPOINT")).ok(),
        api_key: env::var(format!("{prefix}_STORE_API_KEY")).ok(),
        local_path: env::var(format!("{prefix}_STORE_LOCAL_PATH")).ok(),
        local_base_url: env::var(format!("{prefix}_STORE_LOCAL_BASE_URL")).ok(),
        request_timeout_secs: env_parse(
            &format!("{prefix}_STORE_TIMEOUT_SECS"),
            BACKEND_REQUEST_TIMEOUT_SECS,
        ),
    })
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let index_backend = match env::var("INDEX_BACKEND").as_deref() {
            Ok("file") => IndexBackend::File,
            Ok("memory") | Err(_) => IndexBackend::Memory,
            Ok(other) => bail!("INDEX_BACKEND: unknown backend '{other}'"),
        };
        let index_path = env::var("INDEX_PATH").ok();
        if index_backend == IndexBackend::File && index_path.is_none() {
            bail!("INDEX_PATH is required when INDEX_BACKEND=file");
        }

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Config {
            server_port: env_parse("SERVER_PORT", SERVER_PORT),
            cors_origins,
            index_backend,
            index_path,
            image_store: store_from_env("IMAGE").context("image store configuration")?,
            video_store: store_from_env("VIDEO").context("video store configuration")?,
            upload: UploadConfig {
                max_concurrent: env_parse("UPLOAD_MAX_CONCURRENT", UPLOAD_MAX_CONCURRENT).max(1),
                max_retries: env_parse("UPLOAD_MAX_RETRIES", UPLOAD_MAX_RETRIES),
                retry_backoff_base_ms: env_parse(
                    "UPLOAD_RETRY_BACKOFF_BASE_MS",
                    UPLOAD_RETRY_BACKOFF_BASE_MS,
                ),
                transfer_timeout_secs: env_parse(
                    "UPLOAD_TRANSFER_TIMEOUT_SECS",
                    UPLOAD_TRANSFER_TIMEOUT_SECS,
                ),
            },
            max_bulk_batch_size: env_parse("MAX_BULK_BATCH_SIZE", MAX_BULK_BATCH_SIZE),
        })
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: UPLOAD_MAX_CONCURRENT,
            max_retries: UPLOAD_MAX_RETRIES,
            retry_backoff_base_ms: UPLOAD_RETRY_BACKOFF_BASE_MS,
            transfer_timeout_secs: UPLOAD_TRANSFER_TIMEOUT_SECS,
        }
    }
}

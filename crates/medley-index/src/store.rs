//! Key/value store abstraction
//!
//! This module defines the KvStore trait that all index backends must
//! implement. The contract is deliberately narrow: get, put, delete over
//! string keys and JSON values. Listing is a `get` on a dedicated index key;
//! no native query capability is assumed.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Index operation errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Key/value store abstraction
///
/// All index backends (in-memory, file) must implement this trait. The asset
/// repository works against it without coupling to a specific backend.
///
/// **Key format:** keys are colon-separated segments (`asset:{id}`,
/// `asset:index`). Keys must not contain `/` or `..`; backends reject them.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the value stored at `key`, or `None` if absent.
    async fn get(&self, key: &str) -> IndexResult<Option<JsonValue>>;

    /// Store `value` at `key`, replacing any previous value.
    async fn put(&self, key: &str, value: JsonValue) -> IndexResult<()>;

    /// Remove the value at `key`. Deleting an absent key is a no-op.
    async fn delete(&self, key: &str) -> IndexResult<()>;
}

/// Reject keys that could escape a file-backed store or collide with paths.
pub(crate) fn validate_key(key: &str) -> IndexResult<()> {
    if key.is_empty() || key.contains('/') || key.contains("..") {
        return Err(IndexError::InvalidKey(key.to_string()));
    }
    Ok(())
}

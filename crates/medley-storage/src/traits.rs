//! Asset store abstraction trait
//!
//! This module defines the AssetBackend trait that all asset stores must
//! implement, plus the request/response types and error enum shared by the
//! implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use medley_core::MediaKind;

/// Asset store operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Transfer timed out")]
    Timeout,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether a failed transfer may be retried. Cancellation is explicitly
    /// excluded from the retry path; auth, validation, and configuration
    /// failures will not heal on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::UploadFailed(_)
                | StorageError::DeleteFailed(_)
                | StorageError::BackendError(_)
                | StorageError::Timeout
                | StorageError::IoError(_)
        )
    }
}

/// Result type for asset store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One binary payload to store.
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Descriptor returned by a successful `put`.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Stable identifier assigned by the store.
    pub id: String,
    /// Public retrieval URL.
    pub url: String,
    /// Opaque reference needed to delete the object later.
    pub backend_ref: String,
    /// Per-variant URLs, when the store produces renditions (images).
    pub variants: HashMap<String, String>,
}

/// Transfers report 0-100 progress through this channel. Senders use
/// `try_send`; a full channel drops the update rather than stalling the
/// transfer.
pub type ProgressSender = mpsc::Sender<u8>;

/// Asset store abstraction trait
///
/// Both external services (image-oriented and video-oriented) expose the same
/// narrow contract. Implementations must honor `cancel` by actually
/// interrupting the in-flight I/O, not merely flagging it.
#[async_trait]
pub trait AssetBackend: Send + Sync {
    /// Which media kind this backend serves.
    fn kind(&self) -> MediaKind;

    /// Durably persist a blob and return its descriptor.
    async fn put(
        &self,
        request: PutRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> StorageResult<StoredObject>;

    /// Delete a blob by its backend reference. "Already gone" is success, so
    /// a bulk delete stays retryable.
    async fn delete(&self, backend_ref: &str) -> StorageResult<()>;
}

/// The per-kind backend pair the rest of the system works against.
#[derive(Clone)]
pub struct AssetBackends {
    image: Arc<dyn AssetBackend>,
    video: Arc<dyn AssetBackend>,
}

impl AssetBackends {
    pub fn new(image: Arc<dyn AssetBackend>, video: Arc<dyn AssetBackend>) -> Self {
        Self { image, video }
    }

    pub fn for_kind(&self, kind: MediaKind) -> &Arc<dyn AssetBackend> {
        match kind {
            MediaKind::Image => &self.image,
            MediaKind::Video => &self.video,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StorageError::UploadFailed("net".into()).is_retryable());
        assert!(StorageError::Timeout.is_retryable());
        assert!(!StorageError::Cancelled.is_retryable());
        assert!(!StorageError::Unauthorized("401".into()).is_retryable());
        assert!(!StorageError::ConfigError("missing endpoint".into()).is_retryable());
    }
}

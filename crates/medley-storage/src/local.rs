//! Local filesystem asset store.
//!
//! Development and test backend. Writes chunk by chunk so progress and
//! cancellation behave like a real network transfer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use medley_core::MediaKind;

use crate::traits::{
    AssetBackend, ProgressSender, PutRequest, StorageError, StorageResult, StoredObject,
};

const WRITE_CHUNK_SIZE: usize = 64 * 1024;

pub struct LocalAssetStore {
    kind: MediaKind,
    base_path: PathBuf,
    base_url: String,
}

impl LocalAssetStore {
    /// Create a new LocalAssetStore rooted at `base_path`, serving files from
    /// `base_url`.
    pub async fn new(
        kind: MediaKind,
        base_path: impl Into<PathBuf>,
        base_url: String,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(Self {
            kind,
            base_path,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Strip anything path-like from a client-supplied filename.
    fn sanitize_name(name: &str) -> String {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        let safe: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if safe.is_empty() {
            "file".to_string()
        } else {
            safe
        }
    }

    fn ref_to_path(&self, backend_ref: &str) -> StorageResult<PathBuf> {
        if backend_ref.contains("..") || backend_ref.contains('/') || backend_ref.is_empty() {
            return Err(StorageError::InvalidInput(format!(
                "invalid backend ref: {backend_ref}"
            )));
        }
        Ok(self.base_path.join(backend_ref))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl AssetBackend for LocalAssetStore {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn put(
        &self,
        request: PutRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> StorageResult<StoredObject> {
        let id = Uuid::new_v4().to_string();
        let filename = format!("{}_{}", id, Self::sanitize_name(&request.name));
        let path = self.base_path.join(&filename);

        let total = request.data.len().max(1);
        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        let mut written = 0usize;
        for chunk in request.data.chunks(WRITE_CHUNK_SIZE) {
            if cancel.is_cancelled() {
                drop(file);
                let _ = fs::remove_file(&path).await;
                return Err(StorageError::Cancelled);
            }
            file.write_all(chunk)
                .await
                .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
            written += chunk.len();
            let percent = ((written * 100) / total).min(100) as u8;
            let _ = progress.try_send(percent);
        }
        file.flush()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        // A zero-byte payload has no chunks; still report completion.
        let _ = progress.try_send(100);

        tracing::debug!(kind = %self.kind, %id, bytes = written, "Stored local object");

        Ok(StoredObject {
            id,
            url: format!("{}/{}", self.base_url, filename),
            backend_ref: filename,
            variants: Default::default(),
        })
    }

    async fn delete(&self, backend_ref: &str) -> StorageResult<()> {
        let path = self.ref_to_path(backend_ref)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Idempotent delete: already gone is success.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }
}

//! HTTP asset store client.
//!
//! Talks to an external store over `multipart/form-data` POST for uploads and
//! DELETE for removals. One instance is configured per service: the image
//! service returns per-variant URLs, the video service a playback URL; both
//! answer with the same descriptor shape otherwise.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use medley_core::MediaKind;

use crate::traits::{
    AssetBackend, ProgressSender, PutRequest, StorageError, StorageResult, StoredObject,
};

const PROGRESS_CHUNK_SIZE: usize = 64 * 1024;

/// Descriptor the store returns on a successful upload.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    backend_ref: Option<String>,
    #[serde(default)]
    variants: HashMap<String, String>,
}

pub struct HttpAssetStore {
    kind: MediaKind,
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpAssetStore {
    pub fn new(
        kind: MediaKind,
        endpoint: String,
        api_key: String,
        request_timeout: Duration,
    ) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("HTTP client: {e}")))?;
        Ok(Self {
            kind,
            client,
            endpoint,
            api_key,
        })
    }

    /// Wrap the payload in a chunked stream that reports cumulative progress
    /// as the transport pulls bytes off it.
    fn progress_body(data: Bytes, progress: ProgressSender) -> Body {
        let total = data.len().max(1) as u64;
        let sent = Arc::new(AtomicU64::new(0));
        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(PROGRESS_CHUNK_SIZE)
            .map(|start| data.slice(start..(start + PROGRESS_CHUNK_SIZE).min(data.len())))
            .collect();
        // A zero-byte payload produces no chunks; report completion up
        // front so the transfer still shows 100.
        if chunks.is_empty() {
            let _ = progress.try_send(100);
        }

        let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            let so_far = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
            let percent = ((so_far * 100) / total).min(100) as u8;
            let _ = progress.try_send(percent);
            Ok::<Bytes, std::io::Error>(chunk)
        }));
        Body::wrap_stream(stream)
    }

    fn map_error_status(status: StatusCode, body: String) -> StorageError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::Unauthorized(body),
            StatusCode::NOT_FOUND => StorageError::NotFound(body),
            _ => StorageError::BackendError(format!("{status}: {body}")),
        }
    }
}

#[async_trait]
impl AssetBackend for HttpAssetStore {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn put(
        &self,
        request: PutRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> StorageResult<StoredObject> {
        let size = request.data.len() as u64;
        let part = Part::stream_with_length(
            Self::progress_body(request.data, progress),
            size,
        )
        .file_name(request.name.clone())
        .mime_str(&request.content_type)
        .map_err(|e| StorageError::InvalidInput(format!("content type: {e}")))?;
        let form = Form::new().part("file", part);

        let send = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(StorageError::Cancelled),
            result = send => result.map_err(|e| {
                if e.is_timeout() {
                    StorageError::Timeout
                } else {
                    StorageError::UploadFailed(e.to_string())
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_error_status(status, body));
        }

        let descriptor: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::BackendError(format!("descriptor parse: {e}")))?;

        let url = descriptor
            .url
            .or_else(|| descriptor.variants.get("original").cloned())
            .ok_or_else(|| {
                StorageError::BackendError("descriptor missing url".to_string())
            })?;

        Ok(StoredObject {
            backend_ref: descriptor.backend_ref.unwrap_or_else(|| descriptor.id.clone()),
            id: descriptor.id,
            url,
            variants: descriptor.variants,
        })
    }

    async fn delete(&self, backend_ref: &str) -> StorageResult<()> {
        let response = self
            .client
            .delete(&self.endpoint)
            .bearer_auth(&self.api_key)
            .query(&[("ref", backend_ref)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StorageError::Timeout
                } else {
                    StorageError::DeleteFailed(e.to_string())
                }
            })?;

        let status = response.status();
        // Idempotent delete: the remote object being gone already is success.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            tracing::debug!(kind = %self.kind, backend_ref, "Backend delete completed");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        match Self::map_error_status(status, body) {
            StorageError::NotFound(_) => Ok(()),
            err => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn empty_body_still_reports_completion() {
        let (tx, mut rx) = mpsc::channel(4);
        let _body = HttpAssetStore::progress_body(Bytes::new(), tx);
        assert_eq!(rx.try_recv(), Ok(100));
    }

    #[test]
    fn error_status_mapping() {
        assert!(matches!(
            HttpAssetStore::map_error_status(StatusCode::UNAUTHORIZED, "no".into()),
            StorageError::Unauthorized(_)
        ));
        assert!(matches!(
            HttpAssetStore::map_error_status(StatusCode::NOT_FOUND, "gone".into()),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            HttpAssetStore::map_error_status(StatusCode::BAD_GATEWAY, "oops".into()),
            StorageError::BackendError(_)
        ));
    }
}

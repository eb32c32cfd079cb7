//! Backend construction from configuration.

use std::sync::Arc;
use std::time::Duration;

use medley_core::config::{AssetStoreConfig, StoreBackend};
use medley_core::{Config, MediaKind};

use crate::http::HttpAssetStore;
use crate::local::LocalAssetStore;
use crate::traits::{AssetBackend, AssetBackends, StorageError, StorageResult};

async fn create_backend(
    kind: MediaKind,
    config: &AssetStoreConfig,
) -> StorageResult<Arc<dyn AssetBackend>> {
    match config.backend {
        StoreBackend::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                StorageError::ConfigError(format!("{kind} store: endpoint not configured"))
            })?;
            let api_key = config.api_key.clone().ok_or_else(|| {
                StorageError::ConfigError(format!("{kind} store: API key not configured"))
            })?;
            let store = HttpAssetStore::new(
                kind,
                endpoint,
                api_key,
                Duration::from_secs(config.request_timeout_secs),
            )?;
            Ok(Arc::new(store))
        }
        StoreBackend::Local => {
            let base_path = config.local_path.clone().unwrap_or_else(|| {
                std::env::temp_dir()
                    .join(format!("medley-{kind}-store"))
                    .to_string_lossy()
                    .into_owned()
            });
            let base_url = config
                .local_base_url
                .clone()
                .unwrap_or_else(|| format!("http://localhost:3100/media/{kind}"));
            let store = LocalAssetStore::new(kind, base_path, base_url).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the per-kind backend pair from configuration.
pub async fn create_backends(config: &Config) -> StorageResult<AssetBackends> {
    let image = create_backend(MediaKind::Image, &config.image_store).await?;
    let video = create_backend(MediaKind::Video, &config.video_store).await?;
    Ok(AssetBackends::new(image, video))
}

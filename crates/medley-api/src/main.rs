use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use medley_api::state::AppState;
use medley_core::config::IndexBackend;
use medley_core::Config;
use medley_index::{AssetRepository, FileKv, KvStore, MemoryKv};
use medley_storage::create_backends;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn KvStore> = match config.index_backend {
        IndexBackend::Memory => Arc::new(MemoryKv::new()),
        IndexBackend::File => {
            let path = config
                .index_path
                .clone()
                .context("INDEX_PATH required for file index backend")?;
            Arc::new(FileKv::new(path).await?)
        }
    };
    let repository = AssetRepository::new(store);
    let backends = create_backends(&config).await?;

    let state = Arc::new(AppState {
        repository,
        backends,
        max_bulk_batch_size: config.max_bulk_batch_size,
    });

    let cors = if config.cors_origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let router = medley_api::build_router(state).layer(cors);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Medley API listening");

    axum::serve(listener, router).await?;
    Ok(())
}

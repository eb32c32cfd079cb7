//! Application state.

use medley_index::AssetRepository;
use medley_storage::AssetBackends;

/// Shared state behind every handler. The coordinator itself is stateless per
/// call; the repository and backends are the only cross-call state.
#[derive(Clone)]
pub struct AppState {
    pub repository: AssetRepository,
    pub backends: AssetBackends,
    pub max_bulk_batch_size: usize,
}

//! Metadata index for Medley.
//!
//! The index is a plain key/value store (no transactions, no queries) holding
//! one record per asset, one ordered list of all known ids, and one usage
//! list per asset:
//!
//! - `asset:{id}` — the [`MediaAsset`](medley_core::MediaAsset) record as JSON
//! - `asset:index` — JSON array of ids, newest first
//! - `asset:{id}:usage` — JSON array of opaque usage references
//!
//! [`AssetRepository`] owns the layout and serializes every read-modify-write
//! of the index list through a single mutex, so concurrent bulk operations in
//! one process cannot lose index updates.

pub mod file;
pub(crate) mod keys;
pub mod memory;
pub mod repository;
pub mod store;

pub use file::FileKv;
pub use memory::MemoryKv;
pub use repository::AssetRepository;
pub use store::{KvStore, IndexError, IndexResult};

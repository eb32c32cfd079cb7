//! Asset store clients for Medley.
//!
//! This crate provides the `AssetBackend` trait and its implementations: an
//! HTTP client for the external image and video services, and a local
//! filesystem backend for development and tests. Two backend instances exist
//! at runtime (one per media kind); `AssetBackends` resolves the right one
//! from a `MediaKind` so callers never branch on kind themselves.

pub mod factory;
pub mod http;
pub mod local;
pub mod traits;

pub use factory::create_backends;
pub use http::HttpAssetStore;
pub use local::LocalAssetStore;
pub use traits::{
    AssetBackend, AssetBackends, ProgressSender, PutRequest, StorageError, StorageResult,
    StoredObject,
};

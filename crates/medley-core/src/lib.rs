//! Core types for Medley: asset models, error taxonomy, and configuration.
//!
//! This crate has no I/O of its own. The storage, index, uploader, and API
//! crates all depend on it and nothing here depends on them.

pub mod config;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{MediaAsset, MediaKind};

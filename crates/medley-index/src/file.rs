//! File-backed key/value store.
//!
//! One JSON file per key under a base directory. Writes go through a
//! temporary file and an atomic rename so a crash mid-write never leaves a
//! half-written record behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::fs;

use crate::store::{validate_key, IndexError, IndexResult, KvStore};

#[derive(Clone)]
pub struct FileKv {
    base_path: PathBuf,
}

impl FileKv {
    /// Create a new FileKv rooted at `base_path`, creating the directory if
    /// needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> IndexResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await.map_err(|e| {
            IndexError::Backend(format!(
                "failed to create index directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(FileKv { base_path })
    }

    fn key_to_path(&self, key: &str) -> IndexResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(format!("{key}.json")))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl KvStore for FileKv {
    async fn get(&self, key: &str) -> IndexResult<Option<JsonValue>> {
        let path = self.key_to_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: JsonValue) -> IndexResult<()> {
        let path = self.key_to_path(key)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(&value)?;
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> IndexResult<()> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trip_and_overwrite() {
        let dir = TempDir::new().unwrap();
        let kv = FileKv::new(dir.path()).await.unwrap();

        kv.put("asset:a", json!({"name": "one"})).await.unwrap();
        kv.put("asset:a", json!({"name": "two"})).await.unwrap();
        assert_eq!(
            kv.get("asset:a").await.unwrap(),
            Some(json!({"name": "two"}))
        );

        kv.delete("asset:a").await.unwrap();
        assert!(kv.get("asset:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let kv = FileKv::new(dir.path()).await.unwrap();
        assert!(kv.get("asset:nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let kv = FileKv::new(dir.path()).await.unwrap();
        assert!(kv.put("../escape", json!(1)).await.is_err());
    }
}

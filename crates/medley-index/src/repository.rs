//! Asset repository over the key/value store.
//!
//! Owns the record / index / usage key layout and is the only code that
//! mutates `asset:index`. The index list is a single shared resource with no
//! transactional backing, so every read-modify-write of it runs under one
//! process-wide mutex (single-writer serialization point). Record and usage
//! writes are per-key and need no such coordination.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use medley_core::MediaAsset;

use crate::keys::{asset_key, usage_key, INDEX_KEY};
use crate::store::{IndexError, IndexResult, KvStore};

#[derive(Clone)]
pub struct AssetRepository {
    store: Arc<dyn KvStore>,
    index_lock: Arc<Mutex<()>>,
}

impl AssetRepository {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            index_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Fetch one asset record.
    pub async fn get(&self, id: &str) -> IndexResult<Option<MediaAsset>> {
        match self.store.get(&asset_key(id)).await? {
            Some(value) => {
                let asset = serde_json::from_value(value)
                    .map_err(|e| IndexError::Backend(format!("corrupt record for {id}: {e}")))?;
                Ok(Some(asset))
            }
            None => Ok(None),
        }
    }

    /// Write one asset record, replacing any previous version. Does not touch
    /// the index list.
    pub async fn put(&self, asset: &MediaAsset) -> IndexResult<()> {
        let value = serde_json::to_value(asset)?;
        self.store.put(&asset_key(&asset.id), value).await
    }

    /// Register a freshly uploaded asset: write the record, then prepend its
    /// id to the index list (newest first). Re-registering an id overwrites
    /// the record without duplicating the index entry.
    pub async fn register(&self, asset: &MediaAsset) -> IndexResult<()> {
        self.put(asset).await?;

        let _guard = self.index_lock.lock().await;
        let mut ids = self.read_index().await?;
        if !ids.iter().any(|existing| existing == &asset.id) {
            ids.insert(0, asset.id.clone());
        }
        self.write_index(&ids).await?;
        tracing::debug!(asset_id = %asset.id, index_len = ids.len(), "Asset registered");
        Ok(())
    }

    /// Delete one asset's record and usage list. Does not touch the index
    /// list; bulk delete rewrites the index once per batch via
    /// [`remove_from_index`](Self::remove_from_index).
    pub async fn delete_record(&self, id: &str) -> IndexResult<()> {
        self.store.delete(&asset_key(id)).await?;
        self.store.delete(&usage_key(id)).await
    }

    /// Remove a set of ids from the index list in one read-modify-write.
    pub async fn remove_from_index(&self, ids: &[String]) -> IndexResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _guard = self.index_lock.lock().await;
        let current = self.read_index().await?;
        let remaining: Vec<String> = current
            .into_iter()
            .filter(|id| !ids.contains(id))
            .collect();
        self.write_index(&remaining).await?;
        tracing::debug!(removed = ids.len(), remaining = remaining.len(), "Index rewritten");
        Ok(())
    }

    /// All known asset ids, newest first.
    pub async fn index(&self) -> IndexResult<Vec<String>> {
        self.read_index().await
    }

    /// All asset records in index order. Ids whose record is missing (a
    /// transient mid-operation state) are skipped, not errors.
    pub async fn list(&self) -> IndexResult<Vec<MediaAsset>> {
        let ids = self.read_index().await?;
        let mut assets = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(asset) = self.get(id).await? {
                assets.push(asset);
            }
        }
        Ok(assets)
    }

    /// Usage references for one asset; empty if none recorded.
    pub async fn usage(&self, id: &str) -> IndexResult<Vec<String>> {
        match self.store.get(&usage_key(id)).await? {
            Some(JsonValue::Array(entries)) => Ok(entries
                .into_iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()),
            Some(_) | None => Ok(Vec::new()),
        }
    }

    /// Append one usage reference to an asset's usage list.
    pub async fn add_usage(&self, id: &str, reference: &str) -> IndexResult<()> {
        let mut entries = self.usage(id).await?;
        entries.push(reference.to_string());
        let value = serde_json::to_value(entries)?;
        self.store.put(&usage_key(id), value).await
    }

    async fn read_index(&self) -> IndexResult<Vec<String>> {
        match self.store.get(INDEX_KEY).await? {
            Some(JsonValue::Array(entries)) => Ok(entries
                .into_iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()),
            Some(_) | None => Ok(Vec::new()),
        }
    }

    async fn write_index(&self, ids: &[String]) -> IndexResult<()> {
        let value = serde_json::to_value(ids)?;
        self.store.put(INDEX_KEY, value).await
    }
}

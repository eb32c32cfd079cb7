//! Queue item state and events.

use bytes::Bytes;
use medley_core::MediaAsset;
use uuid::Uuid;

/// One local file handed to the queue. `data` is `Bytes`, so cloning an item
/// for a snapshot does not copy the payload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Lifecycle of one queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

/// One row of upload state. Created on enqueue, mutated only by the queue
/// actor, discarded when the caller clears completed items or cancels.
#[derive(Debug, Clone)]
pub struct UploadItem {
    /// Client-generated id; not the eventual asset id.
    pub id: Uuid,
    pub file: UploadFile,
    pub status: UploadStatus,
    /// 0-100, monotonic per item.
    pub progress: u8,
    pub retry_count: u32,
    /// Set only when the item has permanently failed.
    pub error: Option<String>,
    /// Set once the item has completed.
    pub result: Option<MediaAsset>,
}

impl UploadItem {
    pub(crate) fn new(file: UploadFile) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            status: UploadStatus::Pending,
            progress: 0,
            retry_count: 0,
            error: None,
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, UploadStatus::Completed | UploadStatus::Failed)
    }
}

/// Counts of items per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub uploading: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Notifications emitted by the queue. `Completed` carries the assembled
/// asset record; registering it in the metadata index is the receiver's job,
/// the queue never touches the index itself.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    Completed { item_id: Uuid, asset: MediaAsset },
    Failed {
        item_id: Uuid,
        name: String,
        error: String,
    },
    /// The queue has drained: no pending or uploading items remain. Fires
    /// once per drain, not once per item.
    Drained,
}

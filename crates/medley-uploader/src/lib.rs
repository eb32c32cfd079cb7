//! Upload queue for Medley.
//!
//! Turns an arbitrary batch of local files into a best-effort set of durably
//! stored assets. A single actor task owns all queue state; callers send
//! commands through a handle and observe results through an event channel,
//! so no queue mutation ever races another.

pub mod item;
pub mod queue;

pub use item::{QueueStats, UploadEvent, UploadFile, UploadItem, UploadStatus};
pub use queue::{UploadQueue, UploadQueueConfig};

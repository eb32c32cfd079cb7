//! Upload queue: actor loop, scheduler, retry with backoff, cancellation.
//!
//! Shutdown: [`UploadQueue::shutdown`] signals the actor to stop; it does not
//! wait for in-flight transfers. Dropping the handle has the same effect once
//! all clones are gone.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use medley_core::{MediaAsset, MediaKind};
use medley_storage::{AssetBackends, PutRequest, StorageError, StoredObject};

use crate::item::{QueueStats, UploadEvent, UploadFile, UploadItem, UploadStatus};

/// Maximum delay in milliseconds before retrying a failed transfer. Caps
/// exponential backoff so high retry counts do not produce excessive delays.
pub const MAX_RETRY_BACKOFF_MS: u64 = 30_000;

const COMMAND_BUFFER: usize = 64;
const UPDATE_BUFFER: usize = 256;
const PROGRESS_BUFFER: usize = 32;

/// Computes backoff in milliseconds for a given retry count (exponential
/// with cap).
#[inline]
pub(crate) fn compute_retry_backoff_ms(base_ms: u64, retry_count: u32) -> u64 {
    base_ms
        .saturating_mul(1_u64 << retry_count.min(16))
        .min(MAX_RETRY_BACKOFF_MS)
}

#[derive(Clone, Debug)]
pub struct UploadQueueConfig {
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub transfer_timeout_secs: u64,
}

impl Default for UploadQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_retries: 2,
            retry_backoff_base_ms: 500,
            transfer_timeout_secs: 300,
        }
    }
}

impl From<medley_core::config::UploadConfig> for UploadQueueConfig {
    fn from(c: medley_core::config::UploadConfig) -> Self {
        Self {
            max_concurrent: c.max_concurrent,
            max_retries: c.max_retries,
            retry_backoff_base_ms: c.retry_backoff_base_ms,
            transfer_timeout_secs: c.transfer_timeout_secs,
        }
    }
}

enum QueueCommand {
    Enqueue(Vec<UploadFile>, oneshot::Sender<Vec<Uuid>>),
    Cancel(Uuid),
    CancelAll,
    RetryFailed,
    ClearCompleted,
    Stats(oneshot::Sender<QueueStats>),
    Snapshot(oneshot::Sender<Vec<UploadItem>>),
    Shutdown,
}

/// Messages the transfer tasks send back into the actor.
enum TransferUpdate {
    Progress { item_id: Uuid, percent: u8 },
    Finished {
        item_id: Uuid,
        result: Result<StoredObject, StorageError>,
    },
    RetryReady { item_id: Uuid },
}

/// Handle to the upload queue actor. Cloneable; all clones talk to the same
/// queue.
#[derive(Clone)]
pub struct UploadQueue {
    cmd_tx: mpsc::Sender<QueueCommand>,
}

impl UploadQueue {
    /// Create a new queue and spawn its actor.
    ///
    /// `events` receives completion/failure/drain notifications; pass `None`
    /// when nobody listens. The channel is unbounded so every notification
    /// is delivered in emission order even to a receiver that reads late;
    /// a dropped receiver discards further events without stalling the
    /// actor.
    pub fn new(
        backends: AssetBackends,
        config: UploadQueueConfig,
        events: Option<mpsc::UnboundedSender<UploadEvent>>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (worker, update_rx) = QueueWorker::new(backends, config, events);

        tokio::spawn(async move {
            worker.run(cmd_rx, update_rx).await;
        });

        Self { cmd_tx }
    }

    /// Append one pending item per file, preserving submission order, and
    /// trigger processing. Returns the queue item ids in file order.
    pub async fn enqueue(&self, files: Vec<UploadFile>) -> Result<Vec<Uuid>> {
        let (tx, rx) = oneshot::channel();
        self.send(QueueCommand::Enqueue(files, tx)).await?;
        rx.await.map_err(|_| anyhow::anyhow!("upload queue stopped"))
    }

    /// Abort the item's in-flight transfer (if any) and remove it from the
    /// queue. Cancelling an unknown id is a no-op.
    pub async fn cancel(&self, item_id: Uuid) -> Result<()> {
        self.send(QueueCommand::Cancel(item_id)).await
    }

    /// Abort every in-flight transfer, then empty the queue.
    pub async fn cancel_all(&self) -> Result<()> {
        self.send(QueueCommand::CancelAll).await
    }

    /// Reset every failed item to pending with a fresh retry budget and
    /// re-trigger processing.
    pub async fn retry_failed(&self) -> Result<()> {
        self.send(QueueCommand::RetryFailed).await
    }

    /// Drop every completed item from the queue. Storage is unaffected.
    pub async fn clear_completed(&self) -> Result<()> {
        self.send(QueueCommand::ClearCompleted).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let (tx, rx) = oneshot::channel();
        self.send(QueueCommand::Stats(tx)).await?;
        rx.await.map_err(|_| anyhow::anyhow!("upload queue stopped"))
    }

    pub async fn snapshot(&self) -> Result<Vec<UploadItem>> {
        let (tx, rx) = oneshot::channel();
        self.send(QueueCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| anyhow::anyhow!("upload queue stopped"))
    }

    /// Signals the actor to exit. In-flight transfers are not awaited.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(QueueCommand::Shutdown).await;
    }

    async fn send(&self, cmd: QueueCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| anyhow::anyhow!("upload queue stopped"))
    }
}

struct Entry {
    item: UploadItem,
    cancel: CancellationToken,
    /// Waiting out a retry backoff; not schedulable until the timer fires.
    backing_off: bool,
}

struct QueueWorker {
    backends: AssetBackends,
    config: UploadQueueConfig,
    events: Option<mpsc::UnboundedSender<UploadEvent>>,
    entries: Vec<Entry>,
    update_tx: mpsc::Sender<TransferUpdate>,
    /// True once a drain notification went out for the current generation of
    /// work; reset whenever new schedulable work appears.
    drained_notified: bool,
}

impl QueueWorker {
    fn new(
        backends: AssetBackends,
        config: UploadQueueConfig,
        events: Option<mpsc::UnboundedSender<UploadEvent>>,
    ) -> (Self, mpsc::Receiver<TransferUpdate>) {
        let (update_tx, update_rx) = mpsc::channel(UPDATE_BUFFER);
        let worker = Self {
            backends,
            config,
            events,
            entries: Vec::new(),
            update_tx,
            drained_notified: false,
        };
        (worker, update_rx)
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<QueueCommand>,
        mut update_rx: mpsc::Receiver<TransferUpdate>,
    ) {
        tracing::info!(
            max_concurrent = self.config.max_concurrent,
            max_retries = self.config.max_retries,
            "Upload queue started"
        );
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(QueueCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(update) = update_rx.recv() => self.handle_update(update),
            }
        }
        // Abort whatever is still in flight so no transfer outlives the queue.
        for entry in &self.entries {
            entry.cancel.cancel();
        }
        tracing::info!("Upload queue stopped");
    }

    fn handle_command(&mut self, cmd: QueueCommand) {
        match cmd {
            QueueCommand::Enqueue(files, reply) => {
                let mut ids = Vec::with_capacity(files.len());
                for file in files {
                    let item = UploadItem::new(file);
                    ids.push(item.id);
                    self.entries.push(Entry {
                        item,
                        cancel: CancellationToken::new(),
                        backing_off: false,
                    });
                }
                if !ids.is_empty() {
                    self.drained_notified = false;
                }
                let _ = reply.send(ids);
                self.schedule();
            }
            QueueCommand::Cancel(item_id) => {
                if let Some(pos) = self.entries.iter().position(|e| e.item.id == item_id) {
                    let entry = self.entries.remove(pos);
                    if entry.item.status == UploadStatus::Uploading {
                        entry.cancel.cancel();
                    }
                    tracing::debug!(%item_id, "Upload cancelled");
                    self.schedule();
                    self.check_drained();
                }
            }
            QueueCommand::CancelAll => {
                // Abort every outstanding transfer before clearing the queue.
                for entry in &self.entries {
                    if entry.item.status == UploadStatus::Uploading {
                        entry.cancel.cancel();
                    }
                }
                let dropped = self.entries.len();
                self.entries.clear();
                tracing::debug!(dropped, "Upload queue cleared");
            }
            QueueCommand::RetryFailed => {
                let mut reset = 0;
                for entry in &mut self.entries {
                    if entry.item.status == UploadStatus::Failed {
                        entry.item.status = UploadStatus::Pending;
                        entry.item.retry_count = 0;
                        entry.item.progress = 0;
                        entry.item.error = None;
                        entry.backing_off = false;
                        entry.cancel = CancellationToken::new();
                        reset += 1;
                    }
                }
                if reset > 0 {
                    self.drained_notified = false;
                    tracing::debug!(reset, "Failed uploads reset to pending");
                }
                self.schedule();
            }
            QueueCommand::ClearCompleted => {
                self.entries
                    .retain(|e| e.item.status != UploadStatus::Completed);
            }
            QueueCommand::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            QueueCommand::Snapshot(reply) => {
                let _ = reply.send(self.entries.iter().map(|e| e.item.clone()).collect());
            }
            QueueCommand::Shutdown => unreachable!("handled in run loop"),
        }
    }

    fn handle_update(&mut self, update: TransferUpdate) {
        match update {
            TransferUpdate::Progress { item_id, percent } => {
                if let Some(entry) = self.entry_mut(item_id) {
                    if entry.item.status == UploadStatus::Uploading
                        && percent > entry.item.progress
                    {
                        entry.item.progress = percent.min(100);
                    }
                }
            }
            TransferUpdate::RetryReady { item_id } => {
                if let Some(entry) = self.entry_mut(item_id) {
                    entry.backing_off = false;
                }
                self.schedule();
            }
            TransferUpdate::Finished { item_id, result } => {
                let max_retries = self.config.max_retries;
                let backoff_base = self.config.retry_backoff_base_ms;
                let update_tx = self.update_tx.clone();

                let mut event = None;
                let mut backoff_ms = None;
                {
                    // The item may have been cancelled and removed while its
                    // transfer was finishing; that outcome is dropped.
                    let Some(entry) = self.entry_mut(item_id) else {
                        return;
                    };
                    match result {
                        Ok(object) => {
                            let asset = build_asset(&entry.item.file, object);
                            entry.item.status = UploadStatus::Completed;
                            entry.item.progress = 100;
                            entry.item.result = Some(asset.clone());
                            tracing::info!(%item_id, asset_id = %asset.id, "Upload completed");
                            event = Some(UploadEvent::Completed { item_id, asset });
                        }
                        Err(StorageError::Cancelled) => {
                            // User-initiated aborts are excluded from the
                            // retry path; the entry is removed on cancel, so
                            // reaching here means the token fired during a
                            // shutdown race.
                            tracing::debug!(%item_id, "Transfer reported cancellation");
                        }
                        Err(err)
                            if err.is_retryable() && entry.item.retry_count < max_retries =>
                        {
                            entry.item.retry_count += 1;
                            entry.item.status = UploadStatus::Pending;
                            entry.item.progress = 0;
                            entry.backing_off = true;
                            entry.cancel = CancellationToken::new();
                            let delay =
                                compute_retry_backoff_ms(backoff_base, entry.item.retry_count - 1);
                            tracing::warn!(
                                %item_id,
                                error = %err,
                                retry_count = entry.item.retry_count,
                                backoff_ms = delay,
                                "Upload failed, scheduling retry"
                            );
                            backoff_ms = Some(delay);
                        }
                        Err(err) => {
                            entry.item.status = UploadStatus::Failed;
                            entry.item.error = Some(err.to_string());
                            tracing::error!(
                                %item_id,
                                error = %err,
                                retry_count = entry.item.retry_count,
                                "Upload failed permanently"
                            );
                            event = Some(UploadEvent::Failed {
                                item_id,
                                name: entry.item.file.name.clone(),
                                error: err.to_string(),
                            });
                        }
                    }
                }
                if let Some(delay) = backoff_ms {
                    tokio::spawn(async move {
                        sleep(Duration::from_millis(delay)).await;
                        let _ = update_tx
                            .send(TransferUpdate::RetryReady { item_id })
                            .await;
                    });
                }
                if let Some(event) = event {
                    self.emit(event);
                }
                self.schedule();
                self.check_drained();
            }
        }
    }

    /// Start pending items, oldest first, into whatever slots are free.
    fn schedule(&mut self) {
        let uploading = self
            .entries
            .iter()
            .filter(|e| e.item.status == UploadStatus::Uploading)
            .count();
        let mut slots = self.config.max_concurrent.saturating_sub(uploading);

        for idx in 0..self.entries.len() {
            if slots == 0 {
                break;
            }
            let entry = &mut self.entries[idx];
            if entry.item.status != UploadStatus::Pending || entry.backing_off {
                continue;
            }
            entry.item.status = UploadStatus::Uploading;
            slots -= 1;

            let item_id = entry.item.id;
            let file = entry.item.file.clone();
            let cancel = entry.cancel.clone();
            let backend = self
                .backends
                .for_kind(MediaKind::from_content_type(&file.content_type))
                .clone();
            let update_tx = self.update_tx.clone();
            let transfer_timeout = Duration::from_secs(self.config.transfer_timeout_secs);

            let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_BUFFER);
            let progress_update_tx = self.update_tx.clone();
            tokio::spawn(async move {
                while let Some(percent) = progress_rx.recv().await {
                    let _ = progress_update_tx
                        .send(TransferUpdate::Progress { item_id, percent })
                        .await;
                }
            });

            tracing::debug!(%item_id, name = %file.name, "Upload started");
            tokio::spawn(async move {
                let request = PutRequest {
                    name: file.name,
                    content_type: file.content_type,
                    data: file.data,
                };
                let result =
                    match timeout(transfer_timeout, backend.put(request, progress_tx, cancel))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(StorageError::Timeout),
                    };
                let _ = update_tx
                    .send(TransferUpdate::Finished { item_id, result })
                    .await;
            });
        }
    }

    fn check_drained(&mut self) {
        if self.drained_notified || self.entries.is_empty() {
            return;
        }
        let busy = self.entries.iter().any(|e| {
            matches!(e.item.status, UploadStatus::Pending | UploadStatus::Uploading)
        });
        if !busy {
            self.drained_notified = true;
            tracing::info!(total = self.entries.len(), "Upload queue drained");
            self.emit(UploadEvent::Drained);
        }
    }

    /// Send an event to the listener. Delivery is guaranteed and in order
    /// while the receiver is alive; a dropped receiver only means nobody
    /// listens anymore.
    fn emit(&self, event: UploadEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                tracing::debug!("Upload event receiver dropped");
            }
        }
    }

    fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.entries.len(),
            ..Default::default()
        };
        for entry in &self.entries {
            match entry.item.status {
                UploadStatus::Pending => stats.pending += 1,
                UploadStatus::Uploading => stats.uploading += 1,
                UploadStatus::Completed => stats.completed += 1,
                UploadStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    fn entry_mut(&mut self, item_id: Uuid) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.item.id == item_id)
    }
}

/// Assemble the durable record from the backend descriptor plus the local
/// file metadata. Image variant URLs ride along in `extra`.
fn build_asset(file: &UploadFile, object: StoredObject) -> MediaAsset {
    let now = Utc::now();
    let mut extra = serde_json::Map::new();
    if !object.variants.is_empty() {
        if let Ok(variants) = serde_json::to_value(&object.variants) {
            extra.insert("variants".to_string(), variants);
        }
    }
    MediaAsset {
        id: object.id,
        url: object.url,
        kind: MediaKind::from_content_type(&file.content_type),
        name: file.name.clone(),
        size: file.data.len() as i64,
        content_type: file.content_type.clone(),
        backend_ref: object.backend_ref,
        created_at: now,
        updated_at: now,
        extra,
    }
}

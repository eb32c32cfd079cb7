//! Upload queue integration tests against a scripted in-memory backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use medley_core::MediaKind;
use medley_storage::{
    AssetBackend, AssetBackends, ProgressSender, PutRequest, StorageError, StorageResult,
    StoredObject,
};
use medley_uploader::{
    QueueStats, UploadEvent, UploadFile, UploadQueue, UploadQueueConfig, UploadStatus,
};

/// Backend that fails a file a scripted number of times, tracks the
/// concurrency high-water mark, and observes cancellation.
struct ScriptedBackend {
    kind: MediaKind,
    delay: Duration,
    /// name -> remaining failures before success (`u32::MAX` = always fail)
    fail_counts: Mutex<HashMap<String, u32>>,
    attempts: AtomicUsize,
    concurrent: AtomicUsize,
    max_concurrent_seen: AtomicUsize,
    saw_cancellation: AtomicBool,
}

impl ScriptedBackend {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            kind: MediaKind::Image,
            delay,
            fail_counts: Mutex::new(HashMap::new()),
            attempts: AtomicUsize::new(0),
            concurrent: AtomicUsize::new(0),
            max_concurrent_seen: AtomicUsize::new(0),
            saw_cancellation: AtomicBool::new(false),
        })
    }

    fn fail_times(&self, name: &str, times: u32) {
        self.fail_counts
            .lock()
            .unwrap()
            .insert(name.to_string(), times);
    }

    fn clear_failures(&self) {
        self.fail_counts.lock().unwrap().clear();
    }

    fn take_failure(&self, name: &str) -> bool {
        let mut counts = self.fail_counts.lock().unwrap();
        match counts.get_mut(name) {
            Some(0) | None => false,
            Some(n) if *n == u32::MAX => true,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }
}

#[async_trait]
impl AssetBackend for ScriptedBackend {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn put(
        &self,
        request: PutRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> StorageResult<StoredObject> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_seen.fetch_max(now, Ordering::SeqCst);

        let _ = progress.try_send(50);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                self.saw_cancellation.store(true, Ordering::SeqCst);
                Err(StorageError::Cancelled)
            }
            _ = sleep(self.delay) => {
                if self.take_failure(&request.name) {
                    Err(StorageError::UploadFailed("simulated transport error".into()))
                } else {
                    let _ = progress.try_send(100);
                    Ok(StoredObject {
                        id: format!("obj-{}", request.name),
                        url: format!("https://cdn.example/{}", request.name),
                        backend_ref: format!("ref-{}", request.name),
                        variants: Default::default(),
                    })
                }
            }
        };

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn delete(&self, _backend_ref: &str) -> StorageResult<()> {
        Ok(())
    }
}

fn file(name: &str) -> UploadFile {
    UploadFile {
        name: name.to_string(),
        content_type: "image/jpeg".to_string(),
        data: Bytes::from(vec![1u8; 128]),
    }
}

fn queue_with(
    backend: Arc<ScriptedBackend>,
    config: UploadQueueConfig,
) -> (UploadQueue, mpsc::UnboundedReceiver<UploadEvent>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let backends = AssetBackends::new(backend.clone(), backend);
    (UploadQueue::new(backends, config, Some(events_tx)), events_rx)
}

fn fast_config() -> UploadQueueConfig {
    UploadQueueConfig {
        max_concurrent: 3,
        max_retries: 2,
        retry_backoff_base_ms: 1,
        transfer_timeout_secs: 10,
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<UploadEvent>) -> UploadEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for upload event")
        .expect("event channel closed")
}

/// Collect events until the drain notification arrives.
async fn events_until_drained(rx: &mut mpsc::UnboundedReceiver<UploadEvent>) -> Vec<UploadEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let drained = matches!(event, UploadEvent::Drained);
        events.push(event);
        if drained {
            return events;
        }
    }
}

#[tokio::test]
async fn full_drain_yields_one_terminal_state_per_file() {
    let backend = ScriptedBackend::new(Duration::from_millis(5));
    let (queue, mut events) = queue_with(backend, fast_config());

    let names: Vec<_> = (0..5).map(|i| format!("f{i}.jpg")).collect();
    queue
        .enqueue(names.iter().map(|n| file(n)).collect())
        .await
        .unwrap();

    let seen = events_until_drained(&mut events).await;
    let completed = seen
        .iter()
        .filter(|e| matches!(e, UploadEvent::Completed { .. }))
        .count();
    assert_eq!(completed, 5);

    let stats = queue.stats().await.unwrap();
    assert_eq!(
        stats,
        QueueStats {
            pending: 0,
            uploading: 0,
            completed: 5,
            failed: 0,
            total: 5
        }
    );

    // the drain notification fires once, not once per item
    sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn late_reader_still_receives_every_event() {
    let backend = ScriptedBackend::new(Duration::from_millis(1));
    let (queue, mut events) = queue_with(backend, fast_config());

    queue
        .enqueue((0..5).map(|i| file(&format!("l{i}.jpg"))).collect())
        .await
        .unwrap();

    // Let the whole batch finish before touching the event channel, like a
    // consumer that is busy registering assets while transfers complete.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stats = queue.stats().await.unwrap();
        if stats.completed == 5 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "queue never drained");
        sleep(Duration::from_millis(5)).await;
    }

    let seen = events_until_drained(&mut events).await;
    let completed = seen
        .iter()
        .filter(|e| matches!(e, UploadEvent::Completed { .. }))
        .count();
    assert_eq!(completed, 5, "every completion event must be delivered");
    assert!(matches!(seen.last(), Some(UploadEvent::Drained)));
}

#[tokio::test]
async fn concurrency_never_exceeds_bound() {
    let backend = ScriptedBackend::new(Duration::from_millis(30));
    let (queue, mut events) = queue_with(backend.clone(), fast_config());

    queue
        .enqueue((0..8).map(|i| file(&format!("c{i}.jpg"))).collect())
        .await
        .unwrap();
    events_until_drained(&mut events).await;

    assert!(backend.max_concurrent_seen.load(Ordering::SeqCst) <= 3);
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn slots_fill_in_enqueue_order() {
    let backend = ScriptedBackend::new(Duration::from_millis(200));
    let (queue, _events) = queue_with(backend, fast_config());

    queue
        .enqueue((0..5).map(|i| file(&format!("s{i}.jpg"))).collect())
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.uploading, 3);
    assert_eq!(stats.pending, 2);

    let items = queue.snapshot().await.unwrap();
    assert_eq!(items[0].status, UploadStatus::Uploading);
    assert_eq!(items[4].status, UploadStatus::Pending);
}

#[tokio::test]
async fn always_failing_item_exhausts_retries_with_one_error_event() {
    let backend = ScriptedBackend::new(Duration::from_millis(5));
    backend.fail_times("bad.jpg", u32::MAX);
    let (queue, mut events) = queue_with(backend.clone(), fast_config());

    queue.enqueue(vec![file("bad.jpg")]).await.unwrap();
    let seen = events_until_drained(&mut events).await;

    let failures: Vec<_> = seen
        .iter()
        .filter(|e| matches!(e, UploadEvent::Failed { .. }))
        .collect();
    assert_eq!(failures.len(), 1, "one error event per permanent failure");

    // max_retries = 2 means the initial attempt plus two retries
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 3);

    let items = queue.snapshot().await.unwrap();
    assert_eq!(items[0].status, UploadStatus::Failed);
    assert_eq!(items[0].retry_count, 2);
    assert!(items[0].error.as_deref().unwrap().contains("simulated"));
}

#[tokio::test]
async fn transient_failure_retries_then_succeeds() {
    let backend = ScriptedBackend::new(Duration::from_millis(5));
    backend.fail_times("flaky.jpg", 2);
    let (queue, mut events) = queue_with(backend.clone(), fast_config());

    queue.enqueue(vec![file("flaky.jpg")]).await.unwrap();
    let seen = events_until_drained(&mut events).await;

    assert!(seen
        .iter()
        .any(|e| matches!(e, UploadEvent::Completed { .. })));
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 3);

    let items = queue.snapshot().await.unwrap();
    assert_eq!(items[0].status, UploadStatus::Completed);
    assert_eq!(items[0].retry_count, 2);
    let asset = items[0].result.as_ref().unwrap();
    assert_eq!(asset.name, "flaky.jpg");
    assert_eq!(asset.kind, MediaKind::Image);
}

#[tokio::test]
async fn retry_failed_resets_and_drains_again() {
    let backend = ScriptedBackend::new(Duration::from_millis(5));
    backend.fail_times("bad.jpg", u32::MAX);
    let (queue, mut events) = queue_with(backend.clone(), fast_config());

    queue
        .enqueue(vec![file("bad.jpg"), file("good.jpg")])
        .await
        .unwrap();
    events_until_drained(&mut events).await;

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);

    // backend recovers; the failed subset is retried without re-uploading
    // completed items
    backend.clear_failures();
    let attempts_before = backend.attempts.load(Ordering::SeqCst);
    queue.retry_failed().await.unwrap();
    let seen = events_until_drained(&mut events).await;

    assert!(seen
        .iter()
        .any(|e| matches!(e, UploadEvent::Completed { .. })));
    assert_eq!(backend.attempts.load(Ordering::SeqCst), attempts_before + 1);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 0);
    let items = queue.snapshot().await.unwrap();
    assert!(items.iter().all(|i| i.retry_count == 0 || i.is_terminal()));
}

#[tokio::test]
async fn cancel_aborts_in_flight_transfer_and_removes_item() {
    let backend = ScriptedBackend::new(Duration::from_millis(500));
    let (queue, mut events) = queue_with(backend.clone(), fast_config());

    let ids = queue.enqueue(vec![file("slow.jpg")]).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(queue.stats().await.unwrap().uploading, 1);

    queue.cancel(ids[0]).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(queue.stats().await.unwrap().total, 0);
    assert!(backend.saw_cancellation.load(Ordering::SeqCst));
    // cancellation is not a failure and produces no retry or error event
    assert!(events.try_recv().is_err());

    // cancelling an already-removed id is a no-op
    queue.cancel(ids[0]).await.unwrap();
}

#[tokio::test]
async fn cancel_all_aborts_everything_and_empties_queue() {
    let backend = ScriptedBackend::new(Duration::from_millis(500));
    let (queue, _events) = queue_with(backend.clone(), fast_config());

    queue
        .enqueue((0..4).map(|i| file(&format!("x{i}.jpg"))).collect())
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    queue.cancel_all().await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(queue.stats().await.unwrap().total, 0);
    assert!(backend.saw_cancellation.load(Ordering::SeqCst));
}

#[tokio::test]
async fn clear_completed_drops_only_completed_items() {
    let backend = ScriptedBackend::new(Duration::from_millis(5));
    backend.fail_times("bad.jpg", u32::MAX);
    let (queue, mut events) = queue_with(backend, fast_config());

    queue
        .enqueue(vec![file("good.jpg"), file("bad.jpg")])
        .await
        .unwrap();
    events_until_drained(&mut events).await;

    queue.clear_completed().await.unwrap();
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.failed, 1);
}

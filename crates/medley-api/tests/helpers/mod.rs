//! Test wiring: in-memory index, mock backends, and a TestServer.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use medley_api::state::AppState;
use medley_core::{MediaAsset, MediaKind};
use medley_index::{AssetRepository, MemoryKv};
use medley_storage::{
    AssetBackend, AssetBackends, ProgressSender, PutRequest, StorageError, StorageResult,
    StoredObject,
};

/// Backend that records deletes and fails the refs it is told to fail.
pub struct RecordingBackend {
    kind: MediaKind,
    fail_refs: Mutex<HashSet<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl RecordingBackend {
    pub fn new(kind: MediaKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail_refs: Mutex::new(HashSet::new()),
            deleted: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_delete(&self, backend_ref: &str) {
        self.fail_refs.lock().unwrap().insert(backend_ref.to_string());
    }

    pub fn deleted_refs(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetBackend for RecordingBackend {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn put(
        &self,
        request: PutRequest,
        progress: ProgressSender,
        _cancel: CancellationToken,
    ) -> StorageResult<StoredObject> {
        let _ = progress.try_send(100);
        Ok(StoredObject {
            id: format!("obj-{}", request.name),
            url: format!("https://cdn.example/{}", request.name),
            backend_ref: format!("ref-{}", request.name),
            variants: Default::default(),
        })
    }

    async fn delete(&self, backend_ref: &str) -> StorageResult<()> {
        if self.fail_refs.lock().unwrap().contains(backend_ref) {
            return Err(StorageError::BackendError(
                "store rejected delete".to_string(),
            ));
        }
        self.deleted.lock().unwrap().push(backend_ref.to_string());
        Ok(())
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub repository: AssetRepository,
    pub image_backend: Arc<RecordingBackend>,
    pub video_backend: Arc<RecordingBackend>,
}

pub fn setup_test_app() -> TestApp {
    let repository = AssetRepository::new(Arc::new(MemoryKv::new()));
    let image_backend = RecordingBackend::new(MediaKind::Image);
    let video_backend = RecordingBackend::new(MediaKind::Video);

    let state = Arc::new(AppState {
        repository: repository.clone(),
        backends: AssetBackends::new(image_backend.clone(), video_backend.clone()),
        max_bulk_batch_size: 50,
    });

    let server = TestServer::new(medley_api::build_router(state)).expect("test server");
    TestApp {
        server,
        repository,
        image_backend,
        video_backend,
    }
}

/// A seeded image asset with a deterministic backend ref (`ref-{id}`).
pub fn asset(id: &str, kind: MediaKind) -> MediaAsset {
    let now = Utc::now();
    MediaAsset {
        id: id.to_string(),
        url: format!("https://cdn.example/{id}"),
        kind,
        name: format!("{id}.bin"),
        size: 42,
        content_type: match kind {
            MediaKind::Image => "image/jpeg".to_string(),
            MediaKind::Video => "video/mp4".to_string(),
        },
        backend_ref: format!("ref-{id}"),
        created_at: now,
        updated_at: now,
        extra: Default::default(),
    }
}

pub async fn seed(app: &TestApp, ids: &[&str]) {
    for id in ids {
        app.repository
            .register(&asset(id, MediaKind::Image))
            .await
            .expect("seed asset");
    }
}

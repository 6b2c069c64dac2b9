//! Scripted model and in-memory wiring for worker tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::ModelConfig;
use common::blobs::{BlobManager, MemoryBlobRefStore};
use common::generation::{Generation, GenerationPatch};
use common::model::{ImageDescriptor, ModelRequest, ModelResponse};
use common::storage::FilesystemBlobStore;
use common::store::{JobStore, MemoryJobStore};
use uuid::Uuid;

use crate::generation::GenerationWorker;
use crate::model_client::{ModelClient, ModelClientError};

const FINAL_URL: &str = "http://model.test/final.png";

/// Something another actor does to the job while a generate call is in flight.
enum Interference {
    Delete,
    Fail(&'static str),
}

pub struct FakeModel {
    image: Vec<u8>,
    fail_status: u16,
    /// Calls that fail before the model starts succeeding.
    failures_left: AtomicUsize,
    always_fail: bool,
    previews_only: bool,
    requests: Mutex<Vec<ModelRequest>>,
    interference: Mutex<Option<(Arc<dyn JobStore>, Uuid, Interference)>>,
}

impl FakeModel {
    fn build(image: &[u8], fail_status: u16, failures: usize, always_fail: bool) -> Self {
        Self {
            image: image.to_vec(),
            fail_status,
            failures_left: AtomicUsize::new(failures),
            always_fail,
            previews_only: false,
            requests: Mutex::new(Vec::new()),
            interference: Mutex::new(None),
        }
    }

    pub fn succeeding(image: &[u8]) -> Self {
        Self::build(image, 0, 0, false)
    }

    pub fn failing(status: u16) -> Self {
        Self::build(b"", status, 0, true)
    }

    /// Fails `failures` times with `status`, then returns `image`.
    pub fn flaky(status: u16, failures: usize, image: &[u8]) -> Self {
        Self::build(image, status, failures, false)
    }

    pub fn previews_only() -> Self {
        Self {
            previews_only: true,
            ..Self::build(b"", 0, 0, false)
        }
    }

    /// Delete `id` from `jobs` while the next generate call is in flight.
    pub fn delete_on_generate(&self, jobs: Arc<dyn JobStore>, id: Uuid) {
        *self.interference.lock().unwrap() = Some((jobs, id, Interference::Delete));
    }

    /// Fail `id` with `code` while the next generate call is in flight.
    pub fn fail_on_generate(&self, jobs: Arc<dyn JobStore>, id: Uuid, code: &'static str) {
        *self.interference.lock().unwrap() = Some((jobs, id, Interference::Fail(code)));
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn should_fail(&self) -> bool {
        self.always_fail
            || self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl ModelClient for FakeModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ModelClientError> {
        self.requests.lock().unwrap().push(request.clone());

        let interference = self.interference.lock().unwrap().take();
        match interference {
            Some((jobs, id, Interference::Delete)) => {
                jobs.delete(id).await.unwrap();
            }
            Some((jobs, id, Interference::Fail(code))) => {
                jobs.patch(id, GenerationPatch::fail(code)).await.unwrap();
            }
            None => {}
        }

        if self.should_fail() {
            return Err(ModelClientError::ApiError {
                status: self.fail_status,
                body: "scripted failure".into(),
            });
        }

        let preview = ImageDescriptor {
            url: "http://model.test/preview-0.png".into(),
            content_type: Some("image/png".into()),
        };
        Ok(ModelResponse {
            final_image: (!self.previews_only).then(|| ImageDescriptor {
                url: FINAL_URL.into(),
                content_type: Some("image/png".into()),
            }),
            previews: vec![preview],
        })
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, Option<String>), ModelClientError> {
        assert_eq!(url, FINAL_URL);
        Ok((self.image.clone(), Some("image/png".into())))
    }
}

pub struct Fixture {
    pub jobs: Arc<MemoryJobStore>,
    pub blobs: Arc<BlobManager>,
    pub store: Arc<FilesystemBlobStore>,
    pub model: Arc<FakeModel>,
    _dir: tempfile::TempDir,
}

impl Fixture {
    pub async fn new(model: FakeModel) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            FilesystemBlobStore::new(dir.path().join("blobs"), 1024 * 1024)
                .await
                .unwrap(),
        );
        let blobs = Arc::new(BlobManager::new(
            store.clone(),
            Arc::new(MemoryBlobRefStore::new()),
            "http://img.test",
        ));
        Self {
            jobs: Arc::new(MemoryJobStore::new()),
            blobs,
            store,
            model: Arc::new(model),
            _dir: dir,
        }
    }

    pub fn worker(&self) -> GenerationWorker {
        GenerationWorker::new(
            self.jobs.clone(),
            self.blobs.clone(),
            self.model.clone(),
            ModelConfig::default(),
        )
    }

    /// A `Processing` job for "alice" with an uploaded, attached sketch.
    pub async fn processing_job(&self, prompt: &str) -> Generation {
        let handle = self.blobs.issue_upload_handle("alice").await.unwrap();
        self.blobs
            .complete_upload(
                "alice",
                handle.blob_ref,
                Some("image/png".into()),
                b"sketch-bytes",
            )
            .await
            .unwrap();
        let job = Generation::new("alice", prompt, handle.blob_ref);
        self.jobs.insert(job.clone()).await.unwrap();
        self.blobs
            .attach(handle.blob_ref, "alice", job.id)
            .await
            .unwrap();
        job
    }
}

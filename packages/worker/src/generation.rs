use std::sync::Arc;

use common::ModelConfig;
use common::blobs::{BlobManager, BlobRef};
use common::generation::GenerationPatch;
use common::model::ModelRequest;
use common::store::{JobStore, StoreError};
use common::GenerationStatus;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::GenerationError;
use crate::model_client::ModelClient;

/// Sketch content type assumed when the upload did not declare one.
const DEFAULT_SKETCH_MIME: &str = "image/png";

/// How a single attempt ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(BlobRef),
    /// The job was already terminal; nothing was done.
    Skipped(GenerationStatus),
    /// The job was deleted or finalised elsewhere while the model ran.
    /// The stored result has been removed again.
    Discarded,
}

/// Turns one `Processing` job into a `Completed` one.
pub struct GenerationWorker {
    jobs: Arc<dyn JobStore>,
    blobs: Arc<BlobManager>,
    model: Arc<dyn ModelClient>,
    config: ModelConfig,
}

impl GenerationWorker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        blobs: Arc<BlobManager>,
        model: Arc<dyn ModelClient>,
        config: ModelConfig,
    ) -> Self {
        Self {
            jobs,
            blobs,
            model,
            config,
        }
    }

    /// One attempt. Failure leaves the job untouched; finalising it as
    /// `Failed` is the caller's decision.
    pub async fn run(&self, id: Uuid, prompt: &str) -> Result<RunOutcome, GenerationError> {
        let job = self
            .jobs
            .get(id)
            .await?
            .ok_or(GenerationError::NotFound(id))?;
        if job.status.is_terminal() {
            debug!(generation_id = %id, status = %job.status, "Job already finished, skipping");
            return Ok(RunOutcome::Skipped(job.status));
        }

        let canvas = job.canvas_image_ref;
        if self.blobs.resolve(canvas).await?.is_none() {
            return Err(GenerationError::CanvasUnresolved(canvas));
        }
        let (sketch, sketch_mime) = self.blobs.read(canvas).await?;

        let request = ModelRequest::new(
            &self.config,
            &sketch,
            sketch_mime.as_deref().unwrap_or(DEFAULT_SKETCH_MIME),
            prompt,
        );
        let response = self.model.generate(&request).await?;
        let final_image = response.final_image()?;

        let (bytes, content_type) = self.model.download(&final_image.url).await?;
        let content_type = content_type.or_else(|| final_image.content_type.clone());
        let result = self.blobs.store(&job.owner_id, &bytes, content_type).await?;

        if let Err(e) = self.blobs.attach(result, &job.owner_id, id).await {
            self.discard(id, result).await;
            return Err(e.into());
        }

        match self.jobs.patch(id, GenerationPatch::complete(result)).await {
            Ok(Some(_)) => {
                info!(generation_id = %id, result = %result, "Generation completed");
                Ok(RunOutcome::Completed(result))
            }
            Ok(None) => {
                info!(generation_id = %id, "Job deleted while generating, discarding result");
                self.discard(id, result).await;
                Ok(RunOutcome::Discarded)
            }
            Err(StoreError::InvalidPatch(e)) => {
                info!(generation_id = %id, reason = %e, "Job finalised elsewhere, discarding result");
                self.discard(id, result).await;
                Ok(RunOutcome::Discarded)
            }
            Err(e) => {
                self.discard(id, result).await;
                Err(e.into())
            }
        }
    }

    async fn discard(&self, id: Uuid, result: BlobRef) {
        if let Err(e) = self.blobs.delete(result).await {
            warn!(generation_id = %id, result = %result, error = %e, "Failed to remove result blob");
        }
    }
}

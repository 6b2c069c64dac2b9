use std::sync::Arc;

use common::blobs::{BlobManager, BlobRef};
use common::generation::{Generation, GenerationPatch, validate_prompt};
use common::store::{FeedCursor, JobStore};
use common::{FeedPage, GenerationErrorCode, GenerationTask, GenerationView};
use futures::future::try_join_all;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::GenerationConfig;
use crate::error::AppError;
use crate::scheduler::Scheduler;

/// Mutations and queries on generation jobs, always scoped to a caller.
pub struct GenerationService {
    jobs: Arc<dyn JobStore>,
    blobs: Arc<BlobManager>,
    scheduler: Arc<dyn Scheduler>,
    config: GenerationConfig,
}

impl GenerationService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        blobs: Arc<BlobManager>,
        scheduler: Arc<dyn Scheduler>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            jobs,
            blobs,
            scheduler,
            config,
        }
    }

    /// Insert a `Processing` job for `owner_id` and schedule its worker.
    pub async fn create(
        &self,
        owner_id: &str,
        prompt: &str,
        canvas: BlobRef,
    ) -> Result<Uuid, AppError> {
        let prompt = validate_prompt(prompt, self.config.max_prompt_chars)?;

        let record = self
            .blobs
            .record(canvas)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Blob {canvas} not found")))?;
        if record.owner_id != owner_id {
            return Err(AppError::PermissionDenied);
        }
        if record.content_hash.is_none() {
            return Err(AppError::Validation(format!(
                "Blob {canvas} has not been uploaded yet"
            )));
        }
        if record.generation_id.is_some() {
            return Err(AppError::Conflict(format!(
                "Blob {canvas} is already used by a generation"
            )));
        }

        let id = self
            .jobs
            .insert(Generation::new(owner_id, prompt.clone(), canvas))
            .await?;

        // A concurrent create may have claimed the canvas since the check above.
        if let Err(e) = self.blobs.attach(canvas, owner_id, id).await {
            if let Err(rollback) = self.jobs.delete(id).await {
                error!(generation_id = %id, error = %rollback, "Failed to roll back generation");
            }
            return Err(e.into());
        }

        if let Err(e) = self.scheduler.enqueue(GenerationTask::new(id, prompt)).await {
            error!(generation_id = %id, error = %e, "Failed to schedule generation");
            if let Err(patch_err) = self
                .jobs
                .patch(id, GenerationPatch::fail(GenerationErrorCode::SCHEDULE_FAILED))
                .await
            {
                error!(generation_id = %id, error = %patch_err, "Failed to mark unscheduled generation");
            }
        }

        info!(generation_id = %id, owner_id, canvas = %canvas, "Generation created");
        Ok(id)
    }

    pub async fn get(&self, owner_id: &str, id: Uuid) -> Result<GenerationView, AppError> {
        let job = self.owned(owner_id, id).await?;
        self.view(job).await
    }

    /// Delete the record, then both of its blobs.
    ///
    /// The blobs are taken from the removed record itself, so a result the
    /// worker attached just before the delete is collected as well.
    pub async fn delete(&self, owner_id: &str, id: Uuid) -> Result<(), AppError> {
        self.owned(owner_id, id).await?;

        let removed = self
            .jobs
            .delete(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Generation {id} not found")))?;

        let blobs = std::iter::once(removed.canvas_image_ref).chain(removed.result_image_ref);
        for blob in blobs {
            if let Err(e) = self.blobs.delete(blob).await {
                warn!(generation_id = %id, blob = %blob, error = %e, "Failed to delete blob of removed generation");
            }
        }

        info!(generation_id = %id, owner_id, "Generation deleted");
        Ok(())
    }

    pub async fn toggle_save(&self, owner_id: &str, id: Uuid) -> Result<GenerationView, AppError> {
        self.owned(owner_id, id).await?;

        let updated = self
            .jobs
            .patch(id, GenerationPatch::toggle_saved())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Generation {id} not found")))?;
        self.view(updated).await
    }

    /// Whole feed, newest first.
    pub async fn list(&self, owner_id: &str) -> Result<Vec<GenerationView>, AppError> {
        let jobs = self.jobs.by_owner(owner_id).await?;
        self.views(jobs).await
    }

    pub async fn list_saved(&self, owner_id: &str) -> Result<Vec<GenerationView>, AppError> {
        let jobs = self.jobs.by_owner_saved(owner_id).await?;
        self.views(jobs).await
    }

    pub async fn page(
        &self,
        owner_id: &str,
        cursor: Option<&str>,
        page_size: Option<u64>,
    ) -> Result<FeedPage, AppError> {
        let size = page_size
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);
        let after = cursor.map(str::parse::<FeedCursor>).transpose()?;

        let mut jobs = self.jobs.page_by_owner(owner_id, after, size + 1).await?;
        let has_more = jobs.len() as u64 > size;
        jobs.truncate(size as usize);

        let next_cursor = jobs
            .last()
            .filter(|_| has_more)
            .map(|last| FeedCursor::after(last).to_string());
        Ok(FeedPage {
            items: self.views(jobs).await?,
            next_cursor,
        })
    }

    /// Load a job and check the caller owns it.
    async fn owned(&self, owner_id: &str, id: Uuid) -> Result<Generation, AppError> {
        let job = self
            .jobs
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Generation {id} not found")))?;
        if job.owner_id != owner_id {
            return Err(AppError::PermissionDenied);
        }
        Ok(job)
    }

    async fn view(&self, job: Generation) -> Result<GenerationView, AppError> {
        let canvas_url = self.blobs.resolve(job.canvas_image_ref).await?;
        let result_url = match job.result_image_ref {
            Some(result) => self.blobs.resolve(result).await?,
            None => None,
        };
        Ok(GenerationView::new(job, canvas_url, result_url))
    }

    async fn views(&self, jobs: Vec<Generation>) -> Result<Vec<GenerationView>, AppError> {
        try_join_all(jobs.into_iter().map(|job| self.view(job))).await
    }
}

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blobs::BlobRef;
use crate::generation_status::{GenerationStatus, TransitionError};

/// Current time truncated to the microsecond precision the stores persist.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// One sketch + prompt generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub id: Uuid,
    /// Identity of the creator. Set once from the verified caller.
    pub owner_id: String,
    pub prompt: String,
    pub canvas_image_ref: BlobRef,
    /// Present iff `status == Completed`.
    pub result_image_ref: Option<BlobRef>,
    pub status: GenerationStatus,
    pub is_saved: bool,
    /// Machine-readable failure reason, only set on `Failed` jobs.
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Change to the saved flag carried by a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedChange {
    Set(bool),
    /// Flip whatever value is stored at write time.
    Toggle,
}

/// Partial update applied atomically to one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationPatch {
    pub status: Option<GenerationStatus>,
    pub result_image_ref: Option<BlobRef>,
    pub error_code: Option<String>,
    pub saved: Option<SavedChange>,
}

impl GenerationPatch {
    /// Worker success: store the result and finish the job.
    pub fn complete(result: BlobRef) -> Self {
        Self {
            status: Some(GenerationStatus::Completed),
            result_image_ref: Some(result),
            ..Default::default()
        }
    }

    /// Worker failure with a reason code.
    pub fn fail(error_code: impl Into<String>) -> Self {
        Self {
            status: Some(GenerationStatus::Failed),
            error_code: Some(error_code.into()),
            ..Default::default()
        }
    }

    pub fn toggle_saved() -> Self {
        Self {
            saved: Some(SavedChange::Toggle),
            ..Default::default()
        }
    }

    pub fn set_saved(saved: bool) -> Self {
        Self {
            saved: Some(SavedChange::Set(saved)),
            ..Default::default()
        }
    }
}

/// A write that would break a job invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("result image must be present exactly when the job is Completed (status {0})")]
    ResultMismatch(GenerationStatus),
    #[error("error code can only be recorded on a Failed job (status {0})")]
    ErrorCodeMismatch(GenerationStatus),
    #[error("result image is already set")]
    ResultAlreadySet,
    #[error("job is already {0}; only the saved flag can change")]
    Finalized(GenerationStatus),
    #[error("new jobs must start in Processing without a result")]
    InvalidInitialState,
}

impl Generation {
    /// A fresh job in `Processing`.
    pub fn new(owner_id: impl Into<String>, prompt: impl Into<String>, canvas: BlobRef) -> Self {
        let now = now_micros();
        Self {
            id: Uuid::now_v7(),
            owner_id: owner_id.into(),
            prompt: prompt.into(),
            canvas_image_ref: canvas,
            result_image_ref: None,
            status: GenerationStatus::Processing,
            is_saved: false,
            error_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks applied by stores before an insert.
    pub fn validate_new(&self) -> Result<(), PatchError> {
        if self.status != GenerationStatus::Processing
            || self.result_image_ref.is_some()
            || self.error_code.is_some()
            || self.updated_at < self.created_at
        {
            return Err(PatchError::InvalidInitialState);
        }
        Ok(())
    }

    /// Merge `patch` into a copy of this job, enforcing the status machine
    /// and the result/status invariant. `updated_at` strictly increases.
    ///
    /// Once a job is terminal only the saved flag may change.
    pub fn apply(&self, patch: &GenerationPatch, now: DateTime<Utc>) -> Result<Self, PatchError> {
        if self.status.is_terminal()
            && (patch.status.is_some()
                || patch.result_image_ref.is_some()
                || patch.error_code.is_some())
        {
            return Err(PatchError::Finalized(self.status));
        }

        let status = match patch.status {
            Some(next) => self.status.transition_to(next)?,
            None => self.status,
        };

        let result_image_ref = match (self.result_image_ref, patch.result_image_ref) {
            (Some(current), Some(new)) if current != new => return Err(PatchError::ResultAlreadySet),
            (current, new) => new.or(current),
        };
        if result_image_ref.is_some() != (status == GenerationStatus::Completed) {
            return Err(PatchError::ResultMismatch(status));
        }

        if patch.error_code.is_some() && status != GenerationStatus::Failed {
            return Err(PatchError::ErrorCodeMismatch(status));
        }
        let error_code = patch.error_code.clone().or_else(|| self.error_code.clone());

        let is_saved = match patch.saved {
            Some(SavedChange::Set(v)) => v,
            Some(SavedChange::Toggle) => !self.is_saved,
            None => self.is_saved,
        };

        let floor = self.updated_at + TimeDelta::microseconds(1);
        Ok(Self {
            status,
            result_image_ref,
            error_code,
            is_saved,
            updated_at: now.max(floor),
            ..self.clone()
        })
    }
}

/// Rejected prompt text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("Prompt must not be empty")]
    Empty,
    #[error("Prompt must be at most {max} characters")]
    TooLong { max: usize },
}

/// Trim and bound a prompt.
pub fn validate_prompt(prompt: &str, max_chars: usize) -> Result<String, PromptError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(PromptError::Empty);
    }
    if trimmed.chars().count() > max_chars {
        return Err(PromptError::TooLong { max: max_chars });
    }
    Ok(trimmed.to_string())
}

/// Read model of a job with blob handles resolved to URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GenerationView {
    pub id: Uuid,
    pub owner_id: String,
    #[schema(example = "a red circle")]
    pub prompt: String,
    pub status: GenerationStatus,
    pub is_saved: bool,
    /// `null` when the canvas blob can no longer be resolved.
    pub canvas_image_url: Option<String>,
    /// `null` until the job is Completed.
    pub result_image_url: Option<String>,
    #[schema(example = "UPSTREAM_REJECTED")]
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationView {
    pub fn new(
        generation: Generation,
        canvas_image_url: Option<String>,
        result_image_url: Option<String>,
    ) -> Self {
        Self {
            id: generation.id,
            owner_id: generation.owner_id,
            prompt: generation.prompt,
            status: generation.status,
            is_saved: generation.is_saved,
            canvas_image_url,
            result_image_url,
            error_code: generation.error_code,
            created_at: generation.created_at,
            updated_at: generation.updated_at,
        }
    }
}

/// One page of the owner's feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct FeedPage {
    pub items: Vec<GenerationView>,
    /// Pass back as `cursor` to fetch the next page; `null` on the last page.
    pub next_cursor: Option<String>,
}

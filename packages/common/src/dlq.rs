use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retry::RetryAttempt;

/// Reason codes recorded on `Failed` generations.
pub struct GenerationErrorCode;

impl GenerationErrorCode {
    /// The model refused the input or answered with an unusable response.
    pub const UPSTREAM_REJECTED: &'static str = "UPSTREAM_REJECTED";
    /// The canvas could not be resolved/read, or the result could not be stored.
    pub const STORAGE_ERROR: &'static str = "STORAGE_ERROR";
    /// Any other non-retryable worker error.
    pub const GENERATION_FAILED: &'static str = "GENERATION_FAILED";
    /// Transient failures persisted past the retry budget; a DLQ entry exists.
    pub const MAX_RETRIES_EXCEEDED: &'static str = "MAX_RETRIES_EXCEEDED";
    /// Job sat in Processing past the stuck-job timeout.
    pub const STUCK_JOB: &'static str = "STUCK_JOB";
    /// The scheduler refused the job at creation time.
    pub const SCHEDULE_FAILED: &'static str = "SCHEDULE_FAILED";
}

/// Error codes for dead-lettered messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqErrorCode {
    /// All retry attempts exhausted.
    MaxRetriesExceeded,
    /// Job stuck in Processing for too long.
    StuckJob,
}

impl DlqErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::StuckJob => "STUCK_JOB",
        }
    }
}

impl std::fmt::Display for DlqErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generation task that will not be retried any further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEnvelope {
    /// Task id of the failed message.
    pub message_id: String,
    pub generation_id: Option<Uuid>,
    /// Full serialized task.
    pub payload: serde_json::Value,
    pub error_code: DlqErrorCode,
    pub error_message: String,
    /// Oldest first.
    pub retry_history: Vec<RetryAttempt>,
}

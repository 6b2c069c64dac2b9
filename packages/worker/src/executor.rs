use std::sync::Arc;

use common::generation::GenerationPatch;
use common::retry::{RetryDecision, RetryPolicy, RetryTracker};
use common::store::{JobStore, StoreError};
use common::{DlqEnvelope, DlqErrorCode, GenerationErrorCode, GenerationTask};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dead_letter::DeadLetterSink;
use crate::error::GenerationError;
use crate::generation::{GenerationWorker, RunOutcome};

/// Runs a task to a terminal state: retries transient failures, fails the job
/// on permanent ones and dead-letters it when the retry budget runs out.
pub struct GenerationExecutor {
    worker: GenerationWorker,
    jobs: Arc<dyn JobStore>,
    policy: RetryPolicy,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl GenerationExecutor {
    pub fn new(
        worker: GenerationWorker,
        jobs: Arc<dyn JobStore>,
        policy: RetryPolicy,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            worker,
            jobs,
            policy,
            dead_letters,
        }
    }

    /// Every error returned here has already been recorded on the job.
    pub async fn execute(&self, task: &GenerationTask) -> Result<RunOutcome, GenerationError> {
        let id = task.generation_id;
        let mut tracker = RetryTracker::new(self.policy.max_retries);

        loop {
            let err = match self.worker.run(id, &task.prompt).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => e,
            };

            if !err.is_retryable() {
                self.fail(id, err.error_code()).await;
                return Err(err);
            }

            match tracker.record_failure(&err.to_string()) {
                RetryDecision::Retry { attempt, .. } => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        generation_id = %id,
                        task_id = %task.task_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying generation"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Exhausted { history } => {
                    if !self.fail(id, GenerationErrorCode::MAX_RETRIES_EXCEEDED).await {
                        return Err(err);
                    }

                    let envelope = DlqEnvelope {
                        message_id: task.task_id.clone(),
                        generation_id: Some(id),
                        payload: serde_json::to_value(task).unwrap_or_default(),
                        error_code: DlqErrorCode::MaxRetriesExceeded,
                        error_message: err.to_string(),
                        retry_history: history,
                    };
                    if let Err(dlq_err) = self.dead_letters.send(envelope).await {
                        error!(generation_id = %id, error = %dlq_err, "Failed to dead-letter task");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Execute and log the result; for contexts with nobody to return it to.
    pub async fn run_task(&self, task: GenerationTask) {
        let id = task.generation_id;
        match self.execute(&task).await {
            Ok(RunOutcome::Completed(result)) => {
                debug!(generation_id = %id, result = %result, "Task finished")
            }
            Ok(outcome) => info!(generation_id = %id, ?outcome, "Task finished without result"),
            Err(e) => error!(
                generation_id = %id,
                task_id = %task.task_id,
                error_code = e.error_code(),
                error = %e,
                "Generation failed"
            ),
        }
    }

    /// Returns `false` when the job was deleted or already finalised
    /// elsewhere, e.g. by the stuck job detector.
    async fn fail(&self, id: Uuid, code: &str) -> bool {
        match self.jobs.patch(id, GenerationPatch::fail(code)).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!(generation_id = %id, "Job gone before it could be failed");
                false
            }
            Err(StoreError::InvalidPatch(e)) => {
                info!(generation_id = %id, reason = %e, "Job finalised elsewhere, not failing it again");
                false
            }
            Err(e) => {
                warn!(generation_id = %id, error = %e, "Could not mark job failed");
                false
            }
        }
    }
}

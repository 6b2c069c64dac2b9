use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::config::timeout_delta;
use common::generation::GenerationPatch;
use common::store::{JobStore, StoreError};
use common::{DlqConfig, DlqEnvelope, DlqErrorCode, GenerationErrorCode};
use tracing::{error, info, warn};
use worker::DeadLetterSink;

/// Run the stuck job detector as a background task.
pub async fn run_stuck_job_detector(
    jobs: Arc<dyn JobStore>,
    dead_letters: Arc<dyn DeadLetterSink>,
    config: DlqConfig,
) {
    let scan_interval = Duration::from_secs(config.stuck_job_scan_interval_secs);

    info!(
        timeout_secs = config.stuck_job_timeout_secs,
        scan_interval_secs = config.stuck_job_scan_interval_secs,
        "Starting stuck job detector"
    );

    let mut interval = tokio::time::interval(scan_interval);

    loop {
        interval.tick().await;

        if let Err(e) =
            detect_stuck_jobs(jobs.as_ref(), dead_letters.as_ref(), config.stuck_job_timeout_secs)
                .await
        {
            error!(error = %e, "Stuck job detection failed");
        }
    }
}

/// Fail and dead-letter every job that has been `Processing` for longer than
/// `timeout_secs`. Returns how many jobs were failed.
pub async fn detect_stuck_jobs(
    jobs: &dyn JobStore,
    dead_letters: &dyn DeadLetterSink,
    timeout_secs: u64,
) -> Result<usize, StoreError> {
    let Some(threshold) =
        timeout_delta(timeout_secs).and_then(|timeout| Utc::now().checked_sub_signed(timeout))
    else {
        warn!(timeout_secs, "Stuck job timeout out of range, nothing can be stuck");
        return Ok(0);
    };
    let stuck = jobs.stale_processing(threshold).await?;
    if stuck.is_empty() {
        return Ok(0);
    }

    info!(count = stuck.len(), "Found stuck generations, moving to DLQ");

    let mut failed = 0;
    for job in stuck {
        let id = job.id;
        // The patch only succeeds while the job is still Processing, so a
        // worker finishing concurrently wins and nothing is dead-lettered.
        match jobs
            .patch(id, GenerationPatch::fail(GenerationErrorCode::STUCK_JOB))
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) | Err(StoreError::InvalidPatch(_)) => continue,
            Err(e) => {
                error!(generation_id = %id, error = %e, "Failed to fail stuck generation");
                continue;
            }
        }
        failed += 1;

        let envelope = DlqEnvelope {
            message_id: format!("stuck-generation-{id}"),
            generation_id: Some(id),
            payload: serde_json::json!({
                "generation_id": id,
                "owner_id": job.owner_id,
                "prompt": job.prompt,
                "created_at": job.created_at,
            }),
            error_code: DlqErrorCode::StuckJob,
            error_message: format!("Generation stuck in Processing for over {timeout_secs} seconds"),
            retry_history: vec![],
        };
        if let Err(e) = dead_letters.send(envelope).await {
            warn!(generation_id = %id, error = %e, "Stuck generation failed but not dead-lettered");
        } else {
            info!(generation_id = %id, "Moved stuck generation to DLQ");
        }
    }

    Ok(failed)
}

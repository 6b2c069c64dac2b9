use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::StorageConfig;
use common::blobs::{BlobError, BlobManager};
use common::config::timeout_delta;
use tracing::{error, info, warn};

/// Periodically delete upload handles that were never attached to a
/// generation.
pub async fn run_unattached_blob_sweeper(blobs: Arc<BlobManager>, config: StorageConfig) {
    let sweep_interval = Duration::from_secs(config.unattached_sweep_interval_secs);

    info!(
        ttl_secs = config.unattached_ttl_secs,
        sweep_interval_secs = config.unattached_sweep_interval_secs,
        "Starting unattached blob sweeper"
    );

    let mut interval = tokio::time::interval(sweep_interval);

    loop {
        interval.tick().await;

        if let Err(e) = sweep_unattached_blobs(&blobs, config.unattached_ttl_secs).await {
            error!(error = %e, "Unattached blob sweep failed");
        }
    }
}

/// Delete every handle left unattached for longer than `ttl_secs`.
/// Returns how many were removed.
pub async fn sweep_unattached_blobs(blobs: &BlobManager, ttl_secs: u64) -> Result<usize, BlobError> {
    let Some(cutoff) = timeout_delta(ttl_secs).and_then(|ttl| Utc::now().checked_sub_signed(ttl))
    else {
        warn!(ttl_secs, "Unattached blob TTL out of range, nothing expires");
        return Ok(0);
    };
    let removed = blobs.sweep_unattached(cutoff).await?;
    if removed > 0 {
        info!(count = removed, "Removed unattached blob handles");
    }
    Ok(removed)
}

use std::sync::Arc;

use common::DlqEnvelope;
use mq::{BroccoliError, BrokerMessage, Mq};
use sea_orm::DatabaseConnection;
use tracing::{error, info};

use crate::dlq::DlqService;

/// Persist envelopes the stand-alone workers dead-lettered.
///
/// The job itself was already marked `Failed` by the worker; this only keeps
/// the envelope for inspection.
pub async fn consume_generation_dlq(db: DatabaseConnection, mq: Arc<Mq>, queue_name: String) {
    info!(queue = %queue_name, "Starting generation DLQ consumer");

    let result = mq
        .process_messages(
            &queue_name,
            None, // single-threaded for sequential DB writes
            None,
            move |message: BrokerMessage<DlqEnvelope>| {
                let db = db.clone();
                async move {
                    let envelope = message.payload;

                    if let Err(e) = DlqService::new(&db).send_to_dlq(&envelope).await {
                        error!(
                            generation_id = ?envelope.generation_id,
                            message_id = %envelope.message_id,
                            error = %e,
                            "Failed to persist generation DLQ envelope"
                        );
                        return Err(BroccoliError::Job(format!("DB persistence failed: {e}")));
                    }

                    info!(
                        generation_id = ?envelope.generation_id,
                        message_id = %envelope.message_id,
                        error_code = %envelope.error_code,
                        retries = envelope.retry_history.len(),
                        "Persisted generation DLQ envelope"
                    );
                    Ok(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Generation DLQ consumer stopped unexpectedly");
    }
}

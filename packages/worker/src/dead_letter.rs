use std::sync::Arc;

use async_trait::async_trait;
use common::DlqEnvelope;
use mq::Mq;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
#[error("dead letter delivery failed: {0}")]
pub struct DeadLetterError(pub String);

/// Where tasks go once they will not be retried.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, envelope: DlqEnvelope) -> Result<(), DeadLetterError>;
}

/// Publishes envelopes to the dead-letter queue consumed by the server.
pub struct MqDeadLetterSink {
    mq: Arc<Mq>,
    queue: String,
}

impl MqDeadLetterSink {
    pub fn new(mq: Arc<Mq>, queue: impl Into<String>) -> Self {
        Self {
            mq,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for MqDeadLetterSink {
    async fn send(&self, envelope: DlqEnvelope) -> Result<(), DeadLetterError> {
        self.mq
            .publish(&self.queue, None, &envelope, None)
            .await
            .map_err(|e| DeadLetterError(format!("failed to publish to {}: {e}", self.queue)))?;
        Ok(())
    }
}

/// Keeps envelopes in memory.
#[derive(Default)]
pub struct MemoryDeadLetterSink {
    envelopes: Mutex<Vec<DlqEnvelope>>,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn envelopes(&self) -> Vec<DlqEnvelope> {
        self.envelopes.lock().await.clone()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn send(&self, envelope: DlqEnvelope) -> Result<(), DeadLetterError> {
        self.envelopes.lock().await.push(envelope);
        Ok(())
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use common::GenerationTask;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use mq::Mq;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
use worker::GenerationExecutor;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("generation {0} is already scheduled")]
    AlreadyScheduled(Uuid),

    #[error("failed to publish generation task: {0}")]
    Publish(String),
}

/// Hands a job to exactly one worker execution, detached from the caller.
///
/// `enqueue` returns once the task is registered, before the worker runs.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn enqueue(&self, task: GenerationTask) -> Result<(), SchedulerError>;
}

/// Runs each task on a spawned tokio task in this process.
pub struct LocalScheduler {
    executor: Arc<GenerationExecutor>,
    in_flight: Arc<DashMap<Uuid, String>>,
}

impl LocalScheduler {
    pub fn new(executor: Arc<GenerationExecutor>) -> Self {
        Self {
            executor,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[async_trait]
impl Scheduler for LocalScheduler {
    async fn enqueue(&self, task: GenerationTask) -> Result<(), SchedulerError> {
        let id = task.generation_id;
        match self.in_flight.entry(id) {
            Entry::Occupied(_) => return Err(SchedulerError::AlreadyScheduled(id)),
            Entry::Vacant(slot) => {
                slot.insert(task.task_id.clone());
            }
        }

        let executor = Arc::clone(&self.executor);
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            executor.run_task(task).await;
            in_flight.remove(&id);
        });

        debug!(generation_id = %id, "Scheduled local generation");
        Ok(())
    }
}

/// Publishes tasks for the stand-alone worker binary.
pub struct MqScheduler {
    mq: Arc<Mq>,
    queue_name: String,
}

impl MqScheduler {
    pub fn new(mq: Arc<Mq>, queue_name: impl Into<String>) -> Self {
        Self {
            mq,
            queue_name: queue_name.into(),
        }
    }
}

#[async_trait]
impl Scheduler for MqScheduler {
    async fn enqueue(&self, task: GenerationTask) -> Result<(), SchedulerError> {
        self.mq
            .publish(&self.queue_name, None, &task, None)
            .await
            .map_err(|e| SchedulerError::Publish(e.to_string()))?;
        info!(
            generation_id = %task.generation_id,
            task_id = %task.task_id,
            queue = %self.queue_name,
            "Published generation task"
        );
        Ok(())
    }
}

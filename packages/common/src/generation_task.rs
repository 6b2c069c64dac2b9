use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One scheduled worker invocation, as carried on the generation queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTask {
    /// Unique per enqueue; used as the DLQ message id.
    pub task_id: String,
    pub generation_id: Uuid,
    pub prompt: String,
}

impl GenerationTask {
    pub fn new(generation_id: Uuid, prompt: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            generation_id,
            prompt: prompt.into(),
        }
    }
}

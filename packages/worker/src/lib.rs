pub mod config;
pub mod dead_letter;
pub mod error;
pub mod executor;
pub mod generation;
pub mod model_client;

#[cfg(test)]
mod testing;

pub use config::{WorkerAppConfig, WorkerConfig};
pub use dead_letter::{DeadLetterError, DeadLetterSink, MemoryDeadLetterSink, MqDeadLetterSink};
pub use error::GenerationError;
pub use executor::GenerationExecutor;
pub use generation::{GenerationWorker, RunOutcome};
pub use model_client::{HttpModelClient, ModelClient, ModelClientError};

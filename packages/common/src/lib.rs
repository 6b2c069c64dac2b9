pub mod blobs;
pub mod config;
pub mod dlq;
#[cfg(feature = "sea-orm")]
pub mod entity;
pub mod generation;
pub mod generation_status;
pub mod generation_task;
pub mod model;
pub mod retry;
pub mod storage;
pub mod store;

pub use config::{
    DlqConfig, DlqConfigError, ModelConfig, MqAppConfig, StorageConfig, StorageConfigError,
};
pub use dlq::{DlqEnvelope, DlqErrorCode, GenerationErrorCode};
pub use generation::{FeedPage, Generation, GenerationPatch, GenerationView};
pub use generation_status::GenerationStatus;
pub use generation_task::GenerationTask;

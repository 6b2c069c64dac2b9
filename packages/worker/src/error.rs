use common::GenerationErrorCode;
use common::blobs::{BlobError, BlobRef};
use common::model::ContractError;
use common::storage::StorageError;
use common::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

use crate::model_client::ModelClientError;

/// Failure of one generation attempt.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation {0} not found")]
    NotFound(Uuid),

    #[error("canvas {0} does not resolve to stored content")]
    CanvasUnresolved(BlobRef),

    #[error("storage error: {0}")]
    Storage(#[from] BlobError),

    #[error("upstream error: {0}")]
    Upstream(#[from] ModelClientError),

    #[error("job store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ContractError> for GenerationError {
    fn from(err: ContractError) -> Self {
        GenerationError::Upstream(ModelClientError::Contract(err))
    }
}

impl GenerationError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(e) => e.is_transient(),
            Self::Storage(BlobError::Storage(StorageError::Io(_))) => true,
            Self::Storage(BlobError::Index(_)) => true,
            Self::Store(StoreError::Backend(_)) => true,
            _ => false,
        }
    }

    /// Reason recorded on the job when this error fails it.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CanvasUnresolved(_) | Self::Storage(_) => GenerationErrorCode::STORAGE_ERROR,
            Self::Upstream(_) => GenerationErrorCode::UPSTREAM_REJECTED,
            Self::NotFound(_) | Self::Store(_) => GenerationErrorCode::GENERATION_FAILED,
        }
    }
}

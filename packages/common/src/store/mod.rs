//! Persistent table of generation jobs.

mod cursor;
mod memory;
#[cfg(feature = "sea-orm")]
mod sea_orm_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::generation::{Generation, GenerationPatch, PatchError};

pub use cursor::FeedCursor;
pub use memory::MemoryJobStore;
#[cfg(feature = "sea-orm")]
pub use sea_orm_store::SeaOrmJobStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidPatch(#[from] PatchError),

    #[error("generation {0} already exists")]
    Duplicate(Uuid),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("job store error: {0}")]
    Backend(String),
}

/// Single-record atomic job storage.
///
/// Feed queries return newest first, ordered by `(created_at, id)` descending.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `Processing` job.
    async fn insert(&self, generation: Generation) -> Result<Uuid, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Generation>, StoreError>;

    /// Merge `patch` into the stored job and return the new value.
    ///
    /// Returns `Ok(None)` if the job does not exist; a deleted job is never
    /// recreated.
    async fn patch(&self, id: Uuid, patch: GenerationPatch)
    -> Result<Option<Generation>, StoreError>;

    /// Remove a job, returning the removed record.
    async fn delete(&self, id: Uuid) -> Result<Option<Generation>, StoreError>;

    async fn by_owner(&self, owner_id: &str) -> Result<Vec<Generation>, StoreError>;

    /// Saved jobs only, served from the `(owner, saved, created_at)` index.
    async fn by_owner_saved(&self, owner_id: &str) -> Result<Vec<Generation>, StoreError>;

    /// Up to `limit` jobs strictly older than `after`.
    async fn page_by_owner(
        &self,
        owner_id: &str,
        after: Option<FeedCursor>,
        limit: u64,
    ) -> Result<Vec<Generation>, StoreError>;

    /// Jobs still `Processing` that were created before `older_than`.
    async fn stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Generation>, StoreError>;
}

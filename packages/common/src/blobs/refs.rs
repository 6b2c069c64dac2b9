use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BlobError, BlobRef, BlobRefRecord};
use crate::storage::ContentHash;

/// Index of issued handles. Every conditional write is atomic per handle.
#[async_trait]
pub trait BlobRefStore: Send + Sync {
    async fn insert(&self, record: BlobRefRecord) -> Result<(), BlobError>;

    async fn get(&self, id: BlobRef) -> Result<Option<BlobRefRecord>, BlobError>;

    /// Point a pending handle at uploaded content. Only the owner may do
    /// this, and only once.
    async fn set_content(
        &self,
        id: BlobRef,
        owner_id: &str,
        hash: ContentHash,
        content_type: Option<String>,
        size: i64,
    ) -> Result<(), BlobError>;

    /// Claim an uploaded, unattached handle for a generation.
    async fn attach(&self, id: BlobRef, owner_id: &str, generation_id: Uuid)
    -> Result<(), BlobError>;

    /// Remove a handle, returning what it pointed at.
    async fn remove(&self, id: BlobRef) -> Result<Option<BlobRefRecord>, BlobError>;

    /// Number of handles still pointing at `hash`.
    async fn count_by_hash(&self, hash: &ContentHash) -> Result<u64, BlobError>;

    /// Handles created before `older_than` that no generation has claimed.
    async fn stale_unattached(&self, older_than: DateTime<Utc>)
    -> Result<Vec<BlobRef>, BlobError>;

    /// Remove a handle only if it is still unattached and created before
    /// `older_than`. A handle attached since it was listed is kept.
    async fn remove_stale_unattached(
        &self,
        id: BlobRef,
        older_than: DateTime<Utc>,
    ) -> Result<Option<BlobRefRecord>, BlobError>;
}

fn is_stale_unattached(record: &BlobRefRecord, older_than: DateTime<Utc>) -> bool {
    record.generation_id.is_none() && record.created_at < older_than
}

/// In-process handle index.
#[derive(Default)]
pub struct MemoryBlobRefStore {
    records: RwLock<HashMap<BlobRef, BlobRefRecord>>,
}

impl MemoryBlobRefStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobRefStore for MemoryBlobRefStore {
    async fn insert(&self, record: BlobRefRecord) -> Result<(), BlobError> {
        self.records.write().await.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: BlobRef) -> Result<Option<BlobRefRecord>, BlobError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn set_content(
        &self,
        id: BlobRef,
        owner_id: &str,
        hash: ContentHash,
        content_type: Option<String>,
        size: i64,
    ) -> Result<(), BlobError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(BlobError::NotFound(id))?;
        if record.owner_id != owner_id {
            return Err(BlobError::NotOwner(id));
        }
        if record.content_hash.is_some() {
            return Err(BlobError::AlreadyUploaded(id));
        }
        record.content_hash = Some(hash);
        record.content_type = content_type;
        record.size = size;
        Ok(())
    }

    async fn attach(
        &self,
        id: BlobRef,
        owner_id: &str,
        generation_id: Uuid,
    ) -> Result<(), BlobError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(BlobError::NotFound(id))?;
        if record.owner_id != owner_id {
            return Err(BlobError::NotOwner(id));
        }
        if record.content_hash.is_none() {
            return Err(BlobError::NotUploaded(id));
        }
        if record.generation_id.is_some() {
            return Err(BlobError::AlreadyAttached(id));
        }
        record.generation_id = Some(generation_id);
        Ok(())
    }

    async fn remove(&self, id: BlobRef) -> Result<Option<BlobRefRecord>, BlobError> {
        Ok(self.records.write().await.remove(&id))
    }

    async fn count_by_hash(&self, hash: &ContentHash) -> Result<u64, BlobError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.content_hash.as_ref() == Some(hash))
            .count() as u64)
    }

    async fn stale_unattached(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<BlobRef>, BlobError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| is_stale_unattached(r, older_than))
            .map(|r| r.id)
            .collect())
    }

    async fn remove_stale_unattached(
        &self,
        id: BlobRef,
        older_than: DateTime<Utc>,
    ) -> Result<Option<BlobRefRecord>, BlobError> {
        let mut records = self.records.write().await;
        match records.get(&id) {
            Some(record) if is_stale_unattached(record, older_than) => Ok(records.remove(&id)),
            _ => Ok(None),
        }
    }
}

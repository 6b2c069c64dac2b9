use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{BlobError, BlobRef, BlobRefRecord, BlobRefStore, image_content_type};
use crate::storage::{BlobStore, ContentHash};

/// Where a client should send the bytes of a new upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UploadHandle {
    pub blob_ref: BlobRef,
    /// `PUT` the raw image bytes here.
    #[schema(example = "http://localhost:3000/api/v1/uploads/5f0c6a4e-2b1d-4c39-9a0e-0d7f4b8e2c11")]
    pub write_url: String,
}

/// Issues, resolves and garbage-collects blob handles.
pub struct BlobManager {
    store: Arc<dyn BlobStore>,
    refs: Arc<dyn BlobRefStore>,
    public_url: String,
    /// Serializes "write content + point a handle at it" against
    /// "drop last handle + delete content" so deduplicated bytes are never
    /// removed from under a handle that is being created.
    gc_lock: Mutex<()>,
}

impl BlobManager {
    pub fn new(
        store: Arc<dyn BlobStore>,
        refs: Arc<dyn BlobRefStore>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            refs,
            public_url: public_url.into().trim_end_matches('/').to_string(),
            gc_lock: Mutex::new(()),
        }
    }

    /// Reserve a handle for `owner_id` to upload into.
    pub async fn issue_upload_handle(&self, owner_id: &str) -> Result<UploadHandle, BlobError> {
        let record = BlobRefRecord::pending(owner_id);
        let blob_ref = record.id;
        self.refs.insert(record).await?;
        Ok(UploadHandle {
            blob_ref,
            write_url: format!("{}/api/v1/uploads/{blob_ref}", self.public_url),
        })
    }

    /// Store the bytes sent to an issued handle.
    pub async fn complete_upload(
        &self,
        owner_id: &str,
        blob_ref: BlobRef,
        content_type: Option<String>,
        bytes: &[u8],
    ) -> Result<(), BlobError> {
        let record = self
            .refs
            .get(blob_ref)
            .await?
            .ok_or(BlobError::NotFound(blob_ref))?;
        if record.owner_id != owner_id {
            return Err(BlobError::NotOwner(blob_ref));
        }
        if record.content_hash.is_some() {
            return Err(BlobError::AlreadyUploaded(blob_ref));
        }
        let Some(content_type) = content_type.as_deref().and_then(image_content_type) else {
            return Err(BlobError::UnsupportedContentType(content_type));
        };

        let _gc = self.gc_lock.lock().await;
        let hash = self.store.put(bytes).await?;
        if let Err(e) = self
            .refs
            .set_content(
                blob_ref,
                owner_id,
                hash,
                Some(content_type.to_string()),
                bytes.len() as i64,
            )
            .await
        {
            self.collect_locked(&hash).await;
            return Err(e);
        }
        Ok(())
    }

    /// Store bytes under a new handle owned by `owner_id`.
    pub async fn store(
        &self,
        owner_id: &str,
        bytes: &[u8],
        content_type: Option<String>,
    ) -> Result<BlobRef, BlobError> {
        let mut record = BlobRefRecord::pending(owner_id);
        let blob_ref = record.id;

        let _gc = self.gc_lock.lock().await;
        let hash = self.store.put(bytes).await?;
        record.content_hash = Some(hash);
        record.content_type = content_type
            .as_deref()
            .and_then(image_content_type)
            .map(str::to_string);
        record.size = bytes.len() as i64;
        if let Err(e) = self.refs.insert(record).await {
            self.collect_locked(&hash).await;
            return Err(e);
        }
        Ok(blob_ref)
    }

    /// Fetchable URL for a handle, or `None` when it no longer resolves.
    pub async fn resolve(&self, blob_ref: BlobRef) -> Result<Option<String>, BlobError> {
        let record = self.refs.get(blob_ref).await?;
        Ok(record
            .filter(|r| r.content_hash.is_some())
            .map(|_| format!("{}/api/v1/blobs/{blob_ref}", self.public_url)))
    }

    /// Bytes and content type behind a handle.
    pub async fn read(&self, blob_ref: BlobRef) -> Result<(Vec<u8>, Option<String>), BlobError> {
        let record = self
            .refs
            .get(blob_ref)
            .await?
            .ok_or(BlobError::NotFound(blob_ref))?;
        let hash = record
            .content_hash
            .ok_or(BlobError::NotUploaded(blob_ref))?;
        let bytes = self.store.get(&hash).await?;
        Ok((bytes, record.content_type))
    }

    pub async fn record(&self, blob_ref: BlobRef) -> Result<Option<BlobRefRecord>, BlobError> {
        self.refs.get(blob_ref).await
    }

    /// Bind an uploaded handle to exactly one generation.
    pub async fn attach(
        &self,
        blob_ref: BlobRef,
        owner_id: &str,
        generation_id: Uuid,
    ) -> Result<(), BlobError> {
        self.refs.attach(blob_ref, owner_id, generation_id).await
    }

    /// Drop a handle and, if it was the last one, its content.
    ///
    /// Returns `false` when the handle did not exist.
    pub async fn delete(&self, blob_ref: BlobRef) -> Result<bool, BlobError> {
        let _gc = self.gc_lock.lock().await;
        let Some(record) = self.refs.remove(blob_ref).await? else {
            return Ok(false);
        };
        if let Some(hash) = record.content_hash
            && self.refs.count_by_hash(&hash).await? == 0
        {
            self.store.delete(&hash).await?;
            debug!(%blob_ref, %hash, "Deleted unreferenced blob content");
        }
        Ok(true)
    }

    /// Delete handles created before `older_than` that were never attached to
    /// a generation, along with content no other handle shares.
    ///
    /// Returns how many handles were removed.
    pub async fn sweep_unattached(&self, older_than: DateTime<Utc>) -> Result<usize, BlobError> {
        let stale = self.refs.stale_unattached(older_than).await?;
        let mut removed = 0;
        for blob_ref in stale {
            let _gc = self.gc_lock.lock().await;
            let Some(record) = self.refs.remove_stale_unattached(blob_ref, older_than).await?
            else {
                continue;
            };
            removed += 1;
            if let Some(hash) = record.content_hash {
                self.collect_locked(&hash).await;
            }
            debug!(%blob_ref, owner_id = %record.owner_id, "Removed unattached blob handle");
        }
        Ok(removed)
    }

    /// Best-effort removal of content nothing points at. Caller holds `gc_lock`.
    async fn collect_locked(&self, hash: &ContentHash) {
        match self.refs.count_by_hash(hash).await {
            Ok(0) => {
                if let Err(e) = self.store.delete(hash).await {
                    warn!(%hash, error = %e, "Failed to remove orphaned blob content");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(%hash, error = %e, "Failed to count blob references"),
        }
    }
}

//! Change notifications behind the live feed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::generation::{Generation, GenerationPatch};
use common::store::{FeedCursor, JobStore, StoreError};
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcasts the owner id of every committed job write.
#[derive(Clone)]
pub struct FeedNotifier {
    sender: broadcast::Sender<String>,
}

impl FeedNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Fire-and-forget; having no subscribers is fine.
    pub fn notify(&self, owner_id: &str) {
        let _ = self.sender.send(owner_id.to_string());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Default for FeedNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A [`JobStore`] that announces its writes on a [`FeedNotifier`].
pub struct NotifyingJobStore {
    inner: Arc<dyn JobStore>,
    notifier: FeedNotifier,
}

impl NotifyingJobStore {
    pub fn new(inner: Arc<dyn JobStore>, notifier: FeedNotifier) -> Self {
        Self { inner, notifier }
    }
}

#[async_trait]
impl JobStore for NotifyingJobStore {
    async fn insert(&self, generation: Generation) -> Result<Uuid, StoreError> {
        let owner_id = generation.owner_id.clone();
        let id = self.inner.insert(generation).await?;
        self.notifier.notify(&owner_id);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Generation>, StoreError> {
        self.inner.get(id).await
    }

    async fn patch(
        &self,
        id: Uuid,
        patch: GenerationPatch,
    ) -> Result<Option<Generation>, StoreError> {
        let updated = self.inner.patch(id, patch).await?;
        if let Some(g) = &updated {
            self.notifier.notify(&g.owner_id);
        }
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Generation>, StoreError> {
        let removed = self.inner.delete(id).await?;
        if let Some(g) = &removed {
            self.notifier.notify(&g.owner_id);
        }
        Ok(removed)
    }

    async fn by_owner(&self, owner_id: &str) -> Result<Vec<Generation>, StoreError> {
        self.inner.by_owner(owner_id).await
    }

    async fn by_owner_saved(&self, owner_id: &str) -> Result<Vec<Generation>, StoreError> {
        self.inner.by_owner_saved(owner_id).await
    }

    async fn page_by_owner(
        &self,
        owner_id: &str,
        after: Option<FeedCursor>,
        limit: u64,
    ) -> Result<Vec<Generation>, StoreError> {
        self.inner.page_by_owner(owner_id, after, limit).await
    }

    async fn stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Generation>, StoreError> {
        self.inner.stale_processing(older_than).await
    }
}

use common::GenerationView;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::{ClientError, FeedBackend};
use crate::cache::{FeedCache, FeedCommand};

/// Drives a [`FeedCache`] against a backend: mutations are shown at once,
/// then confirmed or rolled back by the server's answer.
///
/// Every method takes `&self`. The cache lock is never held across a
/// backend call, so `view` and `receive_snapshot` stay usable while
/// mutations are in flight.
pub struct Session<B: FeedBackend> {
    backend: B,
    cache: Mutex<FeedCache>,
}

impl<B: FeedBackend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: Mutex::new(FeedCache::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Replace the cache with the server's current feed.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let feed = self.backend.fetch_feed().await?;
        self.cache.lock().replace(feed);
        Ok(())
    }

    /// Install a snapshot pushed by the live feed.
    pub fn receive_snapshot(&self, snapshot: Vec<GenerationView>) {
        self.cache.lock().replace(snapshot);
    }

    pub async fn toggle_save(&self, id: Uuid) -> Result<GenerationView, ClientError> {
        let token = self.cache.lock().apply(FeedCommand::ToggleSave(id));
        let result = self.backend.toggle_save(id).await;

        let mut cache = self.cache.lock();
        match result {
            Ok(view) => {
                cache.confirm(token);
                Ok(view)
            }
            Err(e) => {
                warn!(%id, error = %e, "Toggle rejected, rolling back");
                cache.reject(token);
                Err(e)
            }
        }
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ClientError> {
        let token = self.cache.lock().apply(FeedCommand::Delete(id));
        let result = self.backend.delete(id).await;

        let mut cache = self.cache.lock();
        match result {
            Ok(()) => {
                debug!(%id, "Delete confirmed");
                cache.confirm(token);
                Ok(())
            }
            Err(e) => {
                warn!(%id, error = %e, "Delete rejected, rolling back");
                cache.reject(token);
                Err(e)
            }
        }
    }

    pub fn view(&self) -> Vec<GenerationView> {
        self.cache.lock().view()
    }

    pub fn saved_view(&self) -> Vec<GenerationView> {
        self.cache.lock().saved_view()
    }

    /// Mutations still waiting for the server's answer.
    pub fn unconfirmed(&self) -> usize {
        self.cache.lock().unconfirmed()
    }

    /// No local delta is layered over the last snapshot.
    pub fn is_reconciled(&self) -> bool {
        self.cache.lock().is_reconciled()
    }
}

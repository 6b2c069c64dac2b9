use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{FeedCursor, JobStore, StoreError};
use crate::generation::{Generation, GenerationPatch, now_micros};
use crate::generation_status::GenerationStatus;

type FeedKey = (DateTime<Utc>, Uuid);

#[derive(Default)]
struct Tables {
    rows: HashMap<Uuid, Generation>,
    by_owner: HashMap<String, BTreeSet<FeedKey>>,
    saved_by_owner: HashMap<String, BTreeSet<FeedKey>>,
}

impl Tables {
    fn index(&mut self, g: &Generation) {
        let key = (g.created_at, g.id);
        self.by_owner
            .entry(g.owner_id.clone())
            .or_default()
            .insert(key);
        if g.is_saved {
            self.saved_by_owner
                .entry(g.owner_id.clone())
                .or_default()
                .insert(key);
        }
    }

    fn unindex(&mut self, g: &Generation) {
        let key = (g.created_at, g.id);
        if let Some(set) = self.by_owner.get_mut(&g.owner_id) {
            set.remove(&key);
        }
        if let Some(set) = self.saved_by_owner.get_mut(&g.owner_id) {
            set.remove(&key);
        }
    }

    fn collect<'a>(&self, keys: impl Iterator<Item = &'a FeedKey>) -> Vec<Generation> {
        keys.filter_map(|(_, id)| self.rows.get(id).cloned()).collect()
    }
}

/// Job store held in process memory.
///
/// One lock guards the rows and both indexes, so every write is atomic and
/// the indexes never disagree with the rows.
#[derive(Default)]
pub struct MemoryJobStore {
    tables: RwLock<Tables>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, generation: Generation) -> Result<Uuid, StoreError> {
        generation.validate_new()?;
        let mut tables = self.tables.write().await;
        if tables.rows.contains_key(&generation.id) {
            return Err(StoreError::Duplicate(generation.id));
        }
        let id = generation.id;
        tables.index(&generation);
        tables.rows.insert(id, generation);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Generation>, StoreError> {
        Ok(self.tables.read().await.rows.get(&id).cloned())
    }

    async fn patch(
        &self,
        id: Uuid,
        patch: GenerationPatch,
    ) -> Result<Option<Generation>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(current) = tables.rows.get(&id) else {
            return Ok(None);
        };
        let updated = current.apply(&patch, now_micros())?;

        if updated.is_saved != current.is_saved {
            let key = (updated.created_at, updated.id);
            let saved = tables
                .saved_by_owner
                .entry(updated.owner_id.clone())
                .or_default();
            if updated.is_saved {
                saved.insert(key);
            } else {
                saved.remove(&key);
            }
        }
        tables.rows.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Generation>, StoreError> {
        let mut tables = self.tables.write().await;
        let removed = tables.rows.remove(&id);
        if let Some(g) = &removed {
            tables.unindex(g);
        }
        Ok(removed)
    }

    async fn by_owner(&self, owner_id: &str) -> Result<Vec<Generation>, StoreError> {
        let tables = self.tables.read().await;
        Ok(match tables.by_owner.get(owner_id) {
            Some(keys) => tables.collect(keys.iter().rev()),
            None => Vec::new(),
        })
    }

    async fn by_owner_saved(&self, owner_id: &str) -> Result<Vec<Generation>, StoreError> {
        let tables = self.tables.read().await;
        Ok(match tables.saved_by_owner.get(owner_id) {
            Some(keys) => tables.collect(keys.iter().rev()),
            None => Vec::new(),
        })
    }

    async fn page_by_owner(
        &self,
        owner_id: &str,
        after: Option<FeedCursor>,
        limit: u64,
    ) -> Result<Vec<Generation>, StoreError> {
        let tables = self.tables.read().await;
        let Some(keys) = tables.by_owner.get(owner_id) else {
            return Ok(Vec::new());
        };
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(match after {
            Some(cursor) => tables.collect(keys.range(..cursor.key()).rev().take(limit)),
            None => tables.collect(keys.iter().rev().take(limit)),
        })
    }

    async fn stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Generation>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .rows
            .values()
            .filter(|g| g.status == GenerationStatus::Processing && g.created_at < older_than)
            .cloned()
            .collect())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use super::{FeedCursor, JobStore, StoreError};
use crate::blobs::BlobRef;
use crate::entity::generation;
use crate::generation::{Generation, GenerationPatch, now_micros};
use crate::generation_status::GenerationStatus;

/// Job store backed by the `generation` table.
///
/// Patches run inside a transaction holding a `FOR UPDATE` row lock, so
/// concurrent toggles serialize instead of overwriting each other.
#[derive(Clone)]
pub struct SeaOrmJobStore {
    db: DatabaseConnection,
}

impl SeaOrmJobStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<generation::Model> for Generation {
    fn from(model: generation::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            prompt: model.prompt,
            canvas_image_ref: BlobRef::from_uuid(model.canvas_image_ref),
            result_image_ref: model.result_image_ref.map(BlobRef::from_uuid),
            status: model.status,
            is_saved: model.is_saved,
            error_code: model.error_code,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

fn newest_first(select: Select<generation::Entity>) -> Select<generation::Entity> {
    select
        .order_by_desc(generation::Column::CreatedAt)
        .order_by_desc(generation::Column::Id)
}

#[async_trait]
impl JobStore for SeaOrmJobStore {
    async fn insert(&self, g: Generation) -> Result<Uuid, StoreError> {
        g.validate_new()?;
        let id = g.id;
        let model = generation::ActiveModel {
            id: Set(g.id),
            owner_id: Set(g.owner_id),
            prompt: Set(g.prompt),
            canvas_image_ref: Set(g.canvas_image_ref.as_uuid()),
            result_image_ref: Set(None),
            status: Set(g.status),
            is_saved: Set(g.is_saved),
            error_code: Set(None),
            created_at: Set(g.created_at),
            updated_at: Set(g.updated_at),
        };
        match model.insert(&self.db).await {
            Ok(_) => Ok(id),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(StoreError::Duplicate(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Generation>, StoreError> {
        Ok(generation::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Generation::from))
    }

    async fn patch(
        &self,
        id: Uuid,
        patch: GenerationPatch,
    ) -> Result<Option<Generation>, StoreError> {
        let txn = self.db.begin().await?;

        let existing = generation::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?;

        let Some(existing) = existing else {
            txn.rollback().await?;
            return Ok(None);
        };

        let updated = match Generation::from(existing.clone()).apply(&patch, now_micros()) {
            Ok(updated) => updated,
            Err(e) => {
                txn.rollback().await?;
                return Err(e.into());
            }
        };

        let mut active: generation::ActiveModel = existing.into();
        active.status = Set(updated.status);
        active.result_image_ref = Set(updated.result_image_ref.map(|r| r.as_uuid()));
        active.error_code = Set(updated.error_code.clone());
        active.is_saved = Set(updated.is_saved);
        active.updated_at = Set(updated.updated_at);
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(Some(updated))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Generation>, StoreError> {
        let txn = self.db.begin().await?;

        let existing = generation::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?;

        let Some(existing) = existing else {
            txn.rollback().await?;
            return Ok(None);
        };

        generation::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        Ok(Some(existing.into()))
    }

    async fn by_owner(&self, owner_id: &str) -> Result<Vec<Generation>, StoreError> {
        let rows = newest_first(
            generation::Entity::find().filter(generation::Column::OwnerId.eq(owner_id)),
        )
        .all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Generation::from).collect())
    }

    async fn by_owner_saved(&self, owner_id: &str) -> Result<Vec<Generation>, StoreError> {
        let rows = newest_first(
            generation::Entity::find()
                .filter(generation::Column::OwnerId.eq(owner_id))
                .filter(generation::Column::IsSaved.eq(true)),
        )
        .all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Generation::from).collect())
    }

    async fn page_by_owner(
        &self,
        owner_id: &str,
        after: Option<FeedCursor>,
        limit: u64,
    ) -> Result<Vec<Generation>, StoreError> {
        let mut query =
            generation::Entity::find().filter(generation::Column::OwnerId.eq(owner_id));

        if let Some(cursor) = after {
            query = query.filter(
                Condition::any()
                    .add(generation::Column::CreatedAt.lt(cursor.created_at))
                    .add(
                        Condition::all()
                            .add(generation::Column::CreatedAt.eq(cursor.created_at))
                            .add(generation::Column::Id.lt(cursor.id)),
                    ),
            );
        }

        let rows = newest_first(query).limit(limit).all(&self.db).await?;
        Ok(rows.into_iter().map(Generation::from).collect())
    }

    async fn stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Generation>, StoreError> {
        let rows = generation::Entity::find()
            .filter(generation::Column::Status.eq(GenerationStatus::Processing))
            .filter(generation::Column::CreatedAt.lt(older_than))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Generation::from).collect())
    }
}

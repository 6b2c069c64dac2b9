use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use super::{BlobError, BlobRef, BlobRefRecord, BlobRefStore};
use crate::entity::blob_ref;
use crate::storage::ContentHash;

/// Handle index persisted in the `blob_ref` table.
#[derive(Clone)]
pub struct SeaOrmBlobRefStore {
    db: DatabaseConnection,
}

impl SeaOrmBlobRefStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Explain why a conditional update matched no row.
    async fn rejection(
        &self,
        id: BlobRef,
        owner_id: &str,
        when_owned: BlobError,
    ) -> Result<(), BlobError> {
        match self.get(id).await? {
            None => Err(BlobError::NotFound(id)),
            Some(record) if record.owner_id != owner_id => Err(BlobError::NotOwner(id)),
            Some(_) => Err(when_owned),
        }
    }
}

fn index_err(err: DbErr) -> BlobError {
    BlobError::Index(err.to_string())
}

impl TryFrom<blob_ref::Model> for BlobRefRecord {
    type Error = BlobError;

    fn try_from(model: blob_ref::Model) -> Result<Self, Self::Error> {
        let content_hash = model
            .content_hash
            .as_deref()
            .map(str::parse::<ContentHash>)
            .transpose()?;
        Ok(Self {
            id: BlobRef::from_uuid(model.id),
            owner_id: model.owner_id,
            content_hash,
            content_type: model.content_type,
            size: model.size,
            generation_id: model.generation_id,
            created_at: model.created_at,
        })
    }
}

#[async_trait]
impl BlobRefStore for SeaOrmBlobRefStore {
    async fn insert(&self, record: BlobRefRecord) -> Result<(), BlobError> {
        let model = blob_ref::ActiveModel {
            id: Set(record.id.as_uuid()),
            owner_id: Set(record.owner_id),
            content_hash: Set(record.content_hash.map(|h| h.to_hex())),
            content_type: Set(record.content_type),
            size: Set(record.size),
            generation_id: Set(record.generation_id),
            created_at: Set(record.created_at),
        };
        model.insert(&self.db).await.map_err(index_err)?;
        Ok(())
    }

    async fn get(&self, id: BlobRef) -> Result<Option<BlobRefRecord>, BlobError> {
        blob_ref::Entity::find_by_id(id.as_uuid())
            .one(&self.db)
            .await
            .map_err(index_err)?
            .map(BlobRefRecord::try_from)
            .transpose()
    }

    async fn set_content(
        &self,
        id: BlobRef,
        owner_id: &str,
        hash: ContentHash,
        content_type: Option<String>,
        size: i64,
    ) -> Result<(), BlobError> {
        let result = blob_ref::Entity::update_many()
            .col_expr(blob_ref::Column::ContentHash, Expr::value(hash.to_hex()))
            .col_expr(blob_ref::Column::ContentType, Expr::value(content_type))
            .col_expr(blob_ref::Column::Size, Expr::value(size))
            .filter(blob_ref::Column::Id.eq(id.as_uuid()))
            .filter(blob_ref::Column::OwnerId.eq(owner_id))
            .filter(blob_ref::Column::ContentHash.is_null())
            .exec(&self.db)
            .await
            .map_err(index_err)?;

        if result.rows_affected > 0 {
            return Ok(());
        }
        self.rejection(id, owner_id, BlobError::AlreadyUploaded(id))
            .await
    }

    async fn attach(
        &self,
        id: BlobRef,
        owner_id: &str,
        generation_id: Uuid,
    ) -> Result<(), BlobError> {
        let result = blob_ref::Entity::update_many()
            .col_expr(blob_ref::Column::GenerationId, Expr::value(generation_id))
            .filter(blob_ref::Column::Id.eq(id.as_uuid()))
            .filter(blob_ref::Column::OwnerId.eq(owner_id))
            .filter(blob_ref::Column::ContentHash.is_not_null())
            .filter(blob_ref::Column::GenerationId.is_null())
            .exec(&self.db)
            .await
            .map_err(index_err)?;

        if result.rows_affected > 0 {
            return Ok(());
        }
        let when_owned = match self.get(id).await? {
            Some(record) if record.content_hash.is_none() => BlobError::NotUploaded(id),
            _ => BlobError::AlreadyAttached(id),
        };
        self.rejection(id, owner_id, when_owned).await
    }

    async fn remove(&self, id: BlobRef) -> Result<Option<BlobRefRecord>, BlobError> {
        let txn = self.db.begin().await.map_err(index_err)?;

        let existing = blob_ref::Entity::find_by_id(id.as_uuid())
            .lock(LockType::Update)
            .one(&txn)
            .await
            .map_err(index_err)?;

        let Some(existing) = existing else {
            txn.rollback().await.map_err(index_err)?;
            return Ok(None);
        };

        blob_ref::Entity::delete_by_id(id.as_uuid())
            .exec(&txn)
            .await
            .map_err(index_err)?;
        txn.commit().await.map_err(index_err)?;

        BlobRefRecord::try_from(existing).map(Some)
    }

    async fn count_by_hash(&self, hash: &ContentHash) -> Result<u64, BlobError> {
        blob_ref::Entity::find()
            .filter(blob_ref::Column::ContentHash.eq(hash.to_hex()))
            .count(&self.db)
            .await
            .map_err(index_err)
    }

    async fn stale_unattached(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<BlobRef>, BlobError> {
        let ids: Vec<Uuid> = blob_ref::Entity::find()
            .select_only()
            .column(blob_ref::Column::Id)
            .filter(blob_ref::Column::GenerationId.is_null())
            .filter(blob_ref::Column::CreatedAt.lt(older_than))
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(index_err)?;
        Ok(ids.into_iter().map(BlobRef::from_uuid).collect())
    }

    async fn remove_stale_unattached(
        &self,
        id: BlobRef,
        older_than: DateTime<Utc>,
    ) -> Result<Option<BlobRefRecord>, BlobError> {
        let txn = self.db.begin().await.map_err(index_err)?;

        let existing = blob_ref::Entity::find_by_id(id.as_uuid())
            .filter(blob_ref::Column::GenerationId.is_null())
            .filter(blob_ref::Column::CreatedAt.lt(older_than))
            .lock(LockType::Update)
            .one(&txn)
            .await
            .map_err(index_err)?;

        let Some(existing) = existing else {
            txn.rollback().await.map_err(index_err)?;
            return Ok(None);
        };

        blob_ref::Entity::delete_by_id(id.as_uuid())
            .exec(&txn)
            .await
            .map_err(index_err)?;
        txn.commit().await.map_err(index_err)?;

        BlobRefRecord::try_from(existing).map(Some)
    }
}

use sea_orm::entity::prelude::*;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "blob_ref")]
pub struct Model {
    /// UUIDv4 handle exposed in URLs.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub owner_id: String,

    /// Hex SHA-256 of the content; NULL until uploaded.
    #[sea_orm(indexed)]
    pub content_hash: Option<String>,

    pub content_type: Option<String>,

    pub size: i64,

    /// Generation the blob is attached to.
    #[sea_orm(indexed)]
    pub generation_id: Option<Uuid>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

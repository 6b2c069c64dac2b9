use sea_orm::entity::prelude::*;

use crate::generation_status::GenerationStatus;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "generation")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub owner_id: String,

    #[sea_orm(column_type = "Text")]
    pub prompt: String,

    pub canvas_image_ref: Uuid,

    pub result_image_ref: Option<Uuid>,

    pub status: GenerationStatus,

    #[sea_orm(default_value = false)]
    pub is_saved: bool,

    pub error_code: Option<String>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

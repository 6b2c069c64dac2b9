use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A generation task that will not be retried.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dead_letter_message")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Task id, or `stuck-generation-<id>` for jobs failed by the stuck-job detector.
    #[sea_orm(unique)]
    pub message_id: String,

    #[sea_orm(indexed)]
    pub generation_id: Option<Uuid>,

    #[sea_orm(column_type = "JsonBinary")]
    pub payload: serde_json::Value,

    #[sea_orm(column_type = "Text")]
    pub error_message: String,

    /// MAX_RETRIES_EXCEEDED or STUCK_JOB.
    #[sea_orm(indexed)]
    pub error_code: String,

    pub retry_count: i32,

    /// Full retry history as JSON array: [{attempt, error, timestamp}]
    #[sea_orm(column_type = "JsonBinary")]
    pub retry_history: serde_json::Value,

    pub first_failed_at: DateTimeUtc,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

use async_trait::async_trait;
use chrono::Utc;
use common::DlqEnvelope;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set, SqlErr,
};
use worker::{DeadLetterError, DeadLetterSink};

use crate::entity::dead_letter_message;

pub struct DlqService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> DlqService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Persist a dead-lettered task.
    ///
    /// Redelivery of the same envelope returns the existing row.
    pub async fn send_to_dlq(
        &self,
        envelope: &DlqEnvelope,
    ) -> Result<dead_letter_message::Model, DbErr> {
        let first_failed_at = envelope
            .retry_history
            .first()
            .map(|r| r.timestamp)
            .unwrap_or_else(Utc::now);

        let model = dead_letter_message::ActiveModel {
            message_id: Set(envelope.message_id.clone()),
            generation_id: Set(envelope.generation_id),
            payload: Set(envelope.payload.clone()),
            error_message: Set(envelope.error_message.clone()),
            error_code: Set(envelope.error_code.to_string()),
            retry_count: Set(envelope.retry_history.len() as i32),
            retry_history: Set(serde_json::to_value(&envelope.retry_history).unwrap_or_default()),
            first_failed_at: Set(first_failed_at),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        match model.insert(self.conn).await {
            Ok(inserted) => Ok(inserted),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                dead_letter_message::Entity::find()
                    .filter(dead_letter_message::Column::MessageId.eq(&envelope.message_id))
                    .one(self.conn)
                    .await?
                    .ok_or_else(|| {
                        DbErr::Custom(
                            "UniqueConstraintViolation but existing row not found".to_string(),
                        )
                    })
            }
            Err(e) => Err(e),
        }
    }
}

/// Dead-letter sink writing straight to `dead_letter_message`.
pub struct DbDeadLetterSink {
    db: DatabaseConnection,
}

impl DbDeadLetterSink {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeadLetterSink for DbDeadLetterSink {
    async fn send(&self, envelope: DlqEnvelope) -> Result<(), DeadLetterError> {
        DlqService::new(&self.db)
            .send_to_dlq(&envelope)
            .await
            .map_err(|e| DeadLetterError(e.to_string()))?;
        Ok(())
    }
}

//! Transactional outbox.
//!
//! Rows are written in the same transaction as the aggregate change they
//! describe, picked up oldest first by the relay and marked processed once
//! published. Rows are never deleted.

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryOutbox;

use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use ecom_sdk::events::IntegrationEvent;
use kanau::processor::Processor;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OutboxMessage {
    pub id: i64,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub processed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxMessageInsert {
    pub routing_key: String,
    pub payload: Vec<u8>,
}

impl OutboxMessageInsert {
    /// Snapshot an event into an outbox row. The payload is fixed here and
    /// never re-serialized later.
    pub fn from_event<E: IntegrationEvent>(event: &E) -> Result<Self, serde_json::Error> {
        Ok(Self {
            routing_key: E::ROUTING_KEY.to_string(),
            payload: event.encode()?,
        })
    }
}

impl OutboxMessage {
    /// Insert a pending row inside an open transaction. Returns the new id.
    pub async fn enqueue_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        insert: OutboxMessageInsert,
    ) -> Result<i64, sqlx::Error> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO outbox (routing_key, payload)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(insert.routing_key)
        .bind(insert.payload)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }
}

#[derive(Debug, Clone)]
/// Get the oldest unprocessed rows, at most `limit` of them.
///
/// Ties on `created_at` are broken by id so the order is stable across ticks.
pub struct GetUnprocessedOutboxMessages {
    pub limit: i64,
}

impl Processor<GetUnprocessedOutboxMessages> for DatabaseProcessor {
    type Output = Vec<OutboxMessage>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetUnprocessedOutboxMessages")]
    async fn process(
        &self,
        query: GetUnprocessedOutboxMessages,
    ) -> Result<Vec<OutboxMessage>, sqlx::Error> {
        let messages = sqlx::query_as::<_, OutboxMessage>(
            r#"
            SELECT id, routing_key, payload, created_at, processed_at
            FROM outbox
            WHERE processed_at IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }
}

#[derive(Debug, Clone)]
/// Mark one row as processed.
///
/// Marking an already processed row keeps its original timestamp, so the
/// null to non-null transition happens once.
pub struct MarkOutboxMessageProcessed {
    pub id: i64,
}

impl Processor<MarkOutboxMessageProcessed> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkOutboxMessageProcessed")]
    async fn process(&self, cmd: MarkOutboxMessageProcessed) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE outbox
            SET processed_at = COALESCE(processed_at, NOW())
            WHERE id = $1
            "#,
        )
        .bind(cmd.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// The relay's view of the outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxMessage>, sqlx::Error>;

    async fn mark_processed(&self, id: i64) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl<T: OutboxStore + ?Sized> OutboxStore for std::sync::Arc<T> {
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxMessage>, sqlx::Error> {
        (**self).fetch_unprocessed(limit).await
    }

    async fn mark_processed(&self, id: i64) -> Result<(), sqlx::Error> {
        (**self).mark_processed(id).await
    }
}

#[async_trait]
impl OutboxStore for DatabaseProcessor {
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxMessage>, sqlx::Error> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.process(GetUnprocessedOutboxMessages { limit }).await
    }

    async fn mark_processed(&self, id: i64) -> Result<(), sqlx::Error> {
        self.process(MarkOutboxMessageProcessed { id }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecom_sdk::events::ProductUpserted;
    use uuid::Uuid;

    #[test]
    fn test_insert_from_event_snapshots_payload() {
        let event = ProductUpserted {
            id: Uuid::new_v4(),
            title: "Lamp".into(),
            sku: "LMP-1".into(),
            price: 2599,
            updated_at: OffsetDateTime::now_utc(),
        };
        let insert = OutboxMessageInsert::from_event(&event).unwrap();
        assert_eq!(insert.routing_key, "product.upserted");
        assert_eq!(ProductUpserted::decode(&insert.payload).unwrap(), event);
    }
}

//! Atomic aggregate writes.
//!
//! A mutation and the outbox row announcing it are committed together or
//! not at all. Nothing here talks to the bus; the relay picks the row up.

use std::future::Future;

use crate::entities::outbox::{OutboxMessage, OutboxMessageInsert};
use crate::framework::{DatabaseProcessor, TransactionProcessor};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A change to one aggregate, possibly spanning several rows, applied
/// inside a caller-owned transaction.
pub trait AggregateMutation: Send {
    type Output: Send;

    fn apply(
        self,
        db: &mut TransactionProcessor<'_>,
    ) -> impl Future<Output = Result<Self::Output, sqlx::Error>> + Send;
}

/// Apply `mutation` and insert `outbox` in one transaction.
///
/// On any error the transaction is dropped, which rolls it back, so
/// neither the aggregate rows nor the outbox row become visible.
#[tracing::instrument(skip_all, err, fields(routing_key = %outbox.routing_key))]
pub async fn commit_with_event<M: AggregateMutation>(
    db: &DatabaseProcessor,
    mutation: M,
    outbox: OutboxMessageInsert,
) -> Result<M::Output, WriteError> {
    let mut tx = db.begin().await?;
    let output = mutation.apply(&mut tx).await?;
    let outbox_id = OutboxMessage::enqueue_tx(&mut tx.tx, outbox).await?;
    tx.commit().await?;
    tracing::debug!(outbox_id, "Committed mutation with outbox row");
    Ok(output)
}

/// Apply `mutation` in its own transaction without announcing it.
pub async fn commit<M: AggregateMutation>(
    db: &DatabaseProcessor,
    mutation: M,
) -> Result<M::Output, WriteError> {
    let mut tx = db.begin().await?;
    let output = mutation.apply(&mut tx).await?;
    tx.commit().await?;
    Ok(output)
}

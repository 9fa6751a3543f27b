//! In-memory outbox for testing the relay without a database.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::{OutboxMessage, OutboxMessageInsert, OutboxStore};

#[derive(Default)]
pub struct MemoryOutbox {
    rows: Mutex<Vec<OutboxMessage>>,
    fail_reads: AtomicBool,
    fail_marks: AtomicBool,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pending row with the next id. Returns the id.
    pub async fn enqueue(&self, insert: OutboxMessageInsert) -> i64 {
        let mut rows = self.rows.lock().await;
        let id = rows.len() as i64 + 1;
        rows.push(OutboxMessage {
            id,
            routing_key: insert.routing_key,
            payload: insert.payload,
            created_at: OffsetDateTime::now_utc(),
            processed_at: None,
        });
        id
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_marks(&self, fail: bool) {
        self.fail_marks.store(fail, Ordering::SeqCst);
    }

    pub async fn rows(&self) -> Vec<OutboxMessage> {
        self.rows.lock().await.clone()
    }

    pub async fn unprocessed_count(&self) -> usize {
        self.rows
            .lock()
            .await
            .iter()
            .filter(|row| row.processed_at.is_none())
            .count()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutbox {
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxMessage>, sqlx::Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let rows = self.rows.lock().await;
        let mut pending: Vec<OutboxMessage> = rows
            .iter()
            .filter(|row| row.processed_at.is_none())
            .cloned()
            .collect();
        pending.sort_by_key(|row| (row.created_at, row.id));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_processed(&self, id: i64) -> Result<(), sqlx::Error> {
        if self.fail_marks.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|row| row.id == id) {
            row.processed_at.get_or_insert_with(OffsetDateTime::now_utc);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(key: &str) -> OutboxMessageInsert {
        OutboxMessageInsert {
            routing_key: key.to_string(),
            payload: key.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_mark_processed_keeps_first_timestamp() {
        let outbox = MemoryOutbox::new();
        let id = outbox.enqueue(insert("a")).await;

        outbox.mark_processed(id).await.unwrap();
        let first = outbox.rows().await[0].processed_at;
        outbox.mark_processed(id).await.unwrap();

        assert!(first.is_some());
        assert_eq!(outbox.rows().await[0].processed_at, first);
        assert_eq!(outbox.unprocessed_count().await, 0);
    }

    #[tokio::test]
    async fn test_fetch_skips_processed_and_caps() {
        let outbox = MemoryOutbox::new();
        for key in ["a", "b", "c"] {
            outbox.enqueue(insert(key)).await;
        }
        outbox.mark_processed(1).await.unwrap();

        let pending = outbox.fetch_unprocessed(1).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].routing_key, "b");
    }
}

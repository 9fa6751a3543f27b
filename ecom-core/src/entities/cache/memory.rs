//! In-memory read model for testing projectors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ecom_sdk::events::IntegrationEvent;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ReadModelWriter;

/// Stores the last applied event per entity id.
pub struct MemoryReadModel<E> {
    rows: RwLock<HashMap<Uuid, E>>,
    writes: RwLock<usize>,
    fail_upserts: AtomicBool,
    delay: RwLock<Option<Duration>>,
}

impl<E> Default for MemoryReadModel<E> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            writes: RwLock::new(0),
            fail_upserts: AtomicBool::new(false),
            delay: RwLock::new(None),
        }
    }
}

impl<E: Clone> MemoryReadModel<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Make every upsert sleep before writing.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    pub async fn get(&self, id: Uuid) -> Option<E> {
        self.rows.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Number of upserts applied, including overwrites.
    pub async fn writes(&self) -> usize {
        *self.writes.read().await
    }
}

#[async_trait]
impl<E> ReadModelWriter<E> for MemoryReadModel<E>
where
    E: IntegrationEvent + Clone + Sync,
{
    async fn upsert(&self, event: E) -> Result<(), sqlx::Error> {
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        self.rows.write().await.insert(event.entity_id(), event);
        *self.writes.write().await += 1;
        Ok(())
    }
}

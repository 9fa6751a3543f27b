//! Outbox relay.
//!
//! Every interval the relay reads the oldest unprocessed outbox rows,
//! publishes each one under its routing key and marks it processed. A row
//! whose publish or mark fails stays pending and is retried on a later
//! tick, so a row may be published more than once.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::config::{ConfigStore, RelayConfig};
use crate::entities::outbox::OutboxStore;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to read outbox: {0}")]
    Store(#[from] sqlx::Error),
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayTickReport {
    pub fetched: usize,
    pub published: usize,
    pub failed: usize,
}

pub struct Relay<S> {
    service: &'static str,
    store: S,
    bus: Arc<dyn EventBus>,
    config: ConfigStore<RelayConfig>,
}

impl<S: OutboxStore> Relay<S> {
    /// `service` only labels log lines.
    pub fn new(
        service: &'static str,
        store: S,
        bus: Arc<dyn EventBus>,
        config: ConfigStore<RelayConfig>,
    ) -> Self {
        Self {
            service,
            store,
            bus,
            config,
        }
    }

    /// Run one pass over the outbox.
    ///
    /// Rows are published in pickup order. A failed row is logged and
    /// skipped; the rest of the batch still goes out. Only a failure to
    /// read the outbox fails the tick.
    pub async fn tick(&self) -> Result<RelayTickReport, RelayError> {
        let RelayConfig { batch_limit, .. } = self.config.snapshot().await;
        let rows = self.store.fetch_unprocessed(batch_limit).await?;
        let mut report = RelayTickReport {
            fetched: rows.len(),
            ..Default::default()
        };

        for row in rows {
            if let Err(e) = self.bus.publish(&row.routing_key, &row.payload).await {
                warn!(
                    service = self.service,
                    outbox_id = row.id,
                    routing_key = %row.routing_key,
                    error = %e,
                    "Failed to publish outbox message, will retry"
                );
                report.failed += 1;
                continue;
            }

            if let Err(e) = self.store.mark_processed(row.id).await {
                // Already published; it goes out again next tick.
                warn!(
                    service = self.service,
                    outbox_id = row.id,
                    error = %e,
                    "Failed to mark outbox message processed"
                );
                report.failed += 1;
                continue;
            }

            debug!(
                service = self.service,
                outbox_id = row.id,
                routing_key = %row.routing_key,
                "Relayed outbox message"
            );
            report.published += 1;
        }

        Ok(report)
    }

    /// Tick on the configured interval until shutdown.
    ///
    /// A change to the relay config restarts the interval with the new
    /// period; the batch limit is re-read on every tick.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(service = self.service, "Relay started");

        let mut watcher = self.config.subscribe();
        let mut interval = self.interval().await;

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(service = self.service, "Relay received shutdown signal");
                        break;
                    }
                }

                Ok(()) = watcher.changed() => {
                    interval = self.interval().await;
                    info!(
                        service = self.service,
                        period_ms = interval.period().as_millis() as u64,
                        "Relay config reloaded"
                    );
                }

                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) if report.fetched > 0 => {
                            info!(
                                service = self.service,
                                fetched = report.fetched,
                                published = report.published,
                                failed = report.failed,
                                "Relay tick"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(service = self.service, error = %e, "Relay tick failed");
                        }
                    }
                }
            }
        }

        info!(service = self.service, "Relay shutdown complete");
    }

    async fn interval(&self) -> Interval {
        let RelayConfig { interval, .. } = self.config.snapshot().await;
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryEventBus;
    use crate::entities::outbox::{MemoryOutbox, OutboxMessageInsert};
    use std::time::Duration;

    struct Harness {
        outbox: Arc<MemoryOutbox>,
        bus: Arc<MemoryEventBus>,
        config: ConfigStore<RelayConfig>,
    }

    impl Harness {
        fn new(batch_limit: usize) -> Self {
            Self {
                outbox: Arc::new(MemoryOutbox::new()),
                bus: Arc::new(MemoryEventBus::new()),
                config: ConfigStore::new(RelayConfig {
                    interval: Duration::from_secs(2),
                    batch_limit,
                }),
            }
        }

        fn relay(&self) -> Relay<Arc<MemoryOutbox>> {
            Relay::new(
                "test",
                self.outbox.clone(),
                self.bus.clone(),
                self.config.clone(),
            )
        }

        async fn enqueue(&self, key: &str, body: &str) -> i64 {
            self.outbox
                .enqueue(OutboxMessageInsert {
                    routing_key: key.to_string(),
                    payload: body.as_bytes().to_vec(),
                })
                .await
        }

        async fn published_bodies(&self) -> Vec<String> {
            self.bus
                .take_published()
                .await
                .into_iter()
                .map(|(_, body)| String::from_utf8(body).unwrap())
                .collect()
        }
    }

    #[tokio::test]
    async fn test_tick_publishes_in_order_and_marks() {
        let h = Harness::new(10);
        for body in ["m1", "m2", "m3"] {
            h.enqueue("product.upserted", body).await;
        }

        let report = h.relay().tick().await.unwrap();

        assert_eq!(
            report,
            RelayTickReport {
                fetched: 3,
                published: 3,
                failed: 0
            }
        );
        assert_eq!(h.published_bodies().await, vec!["m1", "m2", "m3"]);
        assert_eq!(h.outbox.unprocessed_count().await, 0);
    }

    #[tokio::test]
    async fn test_tick_respects_batch_limit_across_ticks() {
        let h = Harness::new(10);
        for i in 0..25 {
            h.enqueue("product.upserted", &format!("m{i:02}")).await;
        }
        let relay = h.relay();

        relay.tick().await.unwrap();
        assert_eq!(h.outbox.unprocessed_count().await, 15);

        relay.tick().await.unwrap();
        relay.tick().await.unwrap();
        assert_eq!(h.outbox.unprocessed_count().await, 0);

        let expected: Vec<String> = (0..25).map(|i| format!("m{i:02}")).collect();
        assert_eq!(h.published_bodies().await, expected);
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_row_and_continues() {
        let h = Harness::new(10);
        let bad = h.enqueue("customer.upserted", "bad").await;
        h.enqueue("product.upserted", "good").await;
        h.bus.fail_routing_key("customer.upserted").await;

        let report = h.relay().tick().await.unwrap();

        assert_eq!(report.published, 1);
        assert_eq!(report.failed, 1);
        let rows = h.outbox.rows().await;
        let bad_row = rows.iter().find(|r| r.id == bad).unwrap();
        assert!(bad_row.processed_at.is_none());
        assert_eq!(h.outbox.unprocessed_count().await, 1);
    }

    #[tokio::test]
    async fn test_read_failure_aborts_tick() {
        let h = Harness::new(10);
        h.enqueue("product.upserted", "m1").await;
        h.outbox.set_fail_reads(true);

        assert!(matches!(h.relay().tick().await, Err(RelayError::Store(_))));
        assert_eq!(h.bus.published_count().await, 0);

        h.outbox.set_fail_reads(false);
        assert_eq!(h.relay().tick().await.unwrap().published, 1);
    }

    #[tokio::test]
    async fn test_failed_mark_republishes_next_tick() {
        let h = Harness::new(10);
        h.enqueue("product.upserted", "m1").await;
        let relay = h.relay();

        h.outbox.set_fail_marks(true);
        let report = relay.tick().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(h.outbox.unprocessed_count().await, 1);

        h.outbox.set_fail_marks(false);
        relay.tick().await.unwrap();

        assert_eq!(h.published_bodies().await, vec!["m1", "m1"]);
        assert_eq!(h.outbox.unprocessed_count().await, 0);
    }

    #[tokio::test]
    async fn test_restart_after_unmarked_publish_is_tolerated_downstream() {
        use crate::entities::cache::MemoryReadModel;
        use crate::processors::{DeliveryOutcome, Projector};
        use ecom_sdk::events::{IntegrationEvent, ProductUpserted};
        use futures_util::StreamExt;

        let h = Harness::new(10);
        let cache = Arc::new(MemoryReadModel::<ProductUpserted>::new());
        let mut deliveries = h
            .bus
            .consume("orders.products_cache", &[ProductUpserted::ROUTING_KEY])
            .await
            .unwrap();
        let projector = Projector::new(
            "orders.products_cache",
            h.bus.clone(),
            cache.clone(),
            crate::config::ProjectorConfig::default(),
        );

        let event = ProductUpserted {
            id: uuid::Uuid::now_v7(),
            title: "Widget".to_string(),
            sku: "W-1".to_string(),
            price: 1299,
            updated_at: time::OffsetDateTime::now_utc(),
        };
        h.outbox
            .enqueue(OutboxMessageInsert::from_event(&event).unwrap())
            .await;

        // Published, but the process dies before the row is marked.
        h.outbox.set_fail_marks(true);
        h.relay().tick().await.unwrap();
        assert_eq!(h.outbox.unprocessed_count().await, 1);

        // A fresh relay after restart picks the row up again.
        h.outbox.set_fail_marks(false);
        let report = h.relay().tick().await.unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(h.outbox.unprocessed_count().await, 0);
        assert_eq!(h.bus.published_count().await, 2);

        for _ in 0..2 {
            let delivery = deliveries.next().await.unwrap().unwrap();
            assert_eq!(
                projector.handle_delivery(delivery).await.unwrap(),
                DeliveryOutcome::Acked
            );
        }
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(event.id).await, Some(event));
    }

    #[tokio::test]
    async fn test_batch_limit_is_reloadable() {
        let h = Harness::new(1);
        for body in ["a", "b", "c"] {
            h.enqueue("product.upserted", body).await;
        }
        let relay = h.relay();

        assert_eq!(relay.tick().await.unwrap().published, 1);
        h.config
            .update(RelayConfig {
                interval: Duration::from_secs(2),
                batch_limit: 5,
            })
            .await;
        assert_eq!(relay.tick().await.unwrap().published, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown() {
        let h = Harness::new(10);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(h.relay().run(shutdown_rx));

        h.enqueue("product.upserted", "m1").await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(h.bus.published_count().await, 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}

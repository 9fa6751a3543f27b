//! Read-model projector.
//!
//! Consumes one event type from a durable queue and upserts each event into
//! a local cache:
//! - undecodable body: dropped (nack without requeue), logged
//! - upsert failed or timed out: nack with requeue
//! - upsert succeeded: ack

use std::marker::PhantomData;
use std::sync::Arc;

use ecom_sdk::events::IntegrationEvent;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bus::{BusError, Delivery, EventBus};
use crate::config::ProjectorConfig;
use crate::entities::cache::ReadModelWriter;

#[derive(Debug, Error)]
pub enum ProjectorError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("delivery stream for queue {queue} ended")]
    StreamEnded { queue: String },
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Applied and acknowledged.
    Acked,
    /// Could not be decoded; dropped.
    Discarded,
    /// Upsert failed; handed back to the broker.
    Requeued,
}

pub struct Projector<E, W> {
    queue: String,
    bus: Arc<dyn EventBus>,
    writer: W,
    config: ProjectorConfig,
    _event: PhantomData<fn() -> E>,
}

impl<E, W> Projector<E, W>
where
    E: IntegrationEvent,
    W: ReadModelWriter<E>,
{
    pub fn new(
        queue: impl Into<String>,
        bus: Arc<dyn EventBus>,
        writer: W,
        config: ProjectorConfig,
    ) -> Self {
        Self {
            queue: queue.into(),
            bus,
            writer,
            config,
            _event: PhantomData,
        }
    }

    /// Decode, apply and settle one delivery.
    ///
    /// Only a failure to settle with the broker is returned as an error.
    pub async fn handle_delivery(&self, delivery: Delivery) -> Result<DeliveryOutcome, BusError> {
        let event = match E::decode(&delivery.body) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    queue = %self.queue,
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "Discarding undecodable message"
                );
                delivery.nack(false).await?;
                return Ok(DeliveryOutcome::Discarded);
            }
        };

        let entity_id = event.entity_id();
        let deadline = self.config.upsert_timeout;
        match tokio::time::timeout(deadline, self.writer.upsert(event)).await {
            Ok(Ok(())) => {
                delivery.ack().await?;
                debug!(queue = %self.queue, %entity_id, "Projected event");
                Ok(DeliveryOutcome::Acked)
            }
            Ok(Err(e)) => {
                warn!(queue = %self.queue, %entity_id, error = %e, "Upsert failed, requeueing");
                delivery.nack(true).await?;
                Ok(DeliveryOutcome::Requeued)
            }
            Err(_) => {
                warn!(
                    queue = %self.queue,
                    %entity_id,
                    timeout_ms = deadline.as_millis() as u64,
                    "Upsert timed out, requeueing"
                );
                delivery.nack(true).await?;
                Ok(DeliveryOutcome::Requeued)
            }
        }
    }

    /// Consume until shutdown.
    ///
    /// Fails if the queue cannot be set up or the delivery stream breaks;
    /// both mean the broker connection is gone.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), ProjectorError> {
        let mut deliveries = self.bus.consume(&self.queue, &[E::ROUTING_KEY]).await?;
        info!(queue = %self.queue, routing_key = E::ROUTING_KEY, "Projector started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(queue = %self.queue, "Projector received shutdown signal");
                        break;
                    }
                }

                next = deliveries.next() => {
                    match next {
                        Some(Ok(delivery)) => {
                            if let Err(e) = self.handle_delivery(delivery).await {
                                error!(queue = %self.queue, error = %e, "Failed to settle delivery");
                            }
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            return Err(ProjectorError::StreamEnded {
                                queue: self.queue.clone(),
                            });
                        }
                    }
                }
            }
        }

        info!(queue = %self.queue, "Projector shutdown complete");
        Ok(())
    }
}

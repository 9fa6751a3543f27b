//! Topic-based publish/subscribe over a durable broker.
//!
//! This module contains:
//! - `EventBus` trait: publish under a routing key, consume a queue
//! - `Delivery`: one received message, settled exactly once by ack or nack
//! - Implementations: AMQP (RabbitMQ) and an in-memory exchange for tests
//!
//! A bus handle is built once at startup and passed to every publisher and
//! consumer task. Nothing reaches it through global state.

pub mod amqp;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod topic;

pub use amqp::{AmqpConfig, AmqpEventBus, DEFAULT_PREFETCH, DEFAULT_PUBLISH_TIMEOUT};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryEventBus;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::time::Duration;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("declaration failed: {0}")]
    Declare(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("publish did not complete within {0:?}")]
    PublishTimeout(Duration),

    #[error("consume failed: {0}")]
    Consume(String),

    #[error("acknowledgement failed: {0}")]
    Ack(String),

    #[error("bus is closed")]
    Closed,
}

/// Settles a delivery with the broker.
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self) -> Result<()>;

    async fn nack(&self, requeue: bool) -> Result<()>;
}

/// A message received from a queue.
///
/// Must be settled with [`ack`](Delivery::ack) or [`nack`](Delivery::nack).
/// A delivery that is never settled is redelivered by the broker once the
/// consumer goes away.
pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
    /// Whether the broker has handed this message out before.
    pub redelivered: bool,
    acker: Box<dyn DeliveryAcker>,
}

impl Delivery {
    pub fn new(
        routing_key: impl Into<String>,
        body: Vec<u8>,
        redelivered: bool,
        acker: Box<dyn DeliveryAcker>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            body,
            redelivered,
            acker,
        }
    }

    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    /// Negative-acknowledge. With `requeue` the broker redelivers the
    /// message, otherwise it is dropped.
    pub async fn nack(self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

/// Lazy, effectively infinite sequence of deliveries from one queue.
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

/// Interface for publishing to and consuming from the domain exchange.
///
/// Implementations:
/// - `AmqpEventBus`: RabbitMQ via AMQP
/// - `MemoryEventBus`: in-process exchange for tests
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a persistent message under `routing_key`.
    ///
    /// Fails if the message cannot be handed to the broker within the
    /// configured deadline. Never retries.
    async fn publish(&self, routing_key: &str, body: &[u8]) -> Result<()>;

    /// Declare (or attach to) a durable queue, bind it to every routing key
    /// on the domain exchange and start consuming with manual acks.
    async fn consume(&self, queue: &str, routing_keys: &[&str]) -> Result<DeliveryStream>;
}

//! In-process topic exchange for testing.
//!
//! Queues are durable for the life of the bus: messages published before
//! anyone consumes are kept, and a nack with requeue puts the message back
//! at the head of its queue marked as redelivered.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{Mutex, Notify, RwLock};

use super::topic::topic_matches;
use super::{BusError, Delivery, DeliveryAcker, DeliveryStream, EventBus, Result};

#[derive(Clone, Debug)]
struct StoredMessage {
    routing_key: String,
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct MemoryQueue {
    messages: Mutex<VecDeque<StoredMessage>>,
    notify: Notify,
    acked: AtomicUsize,
    requeued: AtomicUsize,
    discarded: AtomicUsize,
}

impl MemoryQueue {
    async fn push_back(&self, message: StoredMessage) {
        self.messages.lock().await.push_back(message);
        self.notify.notify_one();
    }

    async fn push_front(&self, message: StoredMessage) {
        self.messages.lock().await.push_front(message);
        self.notify.notify_one();
    }

    async fn next(self: Arc<Self>) -> StoredMessage {
        loop {
            if let Some(message) = self.messages.lock().await.pop_front() {
                return message;
            }
            self.notify.notified().await;
        }
    }
}

/// Counts of how deliveries from one queue were settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub acked: usize,
    pub requeued: usize,
    pub discarded: usize,
}

/// In-memory event bus with topic routing.
#[derive(Default)]
pub struct MemoryEventBus {
    queues: RwLock<HashMap<String, Arc<MemoryQueue>>>,
    bindings: RwLock<Vec<(String, String)>>,
    published: RwLock<Vec<(String, Vec<u8>)>>,
    fail_on_publish: RwLock<bool>,
    failing_keys: RwLock<HashSet<String>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    /// Make publishes under one routing key fail.
    pub async fn fail_routing_key(&self, routing_key: &str) {
        self.failing_keys
            .write()
            .await
            .insert(routing_key.to_string());
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn take_published(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.published.write().await)
    }

    pub async fn queue_stats(&self, queue: &str) -> QueueStats {
        let Some(q) = self.queues.read().await.get(queue).cloned() else {
            return QueueStats::default();
        };
        let pending = q.messages.lock().await.len();
        QueueStats {
            pending,
            acked: q.acked.load(Ordering::SeqCst),
            requeued: q.requeued.load(Ordering::SeqCst),
            discarded: q.discarded.load(Ordering::SeqCst),
        }
    }

    async fn declare(&self, queue: &str) -> Arc<MemoryQueue> {
        self.queues
            .write()
            .await
            .entry(queue.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, routing_key: &str, body: &[u8]) -> Result<()> {
        if *self.fail_on_publish.read().await || self.failing_keys.read().await.contains(routing_key)
        {
            return Err(BusError::Publish("memory bus publish failure".to_string()));
        }
        self.published
            .write()
            .await
            .push((routing_key.to_string(), body.to_vec()));

        let targets: HashSet<String> = self
            .bindings
            .read()
            .await
            .iter()
            .filter(|(_, pattern)| topic_matches(pattern, routing_key))
            .map(|(queue, _)| queue.clone())
            .collect();

        let queues = self.queues.read().await;
        for name in targets {
            if let Some(queue) = queues.get(&name) {
                queue
                    .push_back(StoredMessage {
                        routing_key: routing_key.to_string(),
                        body: body.to_vec(),
                        redelivered: false,
                    })
                    .await;
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, routing_keys: &[&str]) -> Result<DeliveryStream> {
        let q = self.declare(queue).await;
        {
            let mut bindings = self.bindings.write().await;
            for key in routing_keys {
                let binding = (queue.to_string(), key.to_string());
                if !bindings.contains(&binding) {
                    bindings.push(binding);
                }
            }
        }

        let stream = futures_util::stream::unfold(q, |q| async move {
            let message = q.clone().next().await;
            let delivery = Delivery::new(
                message.routing_key.clone(),
                message.body.clone(),
                message.redelivered,
                Box::new(MemoryAcker {
                    queue: q.clone(),
                    message,
                }),
            );
            Some((Ok(delivery), q))
        });
        Ok(stream.boxed())
    }
}

struct MemoryAcker {
    queue: Arc<MemoryQueue>,
    message: StoredMessage,
}

#[async_trait]
impl DeliveryAcker for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        self.queue.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        if requeue {
            self.queue.requeued.fetch_add(1, Ordering::SeqCst);
            let mut message = self.message.clone();
            message.redelivered = true;
            self.queue.push_front(message).await;
        } else {
            self.queue.discarded.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routes_by_binding() {
        let bus = MemoryEventBus::new();
        let mut products = bus.consume("products", &["product.*"]).await.unwrap();
        let _customers = bus.consume("customers", &["customer.upserted"]).await.unwrap();

        bus.publish("product.upserted", b"p1").await.unwrap();

        let delivery = products.next().await.unwrap().unwrap();
        assert_eq!(delivery.routing_key, "product.upserted");
        assert_eq!(delivery.body, b"p1");
        assert!(!delivery.redelivered);
        delivery.ack().await.unwrap();

        assert_eq!(bus.queue_stats("products").await.acked, 1);
        assert_eq!(bus.queue_stats("customers").await.pending, 0);
    }

    #[tokio::test]
    async fn test_nack_requeue_redelivers() {
        let bus = MemoryEventBus::new();
        let mut stream = bus.consume("q", &["#"]).await.unwrap();
        bus.publish("a.b", b"x").await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        first.nack(true).await.unwrap();

        let second = stream.next().await.unwrap().unwrap();
        assert!(second.redelivered);
        assert_eq!(second.body, b"x");
        second.nack(false).await.unwrap();

        let stats = bus.queue_stats("q").await;
        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_messages_wait_in_declared_queue() {
        let bus = MemoryEventBus::new();
        drop(bus.consume("q", &["k"]).await.unwrap());
        bus.publish("k", b"1").await.unwrap();
        bus.publish("k", b"2").await.unwrap();

        let mut stream = bus.consume("q", &["k"]).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().body, b"1");
        assert_eq!(stream.next().await.unwrap().unwrap().body, b"2");
    }

    #[tokio::test]
    async fn test_fail_on_publish() {
        let bus = MemoryEventBus::new();
        bus.fail_routing_key("bad.key").await;
        assert!(bus.publish("bad.key", b"").await.is_err());
        assert!(bus.publish("good.key", b"").await.is_ok());

        bus.set_fail_on_publish(true).await;
        assert!(matches!(
            bus.publish("good.key", b"").await,
            Err(BusError::Publish(_))
        ));
        assert_eq!(bus.published_count().await, 1);
    }
}

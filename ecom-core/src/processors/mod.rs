//! Background workers.
//!
//! - `Relay`: drains a producing service's outbox to the bus
//! - `Projector`: applies one event type from a queue to a local read model
//!
//! Both take a `watch::Receiver<bool>` in `run` and stop at their next
//! suspension point once it flips to `true`. Work in flight is abandoned and
//! picked up again through at-least-once delivery.

pub mod projector;
pub mod relay;

pub use projector::{DeliveryOutcome, Projector, ProjectorError};
pub use relay::{Relay, RelayError, RelayTickReport};

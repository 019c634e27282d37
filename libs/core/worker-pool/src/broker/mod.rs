//! Broker abstraction over a persistent publish/subscribe stream.
//!
//! Two implementations ship with the crate:
//!
//! - [`JetStreamBroker`]: NATS JetStream push consumer with explicit acks
//! - [`MemoryBroker`]: in-process fake with the same redelivery contract,
//!   for tests and local runs

mod delivery;
mod envelope;
mod jetstream;
mod memory;

pub use envelope::{Acknowledge, Deliveries, Envelope};
pub use jetstream::JetStreamBroker;
pub use memory::{MemoryBroker, MemoryBrokerConfig};

use crate::error::BrokerError;
use async_trait::async_trait;

/// A stream the pool consumes from and publishes results to.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Establish delivery.
    ///
    /// Fails if the subscription cannot be created. A broker holds one
    /// subscription at a time; subscribing again before `shutdown` returns
    /// [`BrokerError::AlreadySubscribed`].
    async fn subscribe(&self) -> Result<Deliveries, BrokerError>;

    /// Publish a payload to the produce subject.
    ///
    /// Failures are reported, never retried.
    async fn publish(&self, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Unsubscribe, drain, and close the delivery channel.
    ///
    /// Returns once the delivery routine has exited. Calling it again, or
    /// without an active subscription, does nothing.
    async fn shutdown(&self);
}

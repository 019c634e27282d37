//! Delivered messages and the shared delivery channel.

use crate::error::BrokerError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Transport-side acknowledgement capability of a delivered message.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Acknowledge the message; the stream will not redeliver it.
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Reset the redelivery timer without acknowledging.
    ///
    /// Transports without such a capability keep the default no-op.
    async fn in_progress(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// A message delivered by a broker.
///
/// Owned by the worker that received it. Dropping an envelope without
/// acknowledging it leaves the message to the stream's redelivery timer.
pub struct Envelope {
    payload: Vec<u8>,
    delivery_count: u32,
    acknowledger: Box<dyn Acknowledge>,
    acked: bool,
}

impl Envelope {
    /// Create an envelope for a first delivery.
    pub fn new(payload: Vec<u8>, acknowledger: impl Acknowledge + 'static) -> Self {
        Self {
            payload,
            delivery_count: 1,
            acknowledger: Box::new(acknowledger),
            acked: false,
        }
    }

    /// Set how many times this message has been delivered, this delivery included.
    pub fn with_delivery_count(mut self, delivery_count: u32) -> Self {
        self.delivery_count = delivery_count.max(1);
        self
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    /// Check if this is a redelivery.
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }

    pub fn is_acked(&self) -> bool {
        self.acked
    }

    /// Acknowledge the message.
    ///
    /// Only the first successful call reaches the transport; later calls
    /// return `Ok(())` without doing anything.
    pub async fn ack(&mut self) -> Result<(), BrokerError> {
        if self.acked {
            return Ok(());
        }

        self.acknowledger.ack().await?;
        self.acked = true;
        Ok(())
    }

    /// Extend the ack deadline of an unacknowledged message.
    pub async fn in_progress(&self) -> Result<(), BrokerError> {
        if self.acked {
            return Ok(());
        }

        self.acknowledger.in_progress().await
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("payload_len", &self.payload.len())
            .field("delivery_count", &self.delivery_count)
            .field("acked", &self.acked)
            .finish()
    }
}

/// Receiving side of a broker's delivery channel.
///
/// Cloned once per worker; every envelope goes to exactly one clone.
#[derive(Clone)]
pub struct Deliveries {
    receiver: Arc<Mutex<mpsc::Receiver<Envelope>>>,
}

impl Deliveries {
    /// Create a delivery channel with the given capacity.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Envelope>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let deliveries = Self {
            receiver: Arc::new(Mutex::new(receiver)),
        };
        (sender, deliveries)
    }

    /// Wait for the next envelope.
    ///
    /// Returns `None` once the broker has closed the channel and every
    /// buffered envelope has been taken.
    pub async fn recv(&self) -> Option<Envelope> {
        self.receiver.lock().await.recv().await
    }
}

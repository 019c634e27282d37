//! In-process broker with JetStream-like redelivery.
//!
//! Every delivery starts an ack-wait timer on `tokio::time`, so tests running
//! with a paused clock see redeliveries without real waiting.

use super::delivery::{DeliverySource, SubscriptionSlot};
use super::envelope::{Acknowledge, Deliveries, Envelope};
use super::Broker;
use crate::config::{
    SubscriptionConfig, DEFAULT_ACK_WAIT, DEFAULT_MAX_REDELIVERIES, DEFAULT_RECEIVE_CAPACITY,
};
use crate::error::BrokerError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Settings for [`MemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBrokerConfig {
    pub ack_wait: Duration,
    pub max_redeliveries: u32,
    pub receive_capacity: usize,
}

impl Default for MemoryBrokerConfig {
    fn default() -> Self {
        Self {
            ack_wait: DEFAULT_ACK_WAIT,
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
            receive_capacity: DEFAULT_RECEIVE_CAPACITY,
        }
    }
}

impl From<&SubscriptionConfig> for MemoryBrokerConfig {
    fn from(config: &SubscriptionConfig) -> Self {
        let config = config.clone().normalized();
        Self {
            ack_wait: config.ack_wait,
            max_redeliveries: config.max_redeliveries,
            receive_capacity: config.receive_capacity,
        }
    }
}

#[derive(Debug)]
struct Record {
    payload: Vec<u8>,
    deliveries: u32,
    acks: u32,
    acked: bool,
    dead: bool,
    deadline: Instant,
}

#[derive(Default)]
struct Ledger {
    next_id: u64,
    records: HashMap<u64, Record>,
    published: Vec<Vec<u8>>,
}

struct Shared {
    config: MemoryBrokerConfig,
    ledger: Mutex<Ledger>,
    ready: mpsc::UnboundedSender<u64>,
    ready_rx: Mutex<Option<mpsc::UnboundedReceiver<u64>>>,
    fail_subscribe: AtomicBool,
    fail_publish: AtomicBool,
}

impl Shared {
    fn requeue(&self, id: u64) {
        // Only fails if the source was dropped without being closed.
        let _ = self.ready.send(id);
    }
}

/// Broker keeping messages in memory.
///
/// Messages are enqueued by id. A delivery not acknowledged within the ack
/// wait is redelivered while it has redeliveries left and is marked dead after
/// that. Inspectors expose per-message delivery and ack counts.
pub struct MemoryBroker {
    shared: Arc<Shared>,
    slot: SubscriptionSlot,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(MemoryBrokerConfig::default())
    }
}

impl MemoryBroker {
    /// Create a broker. Zero values in `config` fall back to defaults.
    pub fn new(mut config: MemoryBrokerConfig) -> Self {
        if config.ack_wait.is_zero() {
            config.ack_wait = DEFAULT_ACK_WAIT;
        }
        if config.max_redeliveries == 0 {
            config.max_redeliveries = DEFAULT_MAX_REDELIVERIES;
        }
        if config.receive_capacity == 0 {
            config.receive_capacity = DEFAULT_RECEIVE_CAPACITY;
        }

        let (ready, ready_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                config,
                ledger: Mutex::new(Ledger::default()),
                ready,
                ready_rx: Mutex::new(Some(ready_rx)),
                fail_subscribe: AtomicBool::new(false),
                fail_publish: AtomicBool::new(false),
            }),
            slot: SubscriptionSlot::new(),
        }
    }

    pub fn config(&self) -> &MemoryBrokerConfig {
        &self.shared.config
    }

    /// Add a message to the stream and return its id.
    pub fn enqueue(&self, payload: impl Into<Vec<u8>>) -> u64 {
        let id = {
            let mut ledger = self.shared.ledger.lock();
            let id = ledger.next_id;
            ledger.next_id += 1;
            ledger.records.insert(
                id,
                Record {
                    payload: payload.into(),
                    deliveries: 0,
                    acks: 0,
                    acked: false,
                    dead: false,
                    deadline: Instant::now(),
                },
            );
            id
        };

        self.shared.requeue(id);
        id
    }

    /// How many times message `id` has been delivered.
    pub fn deliveries(&self, id: u64) -> u32 {
        self.record(id, |record| record.deliveries)
    }

    /// How many acks reached the broker for message `id`.
    pub fn acks(&self, id: u64) -> u32 {
        self.record(id, |record| record.acks)
    }

    pub fn is_acked(&self, id: u64) -> bool {
        self.record(id, |record| record.acked)
    }

    /// Check if message `id` ran out of redeliveries.
    pub fn is_dead(&self, id: u64) -> bool {
        self.record(id, |record| record.dead)
    }

    /// Messages that are neither acknowledged nor dead.
    pub fn outstanding(&self) -> usize {
        self.shared
            .ledger
            .lock()
            .records
            .values()
            .filter(|record| !record.acked && !record.dead)
            .count()
    }

    /// Payloads published so far, in publish order.
    pub fn published(&self) -> Vec<Vec<u8>> {
        self.shared.ledger.lock().published.clone()
    }

    /// Make subsequent `subscribe` calls fail.
    pub fn fail_subscribe(&self, fail: bool) {
        self.shared.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `publish` calls fail.
    pub fn fail_publish(&self, fail: bool) {
        self.shared.fail_publish.store(fail, Ordering::SeqCst);
    }

    fn record<T: Default>(&self, id: u64, f: impl FnOnce(&Record) -> T) -> T {
        self.shared
            .ledger
            .lock()
            .records
            .get(&id)
            .map(f)
            .unwrap_or_default()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(&self) -> Result<Deliveries, BrokerError> {
        if self.shared.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BrokerError::subscribe("subscription refused"));
        }

        self.slot.reserve()?;

        let Some(ready) = self.shared.ready_rx.lock().take() else {
            self.slot.release();
            return Err(BrokerError::AlreadySubscribed);
        };

        let source = MemorySource {
            shared: self.shared.clone(),
            ready: Some(ready),
        };
        Ok(self.slot.activate(source, self.shared.config.receive_capacity))
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), BrokerError> {
        if self.shared.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::publish("publish refused"));
        }

        self.shared.ledger.lock().published.push(payload);
        Ok(())
    }

    async fn shutdown(&self) {
        self.slot.shutdown().await;
    }
}

struct MemorySource {
    shared: Arc<Shared>,
    ready: Option<mpsc::UnboundedReceiver<u64>>,
}

#[async_trait]
impl DeliverySource for MemorySource {
    async fn next(&mut self) -> Option<Envelope> {
        let ready = self.ready.as_mut()?;

        loop {
            let id = ready.recv().await?;

            let mut ledger = self.shared.ledger.lock();
            let Some(record) = ledger.records.get_mut(&id) else {
                continue;
            };
            if record.acked || record.dead {
                continue;
            }

            record.deliveries += 1;
            record.deadline = Instant::now() + self.shared.config.ack_wait;
            let delivery = record.deliveries;
            let payload = record.payload.clone();
            drop(ledger);

            tokio::spawn(watch_deadline(self.shared.clone(), id, delivery));

            let ack = MemoryAck {
                shared: self.shared.clone(),
                id,
                delivery,
            };
            return Some(Envelope::new(payload, ack).with_delivery_count(delivery));
        }
    }

    async fn close(&mut self) {
        // Hand the queue back so the broker can be subscribed again.
        if let Some(ready) = self.ready.take() {
            *self.shared.ready_rx.lock() = Some(ready);
        }
    }
}

/// Redeliver or kill delivery `delivery` of message `id` once its deadline passes.
async fn watch_deadline(shared: Arc<Shared>, id: u64, delivery: u32) {
    let mut deadline = Instant::now() + shared.config.ack_wait;

    loop {
        tokio::time::sleep_until(deadline).await;

        let mut ledger = shared.ledger.lock();
        let Some(record) = ledger.records.get_mut(&id) else {
            return;
        };
        if record.acked || record.dead || record.deliveries != delivery {
            return;
        }
        if record.deadline > Instant::now() {
            deadline = record.deadline;
            continue;
        }

        if record.deliveries <= shared.config.max_redeliveries {
            debug!(id, delivery, "Ack wait elapsed, redelivering");
            drop(ledger);
            shared.requeue(id);
        } else {
            debug!(id, delivery, "Redeliveries exhausted");
            record.dead = true;
        }
        return;
    }
}

struct MemoryAck {
    shared: Arc<Shared>,
    id: u64,
    delivery: u32,
}

#[async_trait]
impl Acknowledge for MemoryAck {
    async fn ack(&self) -> Result<(), BrokerError> {
        let mut ledger = self.shared.ledger.lock();
        let record = ledger
            .records
            .get_mut(&self.id)
            .ok_or_else(|| BrokerError::ack(format!("unknown message {}", self.id)))?;

        // Too late: the stream already gave up on this message.
        if record.dead {
            debug!(id = self.id, delivery = self.delivery, "Ack after message was marked dead");
            return Ok(());
        }

        record.acks += 1;
        record.acked = true;
        Ok(())
    }

    async fn in_progress(&self) -> Result<(), BrokerError> {
        let mut ledger = self.shared.ledger.lock();
        let record = ledger
            .records
            .get_mut(&self.id)
            .ok_or_else(|| BrokerError::in_progress(format!("unknown message {}", self.id)))?;

        if record.deliveries == self.delivery && !record.acked {
            record.deadline = Instant::now() + self.shared.config.ack_wait;
        }
        Ok(())
    }
}

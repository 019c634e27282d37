//! Dedicated delivery routine shared by broker implementations.
//!
//! A transport plugs in as a [`DeliverySource`]. The routine pulls from it
//! into a bounded buffer and forwards envelopes one at a time on the outward
//! channel, so a stop request is never stuck behind a full channel.

use super::envelope::{Deliveries, Envelope};
use crate::error::BrokerError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the channel workers read from.
const OUTWARD_CAPACITY: usize = 1;

/// Transport side of a subscription.
#[async_trait]
pub(crate) trait DeliverySource: Send + 'static {
    /// Next delivered message, `None` once the transport has nothing more to give.
    ///
    /// Must be cancel safe.
    async fn next(&mut self) -> Option<Envelope>;

    /// Unsubscribe and drain.
    async fn close(&mut self);
}

/// A running delivery routine.
pub(crate) struct Subscription {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Spawn the delivery routine for `source`.
    pub(crate) fn spawn<S: DeliverySource>(source: S, capacity: usize) -> (Self, Deliveries) {
        let (sender, deliveries) = Deliveries::channel(OUTWARD_CAPACITY);
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(deliver(source, sender, capacity.max(1), stop_rx));

        (Self { stop, handle }, deliveries)
    }

    /// Ask the routine to stop and wait until it has exited.
    pub(crate) async fn stop(self) {
        self.stop.send_replace(true);

        if let Err(e) = self.handle.await {
            warn!(error = %e, "Delivery routine panicked");
        }
    }
}

enum SlotState {
    Idle,
    Starting,
    Active(Subscription),
}

/// The single subscription a broker may hold at a time.
pub(crate) struct SubscriptionSlot {
    state: Mutex<SlotState>,
}

impl SubscriptionSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Idle),
        }
    }

    /// Claim the slot before setting up a subscription.
    pub(crate) fn reserve(&self) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        match *state {
            SlotState::Idle => {
                *state = SlotState::Starting;
                Ok(())
            }
            _ => Err(BrokerError::AlreadySubscribed),
        }
    }

    /// Give a reserved slot back after a failed setup.
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Starting) {
            *state = SlotState::Idle;
        }
    }

    /// Spawn the delivery routine into a reserved slot.
    pub(crate) fn activate<S: DeliverySource>(&self, source: S, capacity: usize) -> Deliveries {
        let (subscription, deliveries) = Subscription::spawn(source, capacity);
        *self.state.lock() = SlotState::Active(subscription);
        deliveries
    }

    /// Stop the active subscription, if any, and wait for its routine to exit.
    pub(crate) async fn shutdown(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), SlotState::Idle);
        match previous {
            SlotState::Active(subscription) => {
                subscription.stop().await;
                true
            }
            other => {
                *self.state.lock() = other;
                false
            }
        }
    }
}

async fn deliver<S: DeliverySource>(
    mut source: S,
    sender: mpsc::Sender<Envelope>,
    capacity: usize,
    mut stop: watch::Receiver<bool>,
) {
    let mut buffer: VecDeque<Envelope> = VecDeque::with_capacity(capacity);
    let mut source_open = true;

    loop {
        if !source_open && buffer.is_empty() {
            debug!("Delivery source ended");
            break;
        }

        tokio::select! {
            biased;

            _ = stop.changed() => {
                debug!("Delivery routine stopping");
                break;
            }

            permit = sender.reserve(), if !buffer.is_empty() => {
                let Ok(permit) = permit else {
                    debug!("All receivers dropped, stopping delivery routine");
                    break;
                };
                if let Some(envelope) = buffer.pop_front() {
                    permit.send(envelope);
                }
            }

            next = source.next(), if source_open && buffer.len() < capacity => {
                match next {
                    Some(envelope) => buffer.push_back(envelope),
                    None => source_open = false,
                }
            }
        }
    }

    source.close().await;

    if !buffer.is_empty() {
        debug!(
            abandoned = buffer.len(),
            "Dropping buffered deliveries, they will be redelivered"
        );
    }
    drop(buffer);
    drop(sender);
}

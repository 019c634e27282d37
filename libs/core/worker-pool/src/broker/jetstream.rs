//! NATS JetStream broker.

use super::delivery::{DeliverySource, SubscriptionSlot};
use super::envelope::{Acknowledge, Deliveries, Envelope};
use super::Broker;
use crate::config::SubscriptionConfig;
use crate::error::BrokerError;
use async_nats::jetstream::consumer::{push, AckPolicy, DeliverPolicy};
use async_nats::jetstream::stream::Config as StreamConfig;
use async_nats::jetstream::{self, AckKind, Context};
use async_nats::{Client, Subscriber};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Prefix of the deliver subject shared by every member of a consumer group.
const GROUP_DELIVER_PREFIX: &str = "_WORKER_POOL";

/// Upper bound on how long shutdown waits for the transport to flush.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Broker backed by a JetStream push consumer with explicit acks.
///
/// With a consumer group, every process using the group binds to the same
/// durable consumer and receives through a NATS queue subscription, so each
/// message reaches one member. Without one, an ephemeral consumer delivers
/// exclusively to this process.
pub struct JetStreamBroker {
    client: Client,
    jetstream: Context,
    config: SubscriptionConfig,
    slot: SubscriptionSlot,
}

impl JetStreamBroker {
    /// Create a broker on an established NATS connection.
    ///
    /// Zero values in `config` are replaced by their defaults.
    pub fn new(client: Client, config: SubscriptionConfig) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self {
            client,
            jetstream,
            config: config.normalized(),
            slot: SubscriptionSlot::new(),
        }
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Create stream `name` covering the consume and produce subjects if it
    /// does not exist yet.
    pub async fn ensure_stream(&self, name: &str) -> Result<(), BrokerError> {
        let mut subjects = vec![self.config.consume_subject.clone()];
        if self.config.produce_subject != self.config.consume_subject {
            subjects.push(self.config.produce_subject.clone());
        }

        let mut stream = self
            .jetstream
            .get_or_create_stream(StreamConfig {
                name: name.to_string(),
                subjects,
                ..Default::default()
            })
            .await
            .map_err(BrokerError::stream)?;

        let info = stream.info().await.map_err(BrokerError::stream)?;
        info!(
            stream = %name,
            messages = info.state.messages,
            "Stream ready"
        );

        Ok(())
    }

    fn consumer_config(&self, deliver_subject: String) -> push::Config {
        let group = self.config.consumer_group.as_deref().map(consumer_name);

        push::Config {
            durable_name: group.clone(),
            deliver_subject,
            deliver_group: group,
            ack_policy: AckPolicy::Explicit,
            ack_wait: self.config.ack_wait,
            max_deliver: self.config.max_deliver(),
            max_ack_pending: self.config.pending_limit,
            deliver_policy: DeliverPolicy::New,
            filter_subject: self.config.consume_subject.clone(),
            ..Default::default()
        }
    }

    async fn open(&self) -> Result<Subscriber, BrokerError> {
        let stream_name = self
            .jetstream
            .stream_by_subject(self.config.consume_subject.clone())
            .await
            .map_err(BrokerError::subscribe)?;
        let stream = self
            .jetstream
            .get_stream(&stream_name)
            .await
            .map_err(BrokerError::subscribe)?;

        // The core subscription exists before the consumer starts pushing.
        let (mut subscriber, deliver_subject) = match self.config.consumer_group.as_deref() {
            Some(group) => {
                let group = consumer_name(group);
                let deliver_subject = format!("{}.{}", GROUP_DELIVER_PREFIX, group);
                let subscriber = self
                    .client
                    .queue_subscribe(deliver_subject.clone(), group)
                    .await
                    .map_err(BrokerError::subscribe)?;
                (subscriber, deliver_subject)
            }
            None => {
                let deliver_subject = self.client.new_inbox();
                let subscriber = self
                    .client
                    .subscribe(deliver_subject.clone())
                    .await
                    .map_err(BrokerError::subscribe)?;
                (subscriber, deliver_subject)
            }
        };

        let consumer_config = self.consumer_config(deliver_subject);
        let created = match consumer_config.durable_name.clone() {
            Some(durable) => stream
                .get_or_create_consumer(&durable, consumer_config)
                .await
                .map(|_| ())
                .map_err(BrokerError::subscribe),
            None => stream
                .create_consumer(consumer_config)
                .await
                .map(|_| ())
                .map_err(BrokerError::subscribe),
        };

        if let Err(e) = created {
            if let Err(unsub) = subscriber.unsubscribe().await {
                debug!(error = %unsub, "Failed to remove subscription after consumer error");
            }
            return Err(e);
        }

        info!(
            stream = %stream_name,
            subject = %self.config.consume_subject,
            group = self.config.consumer_group.as_deref().unwrap_or("-"),
            ack_wait_secs = self.config.ack_wait.as_secs(),
            max_deliver = self.config.max_deliver(),
            "Subscribed"
        );

        Ok(subscriber)
    }
}

#[async_trait]
impl Broker for JetStreamBroker {
    async fn subscribe(&self) -> Result<Deliveries, BrokerError> {
        self.slot.reserve()?;

        match self.open().await {
            Ok(subscriber) => {
                let source = JetStreamSource {
                    subscriber,
                    context: self.jetstream.clone(),
                };
                Ok(self.slot.activate(source, self.config.receive_capacity))
            }
            Err(e) => {
                self.slot.release();
                Err(e)
            }
        }
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), BrokerError> {
        let ack = self
            .jetstream
            .publish(self.config.produce_subject.clone(), payload.into())
            .await
            .map_err(BrokerError::publish)?
            .await
            .map_err(BrokerError::publish)?;

        debug!(
            stream = %ack.stream,
            sequence = ack.sequence,
            "Published result"
        );

        Ok(())
    }

    async fn shutdown(&self) {
        if self.slot.shutdown().await {
            info!(subject = %self.config.consume_subject, "Unsubscribed");
        }
    }
}

/// Durable and queue group names may not contain subject tokens or whitespace.
fn consumer_name(group: &str) -> String {
    group
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | '/' | '\\' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

struct JetStreamSource {
    subscriber: Subscriber,
    context: Context,
}

#[async_trait]
impl DeliverySource for JetStreamSource {
    async fn next(&mut self) -> Option<Envelope> {
        let message = self.subscriber.next().await?;
        let message = jetstream::Message {
            message,
            context: self.context.clone(),
        };

        let delivery_count = match message.info() {
            Ok(info) => u32::try_from(info.delivered).unwrap_or(u32::MAX),
            Err(e) => {
                debug!(error = %e, "Delivery without JetStream metadata");
                1
            }
        };
        let payload = message.payload.to_vec();

        Some(Envelope::new(payload, JetStreamAck { message }).with_delivery_count(delivery_count))
    }

    async fn close(&mut self) {
        if let Err(e) = self.subscriber.drain().await {
            warn!(error = %e, "Drain failed, unsubscribing");
            if let Err(e) = self.subscriber.unsubscribe().await {
                warn!(error = %e, "Unsubscribe failed");
            }
        }

        // Whatever the transport still flushes stays unacknowledged.
        let flushed = tokio::time::timeout(DRAIN_TIMEOUT, async {
            let mut count = 0usize;
            while self.subscriber.next().await.is_some() {
                count += 1;
            }
            count
        })
        .await;

        match flushed {
            Ok(count) if count > 0 => debug!(count, "Left drained deliveries for redelivery"),
            Ok(_) => {}
            Err(_) => warn!("Timed out draining subscription"),
        }
    }
}

struct JetStreamAck {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledge for JetStreamAck {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.message.ack().await.map_err(BrokerError::ack)
    }

    async fn in_progress(&self) -> Result<(), BrokerError> {
        self.message
            .ack_with(AckKind::Progress)
            .await
            .map_err(BrokerError::in_progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_name_replaces_subject_tokens() {
        assert_eq!(consumer_name("relay"), "relay");
        assert_eq!(consumer_name("orders.eu west"), "orders_eu_west");
        assert_eq!(consumer_name("a*b>c"), "a_b_c");
    }
}

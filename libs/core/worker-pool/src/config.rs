//! Subscription configuration shared by broker implementations.

use std::time::Duration;

/// Default time the stream waits for an ack before redelivering.
pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(60);

/// Default number of redeliveries after the first delivery.
pub const DEFAULT_MAX_REDELIVERIES: u32 = 2;

/// Default capacity of the broker's internal receive buffer.
pub const DEFAULT_RECEIVE_CAPACITY: usize = 64;

/// Unlimited outstanding (unacknowledged) messages.
pub const UNLIMITED_PENDING: i64 = -1;

/// Subscription configuration.
///
/// Immutable once handed to a broker. Zero values for `ack_wait`,
/// `max_redeliveries` and `receive_capacity` are replaced by their defaults
/// when the broker is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Subject to consume from
    pub consume_subject: String,

    /// Optional consumer group; deliveries are load-shared across every
    /// process using the same group, otherwise the subscription is exclusive
    pub consumer_group: Option<String>,

    /// Subject results are published to
    pub produce_subject: String,

    /// How long the stream waits for an ack before redelivering
    pub ack_wait: Duration,

    /// How many times an unacknowledged message is redelivered
    pub max_redeliveries: u32,

    /// Capacity of the internal receive buffer
    pub receive_capacity: usize,

    /// Maximum unacknowledged messages in flight, `-1` for unlimited
    pub pending_limit: i64,
}

impl SubscriptionConfig {
    /// Create a configuration for the given consume and produce subjects.
    pub fn new(consume_subject: impl Into<String>, produce_subject: impl Into<String>) -> Self {
        Self {
            consume_subject: consume_subject.into(),
            consumer_group: None,
            produce_subject: produce_subject.into(),
            ack_wait: DEFAULT_ACK_WAIT,
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
            receive_capacity: DEFAULT_RECEIVE_CAPACITY,
            pending_limit: UNLIMITED_PENDING,
        }
    }

    /// Share deliveries with every subscriber in `group`.
    pub fn with_consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = Some(group.into());
        self
    }

    /// Set the ack wait.
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    /// Set the maximum number of redeliveries.
    pub fn with_max_redeliveries(mut self, max_redeliveries: u32) -> Self {
        self.max_redeliveries = max_redeliveries;
        self
    }

    /// Set the receive buffer capacity.
    pub fn with_receive_capacity(mut self, capacity: usize) -> Self {
        self.receive_capacity = capacity;
        self
    }

    /// Set the pending message limit.
    pub fn with_pending_limit(mut self, limit: i64) -> Self {
        self.pending_limit = limit;
        self
    }

    /// Replace zero values with defaults.
    pub fn normalized(mut self) -> Self {
        if self.ack_wait.is_zero() {
            self.ack_wait = DEFAULT_ACK_WAIT;
        }
        if self.max_redeliveries == 0 {
            self.max_redeliveries = DEFAULT_MAX_REDELIVERIES;
        }
        if self.receive_capacity == 0 {
            self.receive_capacity = DEFAULT_RECEIVE_CAPACITY;
        }
        if self.pending_limit == 0 {
            self.pending_limit = UNLIMITED_PENDING;
        }
        if self.consumer_group.as_deref() == Some("") {
            self.consumer_group = None;
        }
        self
    }

    /// Total deliveries allowed by the stream: the first one plus every redelivery.
    pub fn max_deliver(&self) -> i64 {
        i64::from(self.max_redeliveries) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SubscriptionConfig::new("A.in", "A.out");

        assert_eq!(config.consume_subject, "A.in");
        assert_eq!(config.produce_subject, "A.out");
        assert_eq!(config.consumer_group, None);
        assert_eq!(config.ack_wait, Duration::from_secs(60));
        assert_eq!(config.max_redeliveries, 2);
        assert_eq!(config.receive_capacity, 64);
        assert_eq!(config.pending_limit, -1);
    }

    #[test]
    fn test_config_builder() {
        let config = SubscriptionConfig::new("A.in", "A.out")
            .with_consumer_group("a-workers")
            .with_ack_wait(Duration::from_secs(5))
            .with_max_redeliveries(4)
            .with_receive_capacity(128)
            .with_pending_limit(500);

        assert_eq!(config.consumer_group.as_deref(), Some("a-workers"));
        assert_eq!(config.ack_wait, Duration::from_secs(5));
        assert_eq!(config.max_redeliveries, 4);
        assert_eq!(config.receive_capacity, 128);
        assert_eq!(config.pending_limit, 500);
    }

    #[test]
    fn test_normalized_replaces_zero_values() {
        let config = SubscriptionConfig::new("A.in", "A.out")
            .with_consumer_group("")
            .with_ack_wait(Duration::ZERO)
            .with_max_redeliveries(0)
            .with_receive_capacity(0)
            .with_pending_limit(0)
            .normalized();

        assert_eq!(config.consumer_group, None);
        assert_eq!(config.ack_wait, DEFAULT_ACK_WAIT);
        assert_eq!(config.max_redeliveries, DEFAULT_MAX_REDELIVERIES);
        assert_eq!(config.receive_capacity, DEFAULT_RECEIVE_CAPACITY);
        assert_eq!(config.pending_limit, UNLIMITED_PENDING);
    }

    #[test]
    fn test_normalized_keeps_explicit_values() {
        let config = SubscriptionConfig::new("A.in", "A.out")
            .with_ack_wait(Duration::from_secs(3))
            .with_max_redeliveries(7)
            .normalized();

        assert_eq!(config.ack_wait, Duration::from_secs(3));
        assert_eq!(config.max_redeliveries, 7);
    }

    #[test]
    fn test_max_deliver_counts_first_delivery() {
        let config = SubscriptionConfig::new("A.in", "A.out").with_max_redeliveries(2);
        assert_eq!(config.max_deliver(), 3);
    }
}

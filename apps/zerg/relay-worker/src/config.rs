//! Configuration for the relay worker

use core_config::{env_optional, env_or_default, env_parse, ConfigError, FromEnv};
use std::env;
use std::time::Duration;
use worker_pool::{CodecKind, SubscriptionConfig};

const DEFAULT_CONSUMER_GROUP: &str = "relay";

#[derive(Debug, Clone)]
pub struct Config {
    /// Number of concurrent workers
    pub concurrency: usize,

    /// Wire format for inputs and results
    pub codec: CodecKind,

    /// Subject inputs are consumed from
    pub consume_subject: String,

    /// Subject results are published to
    pub produce_subject: String,

    /// Consumer group shared by every replica; `None` for an exclusive subscription
    pub consumer_group: Option<String>,

    /// Zero keeps the broker default
    pub ack_wait: Duration,
    pub max_redeliveries: u32,
    pub receive_capacity: usize,
    pub pending_limit: i64,

    /// Stream to create at startup when it does not exist
    pub stream: Option<String>,

    /// Port for the Prometheus scrape endpoint
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Subscription settings for the broker
    pub fn subscription(&self) -> SubscriptionConfig {
        let mut config =
            SubscriptionConfig::new(self.consume_subject.clone(), self.produce_subject.clone())
                .with_ack_wait(self.ack_wait)
                .with_max_redeliveries(self.max_redeliveries)
                .with_receive_capacity(self.receive_capacity)
                .with_pending_limit(self.pending_limit);

        if let Some(group) = &self.consumer_group {
            config = config.with_consumer_group(group.clone());
        }

        config.normalized()
    }
}

impl FromEnv for Config {
    /// Reads from environment variables:
    /// - WORKER_CONCURRENCY: defaults to 5
    /// - WORKER_CODEC: `json` (default) or `bincode`
    /// - WORKER_CONSUME_SUBJECT / WORKER_PRODUCE_SUBJECT: default to RELAY.in / RELAY.out
    /// - WORKER_CONSUMER_GROUP: defaults to `relay`, set it empty for an exclusive subscription
    /// - WORKER_ACK_WAIT_SECS, WORKER_MAX_REDELIVERIES, WORKER_RECEIVE_CAPACITY, WORKER_PENDING_LIMIT
    /// - WORKER_STREAM: optional
    /// - METRICS_PORT: optional
    fn from_env() -> Result<Self, ConfigError> {
        let consumer_group = match env::var("WORKER_CONSUMER_GROUP") {
            Ok(group) if group.trim().is_empty() => None,
            Ok(group) => Some(group.trim().to_string()),
            Err(_) => Some(DEFAULT_CONSUMER_GROUP.to_string()),
        };

        let metrics_port = match env_optional("METRICS_PORT") {
            Some(port) => Some(port.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::ParseError {
                    key: "METRICS_PORT".to_string(),
                    details: e.to_string(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            concurrency: env_parse("WORKER_CONCURRENCY", 5)?,
            codec: env_parse("WORKER_CODEC", CodecKind::Json)?,
            consume_subject: env_or_default("WORKER_CONSUME_SUBJECT", "RELAY.in"),
            produce_subject: env_or_default("WORKER_PRODUCE_SUBJECT", "RELAY.out"),
            consumer_group,
            ack_wait: Duration::from_secs(env_parse("WORKER_ACK_WAIT_SECS", 0)?),
            max_redeliveries: env_parse("WORKER_MAX_REDELIVERIES", 0)?,
            receive_capacity: env_parse("WORKER_RECEIVE_CAPACITY", 0)?,
            pending_limit: env_parse("WORKER_PENDING_LIMIT", 0)?,
            stream: env_optional("WORKER_STREAM"),
            metrics_port,
        })
    }
}

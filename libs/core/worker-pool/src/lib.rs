//! At-least-once worker pool on top of NATS JetStream.
//!
//! A `Service` runs N workers that share one delivery channel. Each worker
//! decodes a message with a `Codec`, hands it to a `Job`, publishes the
//! optional result and only then acknowledges the input. Anything that goes
//! wrong before the acknowledgement leaves the message to the broker's
//! redelivery timer.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐   ┌──────────────────┐   ┌───────────┐   ┌─────────────┐
//! │ JetStream      │──▶│ delivery routine │──▶│ worker 1  │──▶│ Codec / Job │
//! │ consume subject│   │ (bounded buffer) │   │ worker .. │   └──────┬──────┘
//! └────────────────┘   └──────────────────┘   │ worker N  │          │
//!         ▲                                   └─────┬─────┘          ▼
//!         │                 ack / in progress       │        ┌───────────────┐
//!         └─────────────────────────────────────────┘        │ produce subject│
//!                                                            └───────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use worker_pool::{JetStreamBroker, JsonCodec, Service, SubscriptionConfig};
//!
//! let config = SubscriptionConfig::new("ORDERS.in", "ORDERS.out").with_consumer_group("orders");
//! let broker = JetStreamBroker::new(nats_client, config);
//!
//! let service = Service::new(5, broker, OrderJob::default(), JsonCodec)?;
//! service.run().await?;
//! ```

pub mod broker;
pub mod codec;
mod config;
mod error;
mod job;
pub mod metrics;
mod service;

pub use broker::{
    Acknowledge, Broker, Deliveries, Envelope, JetStreamBroker, MemoryBroker, MemoryBrokerConfig,
};
pub use codec::{BincodeCodec, Codec, CodecKind, JsonCodec};
pub use config::SubscriptionConfig;
pub use error::{BrokerError, CodecError, JobError, ServiceError};
pub use job::Job;
pub use self::metrics::{FailureStage, PoolMetrics};
pub use service::{Service, ShutdownHandle};

//! Relay Worker Service (NATS JetStream)
//!
//! Consumes messages from a JetStream subject, runs them through a pool of
//! workers and publishes the results to a second subject.
//!
//! ## Architecture
//!
//! ```text
//! NATS JetStream (WORKER_CONSUME_SUBJECT)
//!   ↓ (Push consumer, queue group WORKER_CONSUMER_GROUP)
//! Service<JetStreamBroker, RelayJob, Codec>
//!   ↓ (WORKER_CONCURRENCY workers)
//! RelayJob
//!   ↓
//! NATS JetStream (WORKER_PRODUCE_SUBJECT)
//! ```
//!
//! ## Features
//!
//! - At-least-once processing with explicit acks
//! - JSON or bincode payloads
//! - Graceful shutdown on SIGINT/SIGTERM
//! - Prometheus metrics when METRICS_PORT is set

pub mod config;
pub mod job;

use crate::config::Config;
use crate::job::RelayJob;
use core_config::nats::NatsConfig;
use core_config::tracing::{init_tracing, install_color_eyre, LogFormat};
use core_config::{Environment, FromEnv};
use eyre::{Result, WrapErr};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use worker_pool::{BincodeCodec, Codec, CodecKind, JetStreamBroker, JsonCodec, Service};

const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

/// Run the relay worker
///
/// 1. Sets up error reporting and structured logging
/// 2. Loads the worker and NATS configuration from the environment
/// 3. Connects to NATS and, if `WORKER_STREAM` is set, creates the stream
/// 4. Runs the worker pool until SIGINT or SIGTERM
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the NATS connection or
/// subscription fails, or the metrics exporter cannot be installed.
pub async fn run() -> Result<()> {
    install_color_eyre();

    let environment = Environment::from_env();
    init_tracing(&environment, LogFormat::from_env(&environment));

    info!(
        name = SERVICE_NAME,
        version = env!("CARGO_PKG_VERSION"),
        ?environment,
        "Starting relay worker"
    );

    let config = Config::from_env().wrap_err("Failed to load worker configuration")?;
    let mut nats_config = NatsConfig::from_env().wrap_err("Failed to load NATS configuration")?;
    if nats_config.connection_name.is_none() {
        nats_config = nats_config.with_connection_name(SERVICE_NAME);
    }

    if let Some(port) = config.metrics_port {
        init_metrics(port)?;
    }

    info!(url = %nats_config.url, "Connecting to NATS...");
    let client = nats_config
        .connect()
        .await
        .wrap_err_with(|| format!("Failed to connect to NATS at {}", nats_config.url))?;
    info!("Connected to NATS successfully");

    let subscription = config.subscription();
    info!(
        consume = %subscription.consume_subject,
        produce = %subscription.produce_subject,
        group = ?subscription.consumer_group,
        concurrency = config.concurrency,
        codec = %config.codec,
        "Worker configuration loaded"
    );

    let broker = JetStreamBroker::new(client.clone(), subscription);
    if let Some(stream) = &config.stream {
        broker
            .ensure_stream(stream)
            .await
            .wrap_err_with(|| format!("Failed to ensure stream {}", stream))?;
    }

    let job = RelayJob::new(
        nats_config
            .connection_name
            .clone()
            .unwrap_or_else(|| SERVICE_NAME.to_string()),
    );

    match config.codec {
        CodecKind::Json => serve(config.concurrency, broker, job, JsonCodec).await?,
        CodecKind::Bincode => serve(config.concurrency, broker, job, BincodeCodec).await?,
    }

    client
        .flush()
        .await
        .wrap_err("Failed to flush NATS connection")?;

    info!("Relay worker stopped");
    Ok(())
}

async fn serve<C: Codec>(
    concurrency: usize,
    broker: JetStreamBroker,
    job: RelayJob,
    codec: C,
) -> Result<()> {
    let service = Service::new(concurrency, broker, job, codec)
        .wrap_err("Invalid worker pool configuration")?;

    service.run().await.wrap_err("Worker pool failed")
}

/// Install the Prometheus recorder with a scrape endpoint on `port`.
fn init_metrics(port: u16) -> Result<()> {
    let address = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .wrap_err_with(|| format!("Failed to install Prometheus exporter on {}", address))?;

    info!(%address, "Prometheus metrics endpoint started");
    Ok(())
}

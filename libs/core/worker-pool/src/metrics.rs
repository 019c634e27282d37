//! Prometheus metrics for the worker pool.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! binary installs a recorder.

use metrics::{counter, histogram};
use std::time::Duration;

/// Stage at which a message was given up on, left for redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Decode,
    Job,
    Encode,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Decode => "decode",
            FailureStage::Job => "job",
            FailureStage::Encode => "encode",
        }
    }
}

/// Metrics for one pool, labelled by job name.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    job: String,
}

impl PoolMetrics {
    pub fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
        }
    }

    /// Record a message received by a worker.
    pub fn message_received(&self) {
        counter!(
            "worker_pool_messages_received_total",
            "job" => self.job.clone()
        )
        .increment(1);
    }

    /// Record a message handled and acknowledged.
    pub fn message_processed(&self, duration: Duration) {
        counter!(
            "worker_pool_messages_processed_total",
            "job" => self.job.clone()
        )
        .increment(1);

        histogram!(
            "worker_pool_message_duration_seconds",
            "job" => self.job.clone()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a message left unacknowledged.
    pub fn message_failed(&self, stage: FailureStage) {
        counter!(
            "worker_pool_messages_failed_total",
            "job" => self.job.clone(),
            "stage" => stage.as_str()
        )
        .increment(1);
    }

    pub fn result_published(&self) {
        counter!(
            "worker_pool_results_published_total",
            "job" => self.job.clone()
        )
        .increment(1);
    }

    pub fn publish_failed(&self) {
        counter!(
            "worker_pool_publish_failures_total",
            "job" => self.job.clone()
        )
        .increment(1);
    }

    pub fn ack_failed(&self) {
        counter!(
            "worker_pool_ack_failures_total",
            "job" => self.job.clone()
        )
        .increment(1);
    }
}

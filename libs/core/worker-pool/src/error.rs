//! Error types for the worker pool.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error raised by a broker implementation.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Subscription could not be established
    #[error("subscribe: {0}")]
    Subscribe(String),

    /// A subscription is already active on this broker
    #[error("subscribe: already subscribed")]
    AlreadySubscribed,

    /// Result could not be published
    #[error("publish: {0}")]
    Publish(String),

    /// Acknowledgement could not be sent
    #[error("ack: {0}")]
    Ack(String),

    /// Deadline extension could not be sent
    #[error("in progress: {0}")]
    InProgress(String),

    /// Stream setup failed
    #[error("stream: {0}")]
    Stream(String),
}

impl BrokerError {
    /// Create a subscribe error from any displayable transport error.
    pub fn subscribe(error: impl std::fmt::Display) -> Self {
        Self::Subscribe(error.to_string())
    }

    /// Create a publish error.
    pub fn publish(error: impl std::fmt::Display) -> Self {
        Self::Publish(error.to_string())
    }

    /// Create an ack error.
    pub fn ack(error: impl std::fmt::Display) -> Self {
        Self::Ack(error.to_string())
    }

    /// Create an in-progress error.
    pub fn in_progress(error: impl std::fmt::Display) -> Self {
        Self::InProgress(error.to_string())
    }

    /// Create a stream setup error.
    pub fn stream(error: impl std::fmt::Display) -> Self {
        Self::Stream(error.to_string())
    }
}

/// Error raised while encoding or decoding a payload.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode: {0}")]
    Encode(#[source] BoxError),

    #[error("decode: {0}")]
    Decode(#[source] BoxError),
}

impl CodecError {
    pub fn encode(error: impl Into<BoxError>) -> Self {
        Self::Encode(error.into())
    }

    pub fn decode(error: impl Into<BoxError>) -> Self {
        Self::Decode(error.into())
    }
}

/// Error returned by a job.
///
/// Any job error leaves the input unacknowledged, so the broker redelivers it
/// once the ack wait elapses.
#[derive(Debug, Error)]
pub enum JobError {
    /// Processing failed
    #[error("job failed: {message}")]
    Failed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Input decoded but is not something the job can handle
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl JobError {
    /// Create a processing failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a processing failure with a source.
    pub fn failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Error returned by the service itself.
///
/// Only startup problems surface here; per-message failures are logged by
/// the workers and never leave the pool.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Broker subscription failed at startup
    #[error("broker: {0}")]
    Subscribe(#[source] BrokerError),

    /// Concurrency must be at least one worker
    #[error("concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    /// `run` was called more than once
    #[error("service already started")]
    AlreadyStarted,
}

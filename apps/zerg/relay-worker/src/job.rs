//! The relay job: forwards each input to the produce subject.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use worker_pool::{Job, JobError};

/// Message read from the consume subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Message written to the produce subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayedMessage {
    pub id: String,
    pub body: String,
    pub headers: BTreeMap<String, String>,
    /// Name of the worker process that relayed the message
    pub relayed_by: String,
}

/// Forwards every message unchanged, tagged with the relaying worker.
///
/// Messages without an id are rejected and left for redelivery.
#[derive(Debug, Clone)]
pub struct RelayJob {
    worker_name: String,
}

impl RelayJob {
    pub fn new(worker_name: impl Into<String>) -> Self {
        Self {
            worker_name: worker_name.into(),
        }
    }
}

#[async_trait]
impl Job for RelayJob {
    type Input = RelayMessage;
    type Output = RelayedMessage;

    async fn execute(&self, input: RelayMessage) -> Result<Option<RelayedMessage>, JobError> {
        if input.id.trim().is_empty() {
            return Err(JobError::invalid_input("message id is empty"));
        }

        Ok(Some(RelayedMessage {
            id: input.id,
            body: input.body,
            headers: input.headers,
            relayed_by: self.worker_name.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "relay"
    }
}

//! NATS test infrastructure
//!
//! Provides a `TestNats` helper that runs a NATS container with JetStream.

use async_nats::Client;
use async_nats::jetstream::stream::Config as StreamConfig;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::nats::Nats;

/// Test NATS wrapper that ensures proper cleanup
///
/// The container is stopped and removed when this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestNats;
///
/// # async fn example() {
/// let nats = TestNats::new().await;
/// nats.create_stream("ORDERS", &["orders.in".to_string()]).await;
///
/// let client = nats.client();
/// # }
/// ```
pub struct TestNats {
    #[allow(dead_code)]
    container: ContainerAsync<Nats>,
    client: Client,
    pub connection_string: String,
}

impl TestNats {
    /// Start a NATS container with JetStream enabled (`-js`)
    pub async fn new() -> Self {
        let nats_image = Nats::default().with_tag("latest").with_cmd(["-js"]);

        let container = nats_image
            .start()
            .await
            .expect("Failed to start NATS container");

        let host_port = container
            .get_host_port_ipv4(4222)
            .await
            .expect("Failed to get NATS port");

        let connection_string = format!("nats://127.0.0.1:{}", host_port);

        let client = async_nats::connect(&connection_string)
            .await
            .expect("Failed to connect to NATS");

        tracing::info!(port = host_port, "Test NATS ready with JetStream");

        Self {
            container,
            client,
            connection_string,
        }
    }

    /// Get a cloned client (useful for passing to brokers)
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Connect a second, independent client to the same server
    pub async fn connect(&self) -> Client {
        async_nats::connect(&self.connection_string)
            .await
            .expect("Failed to connect to NATS")
    }

    pub fn jetstream(&self) -> async_nats::jetstream::Context {
        async_nats::jetstream::new(self.client.clone())
    }

    /// Create a stream over `subjects`
    pub async fn create_stream(&self, name: &str, subjects: &[String]) {
        self.jetstream()
            .create_stream(StreamConfig {
                name: name.to_string(),
                subjects: subjects.to_vec(),
                ..Default::default()
            })
            .await
            .expect("Failed to create stream");
    }

    /// Publish to JetStream and wait for the stream ack
    ///
    /// Returns the stream sequence of the message.
    pub async fn publish(&self, subject: &str, payload: Vec<u8>) -> u64 {
        self.jetstream()
            .publish(subject.to_string(), payload.into())
            .await
            .expect("Failed to publish")
            .await
            .expect("Failed to get publish ack")
            .sequence
    }

    /// Number of messages currently stored in `stream`
    pub async fn stream_messages(&self, stream: &str) -> u64 {
        let mut stream = self
            .jetstream()
            .get_stream(stream)
            .await
            .expect("Failed to get stream");

        let info = stream.info().await.expect("Failed to get stream info");
        info.state.messages
    }

    /// Poll `condition` until it holds or `timeout` passes
    pub async fn wait_for<F, Fut>(&self, timeout: Duration, mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl Drop for TestNats {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test NATS container");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_nats_connection() {
        let nats = TestNats::new().await;
        let client = nats.client();

        let mut subscriber = client.subscribe("test.subject").await.unwrap();

        client
            .publish("test.subject", "hello".into())
            .await
            .unwrap();
        client.flush().await.unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), subscriber.next())
            .await
            .expect("Timeout waiting for message")
            .expect("No message received");

        assert_eq!(message.payload.as_ref(), b"hello");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_create_stream_and_publish() {
        let nats = TestNats::new().await;
        nats.create_stream("TEST_STREAM", &["test.>".to_string()])
            .await;

        let first = nats.publish("test.hello", b"world".to_vec()).await;
        let second = nats.publish("test.hello", b"again".to_vec()).await;

        assert_eq!(second, first + 1);
        assert_eq!(nats.stream_messages("TEST_STREAM").await, 2);
    }
}

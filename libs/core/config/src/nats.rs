use crate::{env_optional, env_or_default, ConfigError, FromEnv};

/// NATS connection configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NatsConfig {
    pub url: String,
    pub connection_name: Option<String>,
}

impl NatsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_name: None,
        }
    }

    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = Some(name.into());
        self
    }

    /// Connect to the configured server
    pub async fn connect(&self) -> Result<async_nats::Client, async_nats::ConnectError> {
        let mut options = async_nats::ConnectOptions::new();
        if let Some(name) = &self.connection_name {
            options = options.name(name);
        }

        options.connect(self.url.as_str()).await
    }
}

impl FromEnv for NatsConfig {
    /// Reads from environment variables:
    /// - NATS_URL: defaults to nats://localhost:4222
    /// - NATS_CONNECTION_NAME: optional client name shown in server monitoring
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_or_default("NATS_URL", "nats://localhost:4222"),
            connection_name: env_optional("NATS_CONNECTION_NAME"),
        })
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self::new("nats://localhost:4222")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nats_config_from_env_with_defaults() {
        temp_env::with_vars(
            [("NATS_URL", None::<&str>), ("NATS_CONNECTION_NAME", None::<&str>)],
            || {
                let config = NatsConfig::from_env().unwrap();
                assert_eq!(config, NatsConfig::default());
                assert_eq!(config.url, "nats://localhost:4222");
                assert_eq!(config.connection_name, None);
            },
        );
    }

    #[test]
    fn test_nats_config_from_env_custom() {
        temp_env::with_vars(
            [
                ("NATS_URL", Some("nats://nats.messaging:4222")),
                ("NATS_CONNECTION_NAME", Some("relay-worker")),
            ],
            || {
                let config = NatsConfig::from_env().unwrap();
                assert_eq!(config.url, "nats://nats.messaging:4222");
                assert_eq!(config.connection_name.as_deref(), Some("relay-worker"));
            },
        );
    }

    #[test]
    fn test_nats_config_builder() {
        let config = NatsConfig::new("nats://10.0.0.1:4222").with_connection_name("worker");
        assert_eq!(config.url, "nats://10.0.0.1:4222");
        assert_eq!(config.connection_name.as_deref(), Some("worker"));
    }
}

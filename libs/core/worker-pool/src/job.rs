//! The unit of work the pool runs for each message.

use crate::error::JobError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// User-supplied transformation from a decoded input to an optional output.
///
/// A job has no access to the broker or the codec. `Ok(None)` means the
/// message was handled and there is nothing to publish. `Err` leaves the
/// input unacknowledged so the broker redelivers it.
///
/// Deliveries are at least once: the same input may reach `execute` more
/// than once, so implementations must tolerate duplicates.
///
/// # Example
///
/// ```rust,ignore
/// struct Uppercase;
///
/// #[async_trait]
/// impl Job for Uppercase {
///     type Input = String;
///     type Output = String;
///
///     async fn execute(&self, input: String) -> Result<Option<String>, JobError> {
///         Ok(Some(input.to_uppercase()))
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync + 'static {
    type Input: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + Sync + 'static;

    async fn execute(&self, input: Self::Input) -> Result<Option<Self::Output>, JobError>;

    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Reading {
        celsius: f64,
    }

    #[derive(Debug, Serialize, PartialEq)]
    struct Converted {
        fahrenheit: f64,
    }

    struct ToFahrenheit;

    #[async_trait]
    impl Job for ToFahrenheit {
        type Input = Reading;
        type Output = Converted;

        async fn execute(&self, input: Reading) -> Result<Option<Converted>, JobError> {
            if input.celsius < -273.15 {
                return Err(JobError::invalid_input("below absolute zero"));
            }
            if input.celsius == 0.0 {
                return Ok(None);
            }
            Ok(Some(Converted {
                fahrenheit: input.celsius * 9.0 / 5.0 + 32.0,
            }))
        }

        fn name(&self) -> &'static str {
            "to-fahrenheit"
        }
    }

    struct Unnamed;

    #[async_trait]
    impl Job for Unnamed {
        type Input = ();
        type Output = ();

        async fn execute(&self, _input: ()) -> Result<Option<()>, JobError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_execute_outcomes() {
        let job = ToFahrenheit;

        let out = job.execute(Reading { celsius: 100.0 }).await.unwrap();
        assert_eq!(out, Some(Converted { fahrenheit: 212.0 }));

        let out = job.execute(Reading { celsius: 0.0 }).await.unwrap();
        assert_eq!(out, None);

        let err = job.execute(Reading { celsius: -300.0 }).await.unwrap_err();
        assert!(matches!(err, JobError::InvalidInput(_)));
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert!(Unnamed.name().ends_with("Unnamed"));
        assert_eq!(ToFahrenheit.name(), "to-fahrenheit");
    }
}

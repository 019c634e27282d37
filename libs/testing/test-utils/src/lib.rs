//! Shared test utilities for the worker pool
//!
//! - `TestNats`: JetStream-enabled NATS container with automatic cleanup
//! - `TestSubjects`: deterministic stream and subject names per test
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_utils::{TestNats, TestSubjects};
//!
//! #[tokio::test]
//! async fn my_nats_test() {
//!     let nats = TestNats::new().await;
//!     let names = TestSubjects::from_test_name("my_nats_test");
//!
//!     nats.create_stream(&names.stream(), &[names.subject("in"), names.subject("out")])
//!         .await;
//! }
//! ```

mod nats;

pub use nats::TestNats;

/// Stream and subject names derived from a test name.
///
/// Tests sharing one NATS server never collide on names, and a given test
/// always gets the same names.
pub struct TestSubjects {
    seed: u64,
}

impl TestSubjects {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (seed from the test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestSubjects;
    ///
    /// let names = TestSubjects::from_test_name("test_round_trip");
    /// assert!(names.subject("in").ends_with(".in"));
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Stream name, e.g. `TEST_1234`
    pub fn stream(&self) -> String {
        format!("TEST_{}", self.seed)
    }

    /// Subject inside the test stream, e.g. `test_1234.in`
    pub fn subject(&self, suffix: &str) -> String {
        format!("test_{}.{}", self.seed, suffix)
    }

    /// Consumer group name, e.g. `test-1234-workers`
    pub fn group(&self, suffix: &str) -> String {
        format!("test-{}-{}", self.seed, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects_deterministic() {
        let a = TestSubjects::from_test_name("my_test");
        let b = TestSubjects::from_test_name("my_test");

        assert_eq!(a.stream(), b.stream());
        assert_eq!(a.subject("in"), b.subject("in"));
    }

    #[test]
    fn test_subjects_different_names() {
        let a = TestSubjects::from_test_name("test1");
        let b = TestSubjects::from_test_name("test2");

        assert_ne!(a.stream(), b.stream());
        assert_ne!(a.group("workers"), b.group("workers"));
    }

    #[test]
    fn test_subject_format() {
        let names = TestSubjects::new(7);

        assert_eq!(names.stream(), "TEST_7");
        assert_eq!(names.subject("out"), "test_7.out");
        assert_eq!(names.group("relay"), "test-7-relay");
    }
}

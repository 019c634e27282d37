//! Payload codecs.
//!
//! One codec instance is shared by every worker, so implementations must be
//! `Send + Sync`. Both shipped codecs are stateless.

mod binary;
mod json;

pub use self::binary::BincodeCodec;
pub use self::json::JsonCodec;

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Bidirectional transform between typed values and payload bytes.
///
/// `decode(encode(v)) == v` holds for every value the codec accepts.
pub trait Codec: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Codec selection for configuration layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    #[default]
    Json,
    Bincode,
}

impl CodecKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecKind::Json => "json",
            CodecKind::Bincode => "bincode",
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(CodecKind::Json),
            "bincode" | "binary" => Ok(CodecKind::Bincode),
            other => Err(format!(
                "unknown codec '{}', expected 'json' or 'bincode'",
                other
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Person {
        pub name: String,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Order {
        pub id: u64,
        pub customer: Person,
        pub items: Vec<String>,
        pub note: Option<String>,
        pub total_cents: i64,
    }

    pub fn john() -> Person {
        Person {
            name: "John Doe".to_string(),
        }
    }

    pub fn order() -> Order {
        Order {
            id: 42,
            customer: john(),
            items: vec!["keyboard".to_string(), "mouse".to_string()],
            note: Some("leave at the door".to_string()),
            total_cents: 12_999,
        }
    }
}

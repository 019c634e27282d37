use super::Codec;
use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Compact binary codec backed by `bincode`.
///
/// The format is not self-describing: types relying on
/// `deserialize_any` (untagged enums, `serde_json::Value`) cannot be decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(CodecError::encode)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        bincode::deserialize(bytes).map_err(CodecError::decode)
    }
}

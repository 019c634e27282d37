use super::Codec;
use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::encode)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fixtures::{john, order, Order, Person};

    #[test]
    fn test_json_encode() {
        let bytes = JsonCodec.encode(&john()).unwrap();
        assert_eq!(bytes, br#"{"name":"John Doe"}"#.to_vec());
    }

    #[test]
    fn test_json_decode() {
        let person: Person = JsonCodec.decode(br#"{"name":"John Doe"}"#).unwrap();
        assert_eq!(person, john());
    }

    #[test]
    fn test_json_decode_independent_values() {
        let first: Person = JsonCodec.decode(br#"{"name":"John Doe"}"#).unwrap();
        let second: Person = JsonCodec.decode(br#"{"name":"Jane Roe"}"#).unwrap();

        assert_eq!(first.name, "John Doe");
        assert_eq!(second.name, "Jane Roe");
    }

    #[test]
    fn test_json_round_trip() {
        let bytes = JsonCodec.encode(&order()).unwrap();
        let decoded: Order = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, order());

        let bytes = JsonCodec.encode(&Order::default()).unwrap();
        let decoded: Order = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, Order::default());
    }

    #[test]
    fn test_json_decode_error() {
        let result: Result<Person, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(CodecError::Decode(_))));

        let result: Result<Person, _> = JsonCodec.decode(br#"{"id":1}"#);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }
}

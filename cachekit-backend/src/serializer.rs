//! Value serialization (module A: Serializer).
//!
//! Deliberately simpler than a dyn-compatible `Format` trait threading a
//! schema-upgrading `Context` through a callback-based serde-erasure API for
//! mid-flight schema migration: nothing in this workspace consumes that (see
//! `InvocationCore`, module L), so this crate keeps a plain generic trait instead
//! of the callback/erased-serde machinery.

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::FormatError;

/// Converts typed values to and from bytes for storage.
///
/// Implementations must be deterministic: encoding the same value twice must produce
/// bit-identical output, since keys and content-addressed caches may depend on it.
pub trait Serializer: Send + Sync + std::fmt::Debug {
    /// Encodes a value to bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, FormatError>;

    /// Decodes bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, FormatError>;

    /// MIME-ish content type identifying this format, for diagnostics.
    fn content_type(&self) -> &'static str;
}

/// Human-readable JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, FormatError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| FormatError::Serialize(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, FormatError> {
        serde_json::from_slice(bytes).map_err(|e| FormatError::Deserialize(Box::new(e)))
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

/// Compact binary encoding, the default for storage backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, FormatError> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map(Bytes::from)
            .map_err(|e| FormatError::Serialize(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, FormatError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(|e| FormatError::Deserialize(Box::new(e)))
    }

    fn content_type(&self) -> &'static str {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        id: u32,
        name: String,
    }

    #[test]
    fn json_roundtrip_is_deterministic() {
        let value = Sample { id: 1, name: "x".into() };
        let a = JsonSerializer.encode(&value).unwrap();
        let b = JsonSerializer.encode(&value).unwrap();
        assert_eq!(a, b);
        let decoded: Sample = JsonSerializer.decode(&a).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn bincode_roundtrip() {
        let value = Sample { id: 7, name: "y".into() };
        let bytes = BincodeSerializer.encode(&value).unwrap();
        let decoded: Sample = BincodeSerializer.decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }
}

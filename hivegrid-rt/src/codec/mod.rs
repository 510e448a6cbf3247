//! Codec seam between typed actor APIs and the opaque bytes the runtime moves.
//!
//! The runtime never inspects argument or state payloads; it hands them to a
//! [`Codec`] at the edges. The codec must be deterministic across silos for
//! the same schema version, since state written by one silo is read by
//! another after a placement change.
//!
//! Typed values cross the seam through a self-describing intermediate
//! (`serde_json::Value`), which keeps the trait object-safe while letting
//! implementations choose their own byte format.

// Layer 1: Standard library imports
use std::fmt::Debug;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

// Layer 3: Internal module imports
use crate::error::InvokeError;

/// Serialize/deserialize payloads carried in envelopes, wire frames, and
/// persisted state records.
pub trait Codec: Send + Sync + Debug + 'static {
    /// Encode a self-describing value into payload bytes.
    fn encode_value(&self, value: &serde_json::Value) -> Result<Bytes, InvokeError>;

    /// Decode payload bytes back into a self-describing value.
    fn decode_value(&self, bytes: &Bytes) -> Result<serde_json::Value, InvokeError>;
}

/// Encode a typed value with the given codec.
pub fn encode<T: Serialize>(codec: &dyn Codec, value: &T) -> Result<Bytes, InvokeError> {
    let value = serde_json::to_value(value)
        .map_err(|e| InvokeError::marshalling(format!("encode failed: {e}")))?;
    codec.encode_value(&value)
}

/// Decode payload bytes into a typed value with the given codec.
pub fn decode<T: DeserializeOwned>(codec: &dyn Codec, bytes: &Bytes) -> Result<T, InvokeError> {
    let value = codec.decode_value(bytes)?;
    serde_json::from_value(value)
        .map_err(|e| InvokeError::marshalling(format!("payload does not match schema: {e}")))
}

/// Reference codec: compact JSON via `serde_json`.
///
/// JSON is deterministic for a fixed struct definition (field order follows
/// the declaration), which satisfies the cross-silo determinism requirement.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_value(&self, value: &serde_json::Value) -> Result<Bytes, InvokeError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| InvokeError::marshalling(format!("encode failed: {e}")))
    }

    fn decode_value(&self, bytes: &Bytes) -> Result<serde_json::Value, InvokeError> {
        serde_json::from_slice(bytes)
            .map_err(|e| InvokeError::marshalling(format!("decode failed: {e}")))
    }
}

// src/utils/serialization.rs
//! Serialization utilities for the registrar.
//!
//! Provides JSON helpers and the base64 encoding used for binary fields of
//! published records.

use serde::Serialize;

/// Serializes a value to a JSON string.
///
/// # Arguments
/// * `data` - The value to serialize (must implement `Serialize`)
pub fn serialize<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Encodes binary data as standard, padded base64.
pub fn encode_base64(data: &[u8]) -> String {
    base64::encode(data)
}

/// Decodes standard base64 produced by [`encode_base64`].
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::decode(data)
}

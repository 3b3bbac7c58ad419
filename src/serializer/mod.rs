//! Two-sided codecs between typed values and wire bytes
//!
//! Every serializer obeys the round-trip law `decode(encode(v)) == v` over
//! its domain. Decode failures are non-fatal: the offending message is
//! dropped and the dispatch loop continues.

use thiserror::Error;

mod binary;
mod flag;
mod json;

pub use binary::F32Vector;
pub use flag::Flag;
pub use json::Json;

/// Malformed payload for the bound serializer
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct DecodeError {
    reason: String,
}

impl DecodeError {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Value outside the serializer's encodable domain
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct EncodeError {
    reason: String,
}

impl EncodeError {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A deterministic two-sided codec bound to a topic handle.
pub trait Serializer: Send + Sync + 'static {
    type Value: Send + 'static;

    fn encode(&self, value: &Self::Value) -> Result<Vec<u8>, EncodeError>;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Value, DecodeError>;
}

/// Identity codec for preformatted device buffers (LED frames, raw
/// register readouts).
#[derive(Debug, Clone, Copy, Default)]
pub struct Raw;

impl Serializer for Raw {
    type Value = Vec<u8>;

    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>, EncodeError> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
        Ok(bytes.to_vec())
    }
}

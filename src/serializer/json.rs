//! JSON codec for structured, human-diagnostic payloads

use super::{DecodeError, EncodeError, Serializer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// JSON codec for any serde-representable value. Used for diagnostic
/// payloads such as log records, where readability beats density.
pub struct Json<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Json<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Json<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Serializer for Json<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    type Value = T;

    fn encode(&self, value: &T) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(value).map_err(|e| EncodeError::new(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError::new(e.to_string()))
    }
}

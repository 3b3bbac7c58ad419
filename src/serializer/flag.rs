//! Tri-state boolean codec

use super::{DecodeError, EncodeError, Serializer};

const FLAG_FALSE: u8 = 0x00;
const FLAG_TRUE: u8 = 0xFF;

/// Single-byte boolean: `0x00` = false, `0xFF` = true. `None` (unset)
/// maps to the empty payload, the broker convention for clearing a
/// retained value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flag;

impl Serializer for Flag {
    type Value = Option<bool>;

    fn encode(&self, value: &Option<bool>) -> Result<Vec<u8>, EncodeError> {
        Ok(match value {
            None => Vec::new(),
            Some(false) => vec![FLAG_FALSE],
            Some(true) => vec![FLAG_TRUE],
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Option<bool>, DecodeError> {
        match bytes {
            [] => Ok(None),
            [FLAG_FALSE] => Ok(Some(false)),
            [FLAG_TRUE] => Ok(Some(true)),
            [other] => Err(DecodeError::new(format!(
                "invalid flag byte 0x{other:02x}"
            ))),
            _ => Err(DecodeError::new(format!(
                "flag payload must be 0 or 1 bytes, got {}",
                bytes.len()
            ))),
        }
    }
}

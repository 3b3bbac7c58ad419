//! Fixed-width binary codec for high-frequency sensor telemetry

use super::{DecodeError, EncodeError, Serializer};

/// Fixed-width vector of big-endian IEEE-754 f32 values.
///
/// The element count is part of the codec: a payload of any other length
/// is malformed. Network byte order matches the convention of the
/// microcontroller peers on the bus.
#[derive(Debug, Clone, Copy)]
pub struct F32Vector {
    count: usize,
}

impl F32Vector {
    pub fn new(count: usize) -> Self {
        Self { count }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl Serializer for F32Vector {
    type Value = Vec<f32>;

    fn encode(&self, value: &Vec<f32>) -> Result<Vec<u8>, EncodeError> {
        if value.len() != self.count {
            return Err(EncodeError::new(format!(
                "expected {} elements, got {}",
                self.count,
                value.len()
            )));
        }
        let mut bytes = Vec::with_capacity(self.count * 4);
        for v in value {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
        if bytes.len() != self.count * 4 {
            return Err(DecodeError::new(format!(
                "expected {} bytes, got {}",
                self.count * 4,
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_round_trip() {
        let ser = F32Vector::new(3);
        let rgb = vec![0.25_f32, 0.5, 1.0];
        let bytes = ser.encode(&rgb).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(ser.decode(&bytes).unwrap(), rgb);
    }

    #[test]
    fn test_big_endian_layout() {
        let ser = F32Vector::new(1);
        let bytes = ser.encode(&vec![1.0_f32]).unwrap();
        assert_eq!(bytes, vec![0x3f, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let ser = F32Vector::new(3);
        assert!(ser.encode(&vec![1.0, 2.0]).is_err());
        assert!(ser.decode(&[0u8; 8]).is_err());
        assert!(ser.decode(&[0u8; 13]).is_err());
        assert!(ser.decode(&[]).is_err());
    }

    proptest! {
        #[test]
        fn round_trip_law(values in proptest::collection::vec(-1e6f32..1e6, 4)) {
            let ser = F32Vector::new(4);
            let bytes = ser.encode(&values).unwrap();
            prop_assert_eq!(ser.decode(&bytes).unwrap(), values);
        }
    }
}

//! A small data unit for tests and simulations.

use pagesync_protocol::{DataUnit, ProtocolError, ProtocolResult};

/// Test payload: a number and a label.
///
/// Encoded as the value in 8 big-endian bytes followed by the UTF-8 label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestUnit {
    /// Numeric part.
    pub value: i64,
    /// Text part.
    pub label: String,
}

impl TestUnit {
    /// Creates a new test unit.
    pub fn new(value: i64, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }
}

impl DataUnit for TestUnit {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.label.len());
        out.extend_from_slice(&self.value.to_be_bytes());
        out.extend_from_slice(self.label.as_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        if bytes.len() < 8 {
            return Err(ProtocolError::invalid_payload(format!(
                "test unit needs at least 8 bytes, got {}",
                bytes.len()
            )));
        }
        let (value, label) = bytes.split_at(8);
        let mut raw = [0u8; 8];
        raw.copy_from_slice(value);
        let label = std::str::from_utf8(label)
            .map_err(|e| ProtocolError::invalid_payload(format!("label is not UTF-8: {e}")))?;
        Ok(Self::new(i64::from_be_bytes(raw), label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let unit = TestUnit::new(1, "ab");
        assert_eq!(unit.encode(), vec![0, 0, 0, 0, 0, 0, 0, 1, b'a', b'b']);
        assert_eq!(TestUnit::decode(&unit.encode()).unwrap(), unit);
    }

    #[test]
    fn short_or_invalid_payloads_fail() {
        assert!(TestUnit::decode(&[0; 7]).is_err());
        let mut bytes = TestUnit::new(-3, "").encode();
        bytes.push(0xff);
        assert!(TestUnit::decode(&bytes).is_err());
    }

    #[test]
    fn checksum_follows_content() {
        let a = TestUnit::new(5, "rope");
        assert_eq!(a.checksum(), a.clone().checksum());
        assert_ne!(a.checksum(), TestUnit::new(5, "weld").checksum());
    }
}

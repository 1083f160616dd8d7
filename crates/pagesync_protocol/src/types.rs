//! Identifiers and checksums.

use crate::error::{ProtocolError, ProtocolResult};
use sha2::{Digest, Sha256};
use std::fmt;

/// Partition key grouping a set of data units.
///
/// Pages have no ordering semantics; the application picks the ids
/// (a dimension, an owner, a region).
pub type PageId = u64;

/// Key of a data unit within its page.
pub type ItemIndex = u32;

/// Length of a [`Checksum`] in bytes.
pub const CHECKSUM_LEN: usize = 32;

/// Content hash of a data unit.
///
/// Checksum equality is the only staleness signal in the protocol: two
/// units with the same encoded bytes always have the same checksum.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    /// Computes the SHA-256 checksum of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; CHECKSUM_LEN];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Wraps raw checksum bytes.
    pub fn from_bytes(bytes: [u8; CHECKSUM_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a checksum from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> ProtocolResult<Self> {
        let array: [u8; CHECKSUM_LEN] = bytes.try_into().map_err(|_| ProtocolError::ChecksumLength {
            expected: CHECKSUM_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }

    /// Returns the checksum as lowercase hex.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 bytes are plenty to tell checksums apart in logs.
        let hex = self.to_hex();
        write!(f, "Checksum({}..)", &hex[..16])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

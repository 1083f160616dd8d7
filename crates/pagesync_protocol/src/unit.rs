//! The replicated payload trait.

use crate::error::ProtocolResult;
use crate::types::Checksum;

/// A unit of replicated content.
///
/// The sync engine never looks inside a data unit. It only needs to move
/// the encoded bytes across the wire and compare checksums.
///
/// `checksum` must be a pure function of `encode`: the default
/// implementation hashes the encoded bytes, and overriding it with anything
/// that can disagree with the bytes breaks staleness detection.
pub trait DataUnit: Clone + Send + Sync + 'static {
    /// Encodes this unit to bytes.
    fn encode(&self) -> Vec<u8>;

    /// Decodes a unit from bytes produced by [`DataUnit::encode`].
    fn decode(bytes: &[u8]) -> ProtocolResult<Self>;

    /// Content hash of the encoded bytes.
    fn checksum(&self) -> Checksum {
        Checksum::of(&self.encode())
    }
}

/// Opaque byte payloads replicate as-is.
impl DataUnit for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(bytes.to_vec())
    }
}

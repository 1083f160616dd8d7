//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Failed to encode a value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// A frame was empty.
    #[error("empty frame")]
    EmptyFrame,

    /// The frame's type code does not name a known packet.
    #[error("unknown message type code: {0}")]
    UnknownMessageType(u8),

    /// A required field was absent from the packet.
    #[error("missing field `{field}` in {packet}")]
    MissingField {
        /// Packet being decoded.
        packet: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A field was present but held the wrong type or an out-of-range value.
    #[error("invalid field `{field}` in {packet}: {reason}")]
    InvalidField {
        /// Packet being decoded.
        packet: &'static str,
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A checksum had the wrong number of bytes.
    #[error("checksum must be {expected} bytes, got {actual}")]
    ChecksumLength {
        /// Required length.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// A data unit payload could not be decoded.
    #[error("invalid data unit payload: {0}")]
    InvalidPayload(String),
}

impl ProtocolError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create a missing field error.
    pub fn missing_field(packet: &'static str, field: &'static str) -> Self {
        Self::MissingField { packet, field }
    }

    /// Create an invalid field error.
    pub fn invalid_field(
        packet: &'static str,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            packet,
            field,
            reason: reason.into(),
        }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }
}

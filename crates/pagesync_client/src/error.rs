//! Error types for the replica.

use pagesync_protocol::{Channel, ProtocolError};
use thiserror::Error;

/// Result type for replica operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur on the replica side.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Malformed packet or undecodable payload.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// A packet the replica never accepts (a request).
    #[error("unexpected {0} sent to the replica")]
    UnexpectedMessage(&'static str),

    /// A packet arrived on a channel that does not carry it.
    #[error("{message} belongs on {expected:?}, received on {actual:?}")]
    ChannelMismatch {
        /// Packet name.
        message: &'static str,
        /// Channel the packet belongs to.
        expected: Channel,
        /// Channel it arrived on.
        actual: Channel,
    },
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if sending again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::NotConnected => true,
            _ => false,
        }
    }
}

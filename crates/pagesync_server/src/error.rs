//! Error types for the sync server.

use pagesync_protocol::{Channel, ProtocolError};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Request was well formed but violates a server limit.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A packet the authority never accepts (a response or a push).
    #[error("unexpected {0} sent to the authority")]
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

    /// A push could not be handed to a replica link.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

//! Server configuration.

use pagesync_protocol::Channel;

/// When checksum-changed pushes leave the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// Broadcast right after each mutation.
    Immediate,
    /// Coalesce per page until `flush_notifications` is called.
    Batched,
}

/// Configuration for the authority.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Synchronizer id; namespaces channel names in logs.
    pub id: String,
    /// Push emission strategy.
    pub push_mode: PushMode,
    /// Largest index list accepted in one data-diff request.
    pub max_request_indices: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            push_mode: PushMode::Immediate,
            max_request_indices: 4096,
        }
    }

    /// Sets the push mode.
    pub fn with_push_mode(mut self, mode: PushMode) -> Self {
        self.push_mode = mode;
        self
    }

    /// Sets the maximum number of indices per data-diff request.
    ///
    /// Larger requests are dropped unanswered, so replicas must chunk at or
    /// below this.
    pub fn with_max_request_indices(mut self, max: usize) -> Self {
        self.max_request_indices = max;
        self
    }

    /// Full name of `channel` for this synchronizer.
    pub fn channel_name(&self, channel: Channel) -> String {
        channel.name(&self.id)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("pagesync")
    }
}

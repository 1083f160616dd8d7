//! Configuration for the replica.

use pagesync_protocol::Channel;

/// Configuration for a replica cache.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Synchronizer id; namespaces channel names in logs. Not checked
    /// against the authority's.
    pub id: String,
    /// Largest index list sent in one data-diff request.
    ///
    /// Longer diffs are split over several requests.
    pub max_indices_per_request: usize,
}

impl ClientConfig {
    /// Creates a new replica configuration.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            max_indices_per_request: 1024,
        }
    }

    /// Sets the maximum number of indices per data-diff request.
    ///
    /// Zero is treated as one. Must not exceed the authority's
    /// `max_request_indices`: the authority drops larger requests without a
    /// reply, and a page needing them never converges.
    pub fn with_max_indices_per_request(mut self, max: usize) -> Self {
        self.max_indices_per_request = max;
        self
    }

    /// Full name of `channel` for this synchronizer.
    pub fn channel_name(&self, channel: Channel) -> String {
        channel.name(&self.id)
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.max_indices_per_request.max(1)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("pagesync")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_builder() {
        let config = ClientConfig::new("ropes").with_max_indices_per_request(8);

        assert_eq!(config.id, "ropes");
        assert_eq!(config.max_indices_per_request, 8);
        assert_eq!(
            config.channel_name(Channel::DataDiffQuery),
            "ropes:data_diff_query"
        );
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        let config = ClientConfig::default().with_max_indices_per_request(0);
        assert_eq!(config.chunk_size(), 1);
        assert_eq!(ClientConfig::default().chunk_size(), 1024);
    }
}

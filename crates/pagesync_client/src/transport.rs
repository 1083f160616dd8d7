//! Transport abstraction between a replica and its authority.

use crate::error::{ClientError, ClientResult};
use pagesync_protocol::{Channel, SyncMessage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Outbound byte pipe from a replica to the authority.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (sockets, in-process queues, mocks for testing). Replies
/// come back through [`ClientSynchronisedData::handle_frame`].
///
/// [`ClientSynchronisedData::handle_frame`]: crate::ClientSynchronisedData::handle_frame
pub trait ServerLink: Send + Sync {
    /// Sends one frame on `channel`.
    fn send(&self, channel: Channel, frame: Vec<u8>) -> ClientResult<()>;

    /// Checks if the link is connected.
    fn is_connected(&self) -> bool;
}

/// A link that records every frame instead of sending it.
#[derive(Debug)]
pub struct MockLink {
    connected: AtomicBool,
    failure: Mutex<Option<bool>>,
    sent: Mutex<Vec<(Channel, Vec<u8>)>>,
}

impl MockLink {
    /// Creates a new, connected mock link.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            failure: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes every send fail with a transport error until cleared with `None`.
    ///
    /// `Some(true)` fails with a retryable error, `Some(false)` with a fatal one.
    pub fn fail_sends(&self, retryable: Option<bool>) {
        *self.failure.lock() = retryable;
    }

    /// Number of frames recorded so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Removes and returns the recorded frames.
    pub fn take_frames(&self) -> Vec<(Channel, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Removes and returns the recorded frames, decoded.
    ///
    /// Frames that fail to decode are skipped.
    pub fn take_sent(&self) -> Vec<SyncMessage> {
        self.take_frames()
            .into_iter()
            .filter_map(|(_, frame)| SyncMessage::decode_frame(&frame).ok())
            .collect()
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerLink for MockLink {
    fn send(&self, channel: Channel, frame: Vec<u8>) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        match *self.failure.lock() {
            Some(true) => return Err(ClientError::transport_retryable("mock send failure")),
            Some(false) => return Err(ClientError::transport_fatal("mock link closed")),
            None => {}
        }
        self.sent.lock().push((channel, frame));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

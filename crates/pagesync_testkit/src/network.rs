//! In-process network connecting one authority to several replicas.
//!
//! Nothing is delivered until asked: requests sit in a per-replica outbound
//! queue and replies and pushes in a per-replica inbound queue. Tests drive
//! delivery explicitly, which makes lost or reordered packets easy to stage.

use pagesync_client::{ClientConfig, ClientError, ClientResult, ClientSynchronisedData, ServerLink};
use pagesync_protocol::{Channel, DataUnit};
use pagesync_server::{
    ReplicaId, ReplicaLink, RequestHandler, ServerConfig, ServerError, ServerResult,
    ServerSynchronisedData,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A FIFO of frames usable from either side.
#[derive(Debug)]
pub struct QueueLink {
    frames: Mutex<VecDeque<(Channel, Vec<u8>)>>,
    connected: AtomicBool,
}

impl QueueLink {
    /// Creates an empty, connected queue.
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Sets the connected state. A disconnected queue refuses frames.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn push(&self, channel: Channel, frame: Vec<u8>) {
        self.frames.lock().push_back((channel, frame));
    }

    /// Takes every queued frame.
    pub fn drain(&self) -> Vec<(Channel, Vec<u8>)> {
        self.frames.lock().drain(..).collect()
    }

    /// Takes the queued frames on any of `channels`, leaving the rest in order.
    pub fn drain_channels(&self, channels: &[Channel]) -> Vec<(Channel, Vec<u8>)> {
        let mut frames = self.frames.lock();
        let (taken, kept): (VecDeque<_>, VecDeque<_>) =
            frames.drain(..).partition(|(c, _)| channels.contains(c));
        *frames = kept;
        taken.into_iter().collect()
    }

    /// Discards queued frames on `channel`. Returns how many were dropped.
    pub fn discard(&self, channel: Channel) -> usize {
        let mut frames = self.frames.lock();
        let before = frames.len();
        frames.retain(|(c, _)| *c != channel);
        before - frames.len()
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueueLink {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerLink for QueueLink {
    fn send(&self, channel: Channel, frame: Vec<u8>) -> ClientResult<()> {
        if !self.is_open() {
            return Err(ClientError::transport_fatal("queue closed"));
        }
        self.push(channel, frame);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_open()
    }
}

impl ReplicaLink for QueueLink {
    fn send(&self, channel: Channel, frame: Vec<u8>) -> ServerResult<()> {
        if !self.is_open() {
            return Err(ServerError::Delivery("queue disconnected".into()));
        }
        self.push(channel, frame);
        Ok(())
    }
}

/// One replica and its two queues.
struct Endpoint<T: DataUnit> {
    replica: Arc<ClientSynchronisedData<T>>,
    outbound: Arc<QueueLink>,
    inbound: Arc<QueueLink>,
    subscription: Option<ReplicaId>,
}

/// An authority, its request handler and any number of replicas.
pub struct LoopbackNetwork<T: DataUnit> {
    handler: RequestHandler<T>,
    endpoints: Vec<Endpoint<T>>,
}

impl<T: DataUnit> LoopbackNetwork<T> {
    /// Creates a network around a fresh authority.
    pub fn new(config: ServerConfig) -> Self {
        let authority = Arc::new(ServerSynchronisedData::new(config));
        Self {
            handler: RequestHandler::new(authority),
            endpoints: Vec::new(),
        }
    }

    /// The authority.
    pub fn authority(&self) -> &Arc<ServerSynchronisedData<T>> {
        self.handler.authority()
    }

    /// Adds a subscribed replica. Returns its position.
    pub fn add_replica(&mut self, config: ClientConfig) -> usize {
        let outbound = Arc::new(QueueLink::new());
        let inbound = Arc::new(QueueLink::new());
        let replica = Arc::new(ClientSynchronisedData::new(config, outbound.clone()));
        let subscription = Some(self.authority().subscribe(inbound.clone()));
        self.endpoints.push(Endpoint {
            replica,
            outbound,
            inbound,
            subscription,
        });
        self.endpoints.len() - 1
    }

    /// The replica at position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn replica(&self, i: usize) -> &Arc<ClientSynchronisedData<T>> {
        &self.endpoints[i].replica
    }

    /// Number of replicas.
    pub fn replica_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Unsubscribes replica `i` and closes both of its queues.
    pub fn disconnect(&mut self, i: usize) {
        let endpoint = &mut self.endpoints[i];
        if let Some(id) = endpoint.subscription.take() {
            self.handler.authority().unsubscribe(id);
        }
        endpoint.outbound.set_connected(false);
        endpoint.inbound.set_connected(false);
    }

    /// Hands every queued request to the authority and queues the replies.
    ///
    /// Returns the number of requests delivered.
    pub fn deliver_requests(&self) -> usize {
        let mut delivered = 0;
        for endpoint in &self.endpoints {
            for (channel, frame) in endpoint.outbound.drain() {
                delivered += 1;
                if let Some(reply) = self.handler.serve_frame(channel, &frame) {
                    // A closed inbound queue loses the reply, like a dead socket.
                    let _ = ReplicaLink::send(endpoint.inbound.as_ref(), channel, reply);
                }
            }
        }
        delivered
    }

    /// Hands every queued reply and push to its replica.
    ///
    /// Returns the number of frames delivered.
    pub fn deliver_responses(&self) -> usize {
        let mut delivered = 0;
        for endpoint in &self.endpoints {
            for (channel, frame) in endpoint.inbound.drain() {
                delivered += 1;
                endpoint.replica.receive_frame(channel, &frame);
            }
        }
        delivered
    }

    /// Hands each replica its queued frames on `channels` only.
    ///
    /// Frames on other channels stay queued, so this stages replies that
    /// overtake, or fall behind, traffic on another channel.
    pub fn deliver_responses_on(&self, channels: &[Channel]) -> usize {
        let mut delivered = 0;
        for endpoint in &self.endpoints {
            for (channel, frame) in endpoint.inbound.drain_channels(channels) {
                delivered += 1;
                endpoint.replica.receive_frame(channel, &frame);
            }
        }
        delivered
    }

    /// Delivers in both directions until every queue is empty.
    pub fn deliver_all(&self) -> usize {
        let mut total = 0;
        loop {
            let moved = self.deliver_requests() + self.deliver_responses();
            if moved == 0 {
                return total;
            }
            total += moved;
        }
    }

    /// Discards the pushes queued for replica `i`.
    pub fn drop_pushes(&self, i: usize) -> usize {
        self.endpoints[i].inbound.discard(Channel::ChecksumPush)
    }

    /// Discards everything queued for replica `i`, replies included.
    pub fn drop_inbound(&self, i: usize) -> usize {
        self.endpoints[i].inbound.drain().len()
    }

    /// Requests waiting to reach the authority.
    pub fn pending_requests(&self) -> usize {
        self.endpoints.iter().map(|e| e.outbound.len()).sum()
    }

    /// Replies and pushes waiting to reach replica `i`.
    pub fn pending_inbound(&self, i: usize) -> usize {
        self.endpoints[i].inbound.len()
    }
}

//! Push delivery to subscribed replicas.

use crate::error::ServerResult;
use crate::store::PageChange;
use pagesync_protocol::{
    Channel, Checksum, ChecksumsUpdatedPush, ItemIndex, PageId, SyncMessage,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Outbound byte pipe from the authority to one replica.
///
/// Implementations hand the frame to whatever carries it (a socket, a
/// queue, a game-engine packet). Sending must not call back into the
/// authority.
pub trait ReplicaLink: Send + Sync {
    /// Sends one frame on `channel`.
    fn send(&self, channel: Channel, frame: Vec<u8>) -> ServerResult<()>;
}

/// Handle of a subscribed replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplicaId(u64);

impl ReplicaId {
    /// Raw numeric id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica#{}", self.0)
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Broadcast {
    pub(crate) delivered: u64,
    pub(crate) failed: u64,
}

/// Registry of replica links.
pub(crate) struct Subscribers {
    links: RwLock<HashMap<ReplicaId, Arc<dyn ReplicaLink>>>,
    next_id: AtomicU64,
}

impl Subscribers {
    pub(crate) fn new() -> Self {
        Self {
            links: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn subscribe(&self, link: Arc<dyn ReplicaLink>) -> ReplicaId {
        let id = ReplicaId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.links.write().insert(id, link);
        id
    }

    pub(crate) fn unsubscribe(&self, id: ReplicaId) -> bool {
        self.links.write().remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.links.read().len()
    }

    /// Sends a push to every subscriber. Failures are logged and counted.
    pub(crate) fn broadcast(&self, push: ChecksumsUpdatedPush) -> Broadcast {
        let page = push.page;
        let frame = match SyncMessage::ChecksumsUpdated(push).encode_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(page, error = %e, "failed to encode checksum push");
                return Broadcast::default();
            }
        };

        // Snapshot the links so a slow send never holds the registry lock.
        let links: Vec<(ReplicaId, Arc<dyn ReplicaLink>)> = self
            .links
            .read()
            .iter()
            .map(|(id, link)| (*id, Arc::clone(link)))
            .collect();

        let mut outcome = Broadcast::default();
        for (id, link) in links {
            match link.send(Channel::ChecksumPush, frame.clone()) {
                Ok(()) => {
                    trace!(page, replica = %id, "checksum push sent");
                    outcome.delivered += 1;
                }
                Err(e) => {
                    warn!(page, replica = %id, error = %e, "checksum push not delivered");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}

/// Changes to one page accumulated since the last flush.
#[derive(Default)]
struct PendingPage {
    page_removed: bool,
    updated: HashMap<ItemIndex, Checksum>,
    removed: HashSet<ItemIndex>,
}

impl PendingPage {
    fn merge(&mut self, change: PageChange) {
        match change {
            PageChange::Updated {
                updated, removed, ..
            } => {
                for (index, checksum) in updated {
                    self.removed.remove(&index);
                    self.updated.insert(index, checksum);
                }
                for index in removed {
                    self.updated.remove(&index);
                    self.removed.insert(index);
                }
            }
            PageChange::Removed { .. } => {
                self.page_removed = true;
                self.updated.clear();
                self.removed.clear();
            }
        }
    }

    /// Pushes that reproduce the accumulated changes, removal first.
    fn into_pushes(self, page: PageId, out: &mut Vec<ChecksumsUpdatedPush>) {
        if self.page_removed {
            out.push(ChecksumsUpdatedPush::removed(page));
        }
        if self.updated.is_empty() && self.removed.is_empty() {
            return;
        }
        let mut updated: Vec<_> = self.updated.into_iter().collect();
        updated.sort_unstable_by_key(|(index, _)| *index);
        let mut removed: Vec<_> = self.removed.into_iter().collect();
        removed.sort_unstable();
        out.push(ChecksumsUpdatedPush::updated(page, updated, removed));
    }
}

/// Coalesces page changes for batched pushes.
pub(crate) struct PendingPushes {
    pages: Mutex<BTreeMap<PageId, PendingPage>>,
}

impl PendingPushes {
    pub(crate) fn new() -> Self {
        Self {
            pages: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn record(&self, change: PageChange) {
        self.pages
            .lock()
            .entry(change.page())
            .or_default()
            .merge(change);
    }

    /// Number of pages with pending changes.
    pub(crate) fn len(&self) -> usize {
        self.pages.lock().len()
    }

    /// Takes every pending change as pushes, ordered by page.
    pub(crate) fn drain(&self) -> Vec<ChecksumsUpdatedPush> {
        let pages = std::mem::take(&mut *self.pages.lock());
        let mut pushes = Vec::with_capacity(pages.len());
        for (page, pending) in pages {
            pending.into_pushes(page, &mut pushes);
        }
        pushes
    }
}

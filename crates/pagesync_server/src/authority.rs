//! The authoritative synchronised data store.

use crate::config::{PushMode, ServerConfig};
use crate::notify::{PendingPushes, ReplicaId, ReplicaLink, Subscribers};
use crate::store::{DataDiff, PageChange, PageStore};
use pagesync_protocol::{Checksum, ChecksumsUpdatedPush, DataUnit, ItemIndex, PageId};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Counters kept by the authority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorityStats {
    /// Pushes broadcast to subscribers.
    pub pushes_broadcast: u64,
    /// Individual push sends that succeeded.
    pub push_deliveries: u64,
    /// Individual push sends that failed.
    pub push_failures: u64,
    /// Checksum queries answered.
    pub checksum_requests_served: u64,
    /// Data-diff queries answered.
    pub diff_requests_served: u64,
    /// Requests rejected as malformed or over a limit.
    pub requests_rejected: u64,
}

/// Canonical store of paged data units.
///
/// Every mutation recomputes the affected checksums and, depending on the
/// configured [`PushMode`], either broadcasts a push right away or queues it
/// for [`flush_notifications`](Self::flush_notifications).
pub struct ServerSynchronisedData<T: DataUnit> {
    config: ServerConfig,
    store: PageStore<T>,
    subscribers: Subscribers,
    pending: PendingPushes,
    stats: RwLock<AuthorityStats>,
}

impl<T: DataUnit> ServerSynchronisedData<T> {
    /// Creates an empty authority.
    pub fn new(config: ServerConfig) -> Self {
        info!(id = %config.id, mode = ?config.push_mode, "authority created");
        Self {
            config,
            store: PageStore::new(),
            subscribers: Subscribers::new(),
            pending: PendingPushes::new(),
            stats: RwLock::new(AuthorityStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Checksums of every item on `page`, sorted by index.
    ///
    /// Returns `None` when the page does not exist.
    pub fn get_checksums(&self, page: PageId) -> Option<Vec<(ItemIndex, Checksum)>> {
        self.store.checksums(page)
    }

    /// Current content of the requested items of `page`.
    ///
    /// Requested indices the page does not hold are listed in
    /// `removed_indices`. Returns `None` when the page does not exist.
    pub fn get_data_diff(&self, page: PageId, indices: &[ItemIndex]) -> Option<DataDiff<T>> {
        self.store.data_diff(page, indices)
    }

    /// Returns one item.
    pub fn get_item(&self, page: PageId, index: ItemIndex) -> Option<T> {
        self.store.get(page, index)
    }

    /// Ids of all existing pages, sorted.
    pub fn page_ids(&self) -> Vec<PageId> {
        self.store.page_ids()
    }

    /// Returns true if `page` exists.
    pub fn contains_page(&self, page: PageId) -> bool {
        self.store.contains_page(page)
    }

    /// Number of items on `page`.
    pub fn page_len(&self, page: PageId) -> usize {
        self.store.page_len(page)
    }

    /// Number of existing pages.
    pub fn page_count(&self) -> usize {
        self.store.len()
    }

    /// Inserts or replaces one item.
    pub fn set_item(&self, page: PageId, index: ItemIndex, unit: T) {
        self.set_items(page, [(index, unit)]);
    }

    /// Inserts or replaces several items of one page as a single change.
    pub fn set_items<I>(&self, page: PageId, items: I)
    where
        I: IntoIterator<Item = (ItemIndex, T)>,
    {
        if let Some(change) = self.store.set_items(page, items) {
            self.publish(change);
        }
    }

    /// Removes one item. Returns false if it did not exist.
    ///
    /// Removing the last item of a page removes the page.
    pub fn remove_item(&self, page: PageId, index: ItemIndex) -> bool {
        self.remove_items(page, &[index])
    }

    /// Removes several items of one page. Returns false if none existed.
    pub fn remove_items(&self, page: PageId, indices: &[ItemIndex]) -> bool {
        match self.store.remove_items(page, indices) {
            Some(change) => {
                self.publish(change);
                true
            }
            None => false,
        }
    }

    /// Removes a whole page. Returns false if it did not exist.
    pub fn remove_page(&self, page: PageId) -> bool {
        match self.store.remove_page(page) {
            Some(change) => {
                self.publish(change);
                true
            }
            None => false,
        }
    }

    /// Registers a replica to receive checksum pushes.
    pub fn subscribe(&self, link: Arc<dyn ReplicaLink>) -> ReplicaId {
        let id = self.subscribers.subscribe(link);
        debug!(replica = %id, "replica subscribed");
        id
    }

    /// Stops pushing to a replica. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: ReplicaId) -> bool {
        let removed = self.subscribers.unsubscribe(id);
        if removed {
            debug!(replica = %id, "replica unsubscribed");
        }
        removed
    }

    /// Number of subscribed replicas.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Broadcasts every queued push. Returns the number of pushes sent.
    ///
    /// Does nothing useful in [`PushMode::Immediate`], where nothing queues.
    pub fn flush_notifications(&self) -> usize {
        let pushes = self.pending.drain();
        let count = pushes.len();
        for push in pushes {
            self.broadcast(push);
        }
        if count > 0 {
            debug!(count, "flushed batched pushes");
        }
        count
    }

    /// Number of pages with queued changes.
    pub fn pending_notifications(&self) -> usize {
        self.pending.len()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> AuthorityStats {
        self.stats.read().clone()
    }

    pub(crate) fn record_checksum_request(&self) {
        self.stats.write().checksum_requests_served += 1;
    }

    pub(crate) fn record_diff_request(&self) {
        self.stats.write().diff_requests_served += 1;
    }

    pub(crate) fn record_rejected(&self) {
        self.stats.write().requests_rejected += 1;
    }

    fn publish(&self, change: PageChange) {
        debug!(page = change.page(), ?change, "page changed");
        match self.config.push_mode {
            PushMode::Immediate => self.broadcast(change.into_push()),
            PushMode::Batched => self.pending.record(change),
        }
    }

    fn broadcast(&self, push: ChecksumsUpdatedPush) {
        let outcome = self.subscribers.broadcast(push);
        let mut stats = self.stats.write();
        stats.pushes_broadcast += 1;
        stats.push_deliveries += outcome.delivered;
        stats.push_failures += outcome.failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerResult;
    use pagesync_protocol::{Channel, SyncMessage};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingLink {
        pushes: Mutex<Vec<ChecksumsUpdatedPush>>,
    }

    impl RecordingLink {
        fn take(&self) -> Vec<ChecksumsUpdatedPush> {
            std::mem::take(&mut *self.pushes.lock())
        }
    }

    impl ReplicaLink for RecordingLink {
        fn send(&self, channel: Channel, frame: Vec<u8>) -> ServerResult<()> {
            assert_eq!(channel, Channel::ChecksumPush);
            match SyncMessage::decode_frame(&frame)? {
                SyncMessage::ChecksumsUpdated(push) => self.pushes.lock().push(push),
                other => panic!("unexpected push {other:?}"),
            }
            Ok(())
        }
    }

    fn unit(text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    fn authority(mode: PushMode) -> (ServerSynchronisedData<Vec<u8>>, Arc<RecordingLink>) {
        let authority =
            ServerSynchronisedData::new(ServerConfig::new("test").with_push_mode(mode));
        let link = Arc::new(RecordingLink::default());
        authority.subscribe(link.clone());
        (authority, link)
    }

    #[test]
    fn set_item_pushes_new_checksum() {
        let (authority, link) = authority(PushMode::Immediate);
        authority.set_item(1, 0, unit("A"));

        assert_eq!(
            link.take(),
            vec![ChecksumsUpdatedPush::updated(1, vec![(0, Checksum::of(b"A"))], vec![])]
        );
        assert_eq!(authority.get_checksums(1).unwrap(), vec![(0, Checksum::of(b"A"))]);
        assert_eq!(authority.get_item(1, 0), Some(unit("A")));
    }

    #[test]
    fn unchanged_set_does_not_push() {
        let (authority, link) = authority(PushMode::Immediate);
        authority.set_item(1, 0, unit("A"));
        link.take();

        authority.set_item(1, 0, unit("A"));
        assert!(link.take().is_empty());
        assert_eq!(authority.stats().pushes_broadcast, 1);
    }

    #[test]
    fn item_removal_pushes_removed_index() {
        let (authority, link) = authority(PushMode::Immediate);
        authority.set_items(1, [(0, unit("A")), (1, unit("B"))]);
        link.take();

        assert!(authority.remove_item(1, 0));
        assert_eq!(link.take(), vec![ChecksumsUpdatedPush::updated(1, vec![], vec![0])]);

        assert!(!authority.remove_item(1, 0));
        assert!(link.take().is_empty());
    }

    #[test]
    fn removing_last_item_pushes_page_removal() {
        let (authority, link) = authority(PushMode::Immediate);
        authority.set_item(4, 2, unit("X"));
        link.take();

        assert!(authority.remove_item(4, 2));
        assert_eq!(link.take(), vec![ChecksumsUpdatedPush::removed(4)]);
        assert!(authority.get_checksums(4).is_none());
        assert!(authority.get_data_diff(4, &[2]).is_none());
    }

    #[test]
    fn remove_page_pushes_removal() {
        let (authority, link) = authority(PushMode::Immediate);
        authority.set_items(2, [(0, unit("A")), (1, unit("B"))]);
        link.take();

        assert!(authority.remove_page(2));
        assert!(!authority.remove_page(2));
        assert_eq!(link.take(), vec![ChecksumsUpdatedPush::removed(2)]);
        assert_eq!(authority.page_count(), 0);
    }

    #[test]
    fn batched_mode_waits_for_flush() {
        let (authority, link) = authority(PushMode::Batched);
        authority.set_item(1, 0, unit("A"));
        authority.set_item(1, 1, unit("B"));
        authority.set_item(2, 0, unit("C"));

        assert!(link.take().is_empty());
        assert_eq!(authority.pending_notifications(), 2);

        assert_eq!(authority.flush_notifications(), 2);
        let pushes = link.take();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[0].page, 1);
        assert_eq!(
            pushes[0].updated,
            vec![(0, Checksum::of(b"A")), (1, Checksum::of(b"B"))]
        );
        assert_eq!(pushes[1].page, 2);

        assert_eq!(authority.flush_notifications(), 0);
    }

    #[test]
    fn unsubscribed_replica_gets_nothing() {
        let (authority, link) = authority(PushMode::Immediate);
        let other = Arc::new(RecordingLink::default());
        let id = authority.subscribe(other.clone());
        assert_eq!(authority.subscriber_count(), 2);

        assert!(authority.unsubscribe(id));
        authority.set_item(1, 0, unit("A"));

        assert!(other.take().is_empty());
        assert_eq!(link.take().len(), 1);
        assert_eq!(authority.stats().push_deliveries, 1);
    }

    #[test]
    fn data_diff_reports_missing_items() {
        let (authority, _link) = authority(PushMode::Immediate);
        authority.set_items(1, [(0, unit("A")), (2, unit("C"))]);

        let diff = authority.get_data_diff(1, &[0, 1, 2]).unwrap();
        assert_eq!(diff.new_data, vec![(0, unit("A")), (2, unit("C"))]);
        assert_eq!(diff.removed_indices, vec![1]);
    }
}

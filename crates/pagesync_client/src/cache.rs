//! Replica-side page cache.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::ServerLink;
use pagesync_protocol::{
    Checksum, ChecksumRequest, DataDiffRequest, DataUnit, ItemIndex, PageId, SyncMessage,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

type ChecksumMap = HashMap<ItemIndex, Checksum>;

/// Counters kept by a replica.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaStats {
    /// Checksum requests sent.
    pub checksum_requests: u64,
    /// Data-diff requests sent (after chunking).
    pub diff_requests: u64,
    /// Pooling calls answered without sending anything.
    pub cache_hits: u64,
    /// Pages evicted.
    pub purges: u64,
    /// Responses applied.
    pub responses_applied: u64,
    /// Pushes applied.
    pub pushes_applied: u64,
    /// Inbound packets dropped as malformed or misrouted.
    pub packets_dropped: u64,
}

/// What a pooling call has to send.
#[derive(Debug, PartialEq, Eq)]
enum Pooling {
    /// No authority checksums are known for the page.
    NeedChecksums,
    /// Every held payload matches the advertisement.
    Fresh,
    /// These indices are stale or missing, sorted.
    NeedData(Vec<ItemIndex>),
    /// Pruning alone brought the page up to date.
    Pruned,
}

/// The three per-page maps plus counters, guarded by one lock.
pub(crate) struct ReplicaState<T> {
    /// Last known authority advertisement.
    authority: HashMap<PageId, ChecksumMap>,
    /// Checksums of the payloads actually held.
    local: HashMap<PageId, ChecksumMap>,
    payloads: HashMap<PageId, HashMap<ItemIndex, T>>,
    pub(crate) stats: ReplicaStats,
}

impl<T: DataUnit> ReplicaState<T> {
    fn new() -> Self {
        Self {
            authority: HashMap::new(),
            local: HashMap::new(),
            payloads: HashMap::new(),
            stats: ReplicaStats::default(),
        }
    }

    fn plan(&mut self, page: PageId) -> Pooling {
        let Some(advertised) = self.authority.get(&page) else {
            return Pooling::NeedChecksums;
        };
        let empty = ChecksumMap::new();
        if self.local.get(&page).unwrap_or(&empty) == advertised {
            return Pooling::Fresh;
        }
        match self.stale_indices(page) {
            Some(indices) => Pooling::NeedData(indices),
            None => Pooling::Pruned,
        }
    }

    /// Prunes unadvertised payloads, then lists the indices to fetch.
    fn stale_indices(&mut self, page: PageId) -> Option<Vec<ItemIndex>> {
        let advertised = self.authority.get(&page)?;

        if let Some(local) = self.local.get_mut(&page) {
            local.retain(|index, _| advertised.contains_key(index));
        }
        if let Some(payloads) = self.payloads.get_mut(&page) {
            payloads.retain(|index, _| advertised.contains_key(index));
        }

        let local = self.local.get(&page);
        let mut stale: Vec<ItemIndex> = advertised
            .iter()
            .filter(|&(index, checksum)| local.and_then(|l| l.get(index)) != Some(checksum))
            .map(|(index, _)| *index)
            .collect();
        if stale.is_empty() {
            return None;
        }
        stale.sort_unstable();
        Some(stale)
    }

    pub(crate) fn purge(&mut self, page: PageId) -> bool {
        let a = self.authority.remove(&page).is_some();
        let l = self.local.remove(&page).is_some();
        let p = self.payloads.remove(&page).is_some();
        let purged = a || l || p;
        if purged {
            self.stats.purges += 1;
        }
        purged
    }

    /// Replaces the advertisement of `page`.
    pub(crate) fn set_advertisement(
        &mut self,
        page: PageId,
        checksums: Vec<(ItemIndex, Checksum)>,
    ) {
        self.authority.insert(page, checksums.into_iter().collect());
    }

    /// Stores delivered payloads and forgets removed ones.
    ///
    /// The advertisement is only ever replaced by a checksum response or
    /// amended by a push. A reply that contradicts it (a delivered checksum
    /// it does not list, or a removed index it still lists) drops it, so
    /// the next pooling call asks for a fresh snapshot. Returns true if the
    /// advertisement was dropped.
    pub(crate) fn store_data(
        &mut self,
        page: PageId,
        units: Vec<(ItemIndex, T)>,
        removed: &[ItemIndex],
    ) -> bool {
        let units: Vec<(ItemIndex, Checksum, T)> = units
            .into_iter()
            .map(|(index, unit)| (index, unit.checksum(), unit))
            .collect();

        let contradicted = self.authority.get(&page).is_some_and(|advertised| {
            units
                .iter()
                .any(|(index, checksum, _)| advertised.get(index) != Some(checksum))
                || removed.iter().any(|index| advertised.contains_key(index))
        });
        if contradicted {
            self.authority.remove(&page);
        }

        if !units.is_empty() {
            let local = self.local.entry(page).or_default();
            let payloads = self.payloads.entry(page).or_default();
            for (index, checksum, unit) in units {
                local.insert(index, checksum);
                payloads.insert(index, unit);
            }
        }
        for index in removed {
            if let Some(map) = self.local.get_mut(&page) {
                map.remove(index);
            }
            if let Some(map) = self.payloads.get_mut(&page) {
                map.remove(index);
            }
        }
        contradicted
    }

    /// Merges pushed checksum changes into the advertisement.
    ///
    /// A push only amends a known snapshot; for a page without one it is
    /// ignored and returns false.
    pub(crate) fn merge_advertisement(
        &mut self,
        page: PageId,
        updated: Vec<(ItemIndex, Checksum)>,
        removed: &[ItemIndex],
    ) -> bool {
        let Some(map) = self.authority.get_mut(&page) else {
            return false;
        };
        map.extend(updated);
        for index in removed {
            map.remove(index);
        }
        true
    }

    fn clear(&mut self) -> usize {
        let pages: HashSet<PageId> = self
            .authority
            .keys()
            .chain(self.local.keys())
            .chain(self.payloads.keys())
            .copied()
            .collect();
        self.authority.clear();
        self.local.clear();
        self.payloads.clear();
        pages.len()
    }
}

/// Replica of an authority's paged data.
///
/// Nothing here blocks on the network: [`try_pool_data_update`] returns
/// whatever is cached and sends the request that moves the cache closer
/// to the authority. Replies are fed back through
/// [`handle_frame`](Self::handle_frame).
///
/// [`try_pool_data_update`]: Self::try_pool_data_update
pub struct ClientSynchronisedData<T: DataUnit> {
    config: ClientConfig,
    link: Arc<dyn ServerLink>,
    pub(crate) state: Mutex<ReplicaState<T>>,
}

impl<T: DataUnit> ClientSynchronisedData<T> {
    /// Creates an empty replica that talks to the authority through `link`.
    pub fn new(config: ClientConfig, link: Arc<dyn ServerLink>) -> Self {
        Self {
            config,
            link,
            state: Mutex::new(ReplicaState::new()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the cached items of `page` and requests whatever is missing.
    ///
    /// - No authority checksums known: sends a checksum request.
    /// - Held payloads match the advertisement: sends nothing.
    /// - Otherwise: drops payloads the authority no longer advertises and
    ///   sends data-diff requests for the stale or missing indices.
    ///
    /// Send failures are logged, retryable ones at debug level; either way
    /// the next call plans and sends afresh.
    pub fn try_pool_data_update(&self, page: PageId) -> Option<HashMap<ItemIndex, T>> {
        let (plan, cached) = {
            let mut state = self.state.lock();
            let plan = state.plan(page);
            if plan == Pooling::Fresh {
                state.stats.cache_hits += 1;
            }
            (plan, state.payloads.get(&page).cloned())
        };

        let sent = match plan {
            Pooling::NeedChecksums => self.request_checksums_update(page).map(|()| 1),
            Pooling::NeedData(indices) => self.send_data_requests(page, indices),
            Pooling::Fresh => {
                trace!(page, "page is up to date");
                Ok(0)
            }
            Pooling::Pruned => {
                trace!(page, "page is up to date after pruning");
                Ok(0)
            }
        };
        match sent {
            Err(e) if e.is_retryable() => {
                debug!(page, error = %e, "page update request not sent, retrying on next call");
            }
            Err(e) => {
                warn!(page, error = %e, "failed to request page update");
            }
            Ok(_) => {}
        }
        cached
    }

    /// Asks the authority for the current checksums of `page`.
    pub fn request_checksums_update(&self, page: PageId) -> ClientResult<()> {
        self.send(SyncMessage::ChecksumRequest(ChecksumRequest::new(page)))?;
        self.state.lock().stats.checksum_requests += 1;
        debug!(page, "checksum request sent");
        Ok(())
    }

    /// Prunes `page` and requests every index whose payload is stale.
    ///
    /// Returns the number of requests sent; zero when nothing is stale or
    /// no advertisement is known yet.
    pub fn request_update_data(&self, page: PageId) -> ClientResult<usize> {
        let stale = self.state.lock().stale_indices(page);
        match stale {
            Some(indices) => self.send_data_requests(page, indices),
            None => Ok(0),
        }
    }

    fn send_data_requests(&self, page: PageId, indices: Vec<ItemIndex>) -> ClientResult<usize> {
        let mut sent = 0;
        for chunk in indices.chunks(self.config.chunk_size()) {
            self.send(SyncMessage::DataDiffRequest(DataDiffRequest::new(
                page,
                chunk.to_vec(),
            )))?;
            self.state.lock().stats.diff_requests += 1;
            sent += 1;
        }
        debug!(page, indices = indices.len(), requests = sent, "data diff requested");
        Ok(sent)
    }

    fn send(&self, message: SyncMessage) -> ClientResult<()> {
        if !self.link.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let frame = message.encode_frame()?;
        trace!(
            channel = %self.config.channel_name(message.channel()),
            packet = message.name(),
            bytes = frame.len(),
            "sending"
        );
        self.link.send(message.channel(), frame)
    }

    /// Evicts everything cached for `page`. Returns false if nothing was.
    pub fn purge(&self, page: PageId) -> bool {
        let purged = self.state.lock().purge(page);
        if purged {
            debug!(page, "page purged");
        }
        purged
    }

    /// Drops every cached page.
    pub fn close(&self) {
        let pages = self.state.lock().clear();
        debug!(pages, "replica closed");
    }

    /// Currently held payloads of `page`, without sending anything.
    pub fn cached_page(&self, page: PageId) -> Option<HashMap<ItemIndex, T>> {
        self.state.lock().payloads.get(&page).cloned()
    }

    /// One held payload.
    pub fn cached_item(&self, page: PageId, index: ItemIndex) -> Option<T> {
        self.state.lock().payloads.get(&page)?.get(&index).cloned()
    }

    /// Last known authority checksums of `page`.
    pub fn authority_checksums(&self, page: PageId) -> Option<HashMap<ItemIndex, Checksum>> {
        self.state.lock().authority.get(&page).cloned()
    }

    /// Checksums of the payloads held for `page`.
    pub fn local_checksums(&self, page: PageId) -> Option<HashMap<ItemIndex, Checksum>> {
        self.state.lock().local.get(&page).cloned()
    }

    /// Returns true if the held payloads match the last advertisement.
    pub fn is_synchronised(&self, page: PageId) -> bool {
        self.state.lock().plan(page) == Pooling::Fresh
    }

    /// Pages with any cached state, sorted.
    pub fn cached_pages(&self) -> Vec<PageId> {
        let state = self.state.lock();
        let pages: HashSet<PageId> = state
            .authority
            .keys()
            .chain(state.payloads.keys())
            .copied()
            .collect();
        let mut pages: Vec<PageId> = pages.into_iter().collect();
        pages.sort_unstable();
        pages
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> ReplicaStats {
        self.state.lock().stats.clone()
    }

    /// Checks that every page's local checksums match its payloads.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let state = self.state.lock();
        state.payloads.iter().all(|(page, payloads)| {
            let Some(local) = state.local.get(page) else {
                return payloads.is_empty();
            };
            local.len() == payloads.len()
                && payloads
                    .iter()
                    .all(|(i, unit)| local.get(i) == Some(&unit.checksum()))
        }) && state
            .local
            .iter()
            .all(|(page, local)| local.is_empty() || state.payloads.contains_key(page))
    }
}

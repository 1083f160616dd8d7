//! Convergence helpers for sync scenarios.

use crate::network::LoopbackNetwork;
use pagesync_client::ClientSynchronisedData;
use pagesync_protocol::{DataUnit, ItemIndex, PageId};
use pagesync_server::ServerSynchronisedData;
use std::collections::{BTreeSet, HashMap};

/// Full content of an authority page, or `None` if it does not exist.
pub fn authority_page<T: DataUnit>(
    authority: &ServerSynchronisedData<T>,
    page: PageId,
) -> Option<HashMap<ItemIndex, T>> {
    let indices: Vec<ItemIndex> = authority
        .get_checksums(page)?
        .into_iter()
        .map(|(index, _)| index)
        .collect();
    let diff = authority.get_data_diff(page, &indices)?;
    Some(diff.new_data.into_iter().collect())
}

/// Returns true if the replica holds exactly what the authority holds.
///
/// Every authority page must be cached with identical items, and no other
/// page may hold payloads.
pub fn replica_matches<T: DataUnit + PartialEq>(
    authority: &ServerSynchronisedData<T>,
    replica: &ClientSynchronisedData<T>,
) -> bool {
    let authority_pages = authority.page_ids();
    let authority_matches = authority_pages
        .iter()
        .all(|page| replica.cached_page(*page) == authority_page(authority, *page));
    let no_stale_pages = replica
        .cached_pages()
        .into_iter()
        .filter(|page| !authority_pages.contains(page))
        .all(|page| replica.cached_page(page).map_or(true, |items| items.is_empty()));
    authority_matches && no_stale_pages
}

/// Pools one page until it is synchronised or `max_rounds` pass.
///
/// Returns the final payloads on success.
pub fn converge_page<T: DataUnit>(
    network: &LoopbackNetwork<T>,
    replica: usize,
    page: PageId,
    max_rounds: usize,
) -> Option<HashMap<ItemIndex, T>> {
    let client = network.replica(replica);
    for _ in 0..max_rounds {
        let cached = client.try_pool_data_update(page);
        if network.deliver_all() == 0 && client.is_synchronised(page) {
            return cached;
        }
    }
    None
}

/// Pools every page either side knows until the replica matches the authority.
///
/// Nothing but [`ClientSynchronisedData::try_pool_data_update`] and delivery
/// is used. Returns the number of rounds used, or `None` if the replica
/// still differs after `max_rounds`.
pub fn pool_until_matching<T: DataUnit + PartialEq>(
    network: &LoopbackNetwork<T>,
    replica: usize,
    max_rounds: usize,
) -> Option<usize> {
    let client = network.replica(replica);
    let authority = network.authority();
    for round in 1..=max_rounds {
        let pages: BTreeSet<PageId> = authority
            .page_ids()
            .into_iter()
            .chain(client.cached_pages())
            .collect();
        for &page in &pages {
            client.try_pool_data_update(page);
        }
        network.deliver_all();
        if replica_matches(authority, client) {
            return Some(round);
        }
    }
    None
}

/// Revalidates every known page of a replica until it matches the authority.
///
/// Each round asks for fresh checksums of every page either side knows,
/// then pools them. This recovers from lost pushes, which pooling alone
/// cannot detect. Returns the number of rounds used, or `None` if the
/// replica still differs after `max_rounds`.
pub fn converge_replica<T: DataUnit + PartialEq>(
    network: &LoopbackNetwork<T>,
    replica: usize,
    max_rounds: usize,
) -> Option<usize> {
    let client = network.replica(replica);
    let authority = network.authority();
    for round in 1..=max_rounds {
        let pages: BTreeSet<PageId> = authority
            .page_ids()
            .into_iter()
            .chain(client.cached_pages())
            .collect();
        for &page in &pages {
            // A failed send shows up as a mismatch below.
            let _ = client.request_checksums_update(page);
        }
        network.deliver_all();
        for &page in &pages {
            client.try_pool_data_update(page);
        }
        network.deliver_all();
        if replica_matches(authority, client) {
            return Some(round);
        }
    }
    None
}

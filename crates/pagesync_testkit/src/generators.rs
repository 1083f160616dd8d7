//! Property-based test generators using proptest.
//!
//! Page and index ranges are kept small so that random operations collide
//! often: the same item gets overwritten, removed and recreated.

use crate::network::LoopbackNetwork;
use crate::unit::TestUnit;
use pagesync_protocol::{Channel, DataUnit, ItemIndex, PageId};
use pagesync_server::ServerSynchronisedData;
use proptest::prelude::*;

/// One mutation of the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOp {
    /// Upsert one item.
    Set {
        /// Target page.
        page: PageId,
        /// Target item.
        index: ItemIndex,
        /// New content.
        unit: TestUnit,
    },
    /// Remove one item.
    Remove {
        /// Target page.
        page: PageId,
        /// Target item.
        index: ItemIndex,
    },
    /// Remove a whole page.
    RemovePage {
        /// Target page.
        page: PageId,
    },
}

impl PageOp {
    /// Applies the operation to an authority.
    pub fn apply(&self, authority: &ServerSynchronisedData<TestUnit>) {
        match self {
            PageOp::Set { page, index, unit } => authority.set_item(*page, *index, unit.clone()),
            PageOp::Remove { page, index } => {
                authority.remove_item(*page, *index);
            }
            PageOp::RemovePage { page } => {
                authority.remove_page(*page);
            }
        }
    }

    /// The page the operation touches.
    pub fn page(&self) -> PageId {
        match self {
            PageOp::Set { page, .. } | PageOp::Remove { page, .. } | PageOp::RemovePage { page } => {
                *page
            }
        }
    }
}

/// One event of an interleaved session between an authority and a replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStep {
    /// Mutate the authority; pushes are queued.
    Mutate(PageOp),
    /// Pool one page on the replica.
    Pool(PageId),
    /// Serve queued requests; replies stay queued.
    ServeRequests,
    /// Deliver data-diff replies ahead of everything queued before them.
    DeliverDataDiffs,
    /// Deliver checksum replies and pushes, holding data-diff replies back.
    DeliverOthers,
    /// Deliver everything in order.
    DeliverAll,
    /// The replica reconnects: it loses its cache and every frame queued
    /// for it. Requests already sent are still served.
    Reconnect,
}

impl SyncStep {
    /// Runs the step against replica `replica` of `network`.
    pub fn run(&self, network: &LoopbackNetwork<TestUnit>, replica: usize) {
        match self {
            SyncStep::Mutate(op) => op.apply(network.authority()),
            SyncStep::Pool(page) => {
                network.replica(replica).try_pool_data_update(*page);
            }
            SyncStep::ServeRequests => {
                network.deliver_requests();
            }
            SyncStep::DeliverDataDiffs => {
                network.deliver_responses_on(&[Channel::DataDiffQuery]);
            }
            SyncStep::DeliverOthers => {
                network.deliver_responses_on(&[Channel::ChecksumQuery, Channel::ChecksumPush]);
            }
            SyncStep::DeliverAll => {
                network.deliver_all();
            }
            SyncStep::Reconnect => {
                network.drop_inbound(replica);
                network.replica(replica).close();
            }
        }
    }
}

/// Strategy for page ids in a small range.
pub fn page_id_strategy() -> impl Strategy<Value = PageId> {
    0u64..6
}

/// Strategy for item indices in a small range.
pub fn item_index_strategy() -> impl Strategy<Value = ItemIndex> {
    0u32..24
}

/// Strategy for test units.
pub fn test_unit_strategy() -> impl Strategy<Value = TestUnit> {
    (
        any::<i64>(),
        prop::string::string_regex("[a-z]{0,12}").expect("Invalid regex"),
    )
        .prop_map(|(value, label)| TestUnit::new(value, label))
}

/// Strategy for arbitrary encoded payloads, valid or not.
pub fn payload_bytes_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for one authority mutation, weighted towards upserts.
pub fn page_op_strategy() -> impl Strategy<Value = PageOp> {
    prop_oneof![
        6 => (page_id_strategy(), item_index_strategy(), test_unit_strategy())
            .prop_map(|(page, index, unit)| PageOp::Set { page, index, unit }),
        3 => (page_id_strategy(), item_index_strategy())
            .prop_map(|(page, index)| PageOp::Remove { page, index }),
        1 => page_id_strategy().prop_map(|page| PageOp::RemovePage { page }),
    ]
}

/// Strategy for a sequence of mutations.
pub fn page_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<PageOp>> {
    prop::collection::vec(page_op_strategy(), 0..max_len)
}

/// Strategy for one session event, weighted towards mutations and pooling.
pub fn sync_step_strategy() -> impl Strategy<Value = SyncStep> {
    prop_oneof![
        4 => page_op_strategy().prop_map(SyncStep::Mutate),
        4 => page_id_strategy().prop_map(SyncStep::Pool),
        2 => Just(SyncStep::ServeRequests),
        1 => Just(SyncStep::DeliverDataDiffs),
        1 => Just(SyncStep::DeliverOthers),
        1 => Just(SyncStep::DeliverAll),
        1 => Just(SyncStep::Reconnect),
    ]
}

/// Strategy for a session of interleaved events.
pub fn sync_steps_strategy(max_len: usize) -> impl Strategy<Value = Vec<SyncStep>> {
    prop::collection::vec(sync_step_strategy(), 0..max_len)
}

/// Returns true if a unit survives encode then decode unchanged.
pub fn unit_round_trips<T: DataUnit + PartialEq>(unit: &T) -> bool {
    T::decode(&unit.encode()).map_or(false, |decoded| &decoded == unit)
}

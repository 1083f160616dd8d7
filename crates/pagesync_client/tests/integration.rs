//! Integration tests for replica and authority.

use pagesync_client::{ClientResult, ClientSynchronisedData, ServerLink};
use pagesync_protocol::{Channel, ChecksumRequest, DataDiffRequest, SyncMessage};
use pagesync_server::{RequestHandler, ServerSynchronisedData};
use pagesync_testkit::prelude::*;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// A link that answers requests synchronously through a handler, recording
/// what was sent and queueing replies for the test to feed back.
struct DirectLink {
    handler: RequestHandler<TestUnit>,
    sent: Mutex<Vec<SyncMessage>>,
    replies: Mutex<Vec<(Channel, Vec<u8>)>>,
}

impl DirectLink {
    fn new(authority: Arc<ServerSynchronisedData<TestUnit>>) -> Self {
        Self {
            handler: RequestHandler::new(authority),
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
        }
    }

    fn take_sent(&self) -> Vec<SyncMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    fn flush_into(&self, replica: &ClientSynchronisedData<TestUnit>) {
        let replies = std::mem::take(&mut *self.replies.lock());
        for (channel, frame) in replies {
            replica.handle_frame(channel, &frame).unwrap();
        }
    }
}

impl ServerLink for DirectLink {
    fn send(&self, channel: Channel, frame: Vec<u8>) -> ClientResult<()> {
        self.sent.lock().push(SyncMessage::decode_frame(&frame)?);
        if let Some(reply) = self.handler.serve_frame(channel, &frame) {
            self.replies.lock().push((channel, reply));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[test]
fn three_call_scenario_against_real_authority() {
    let authority = Arc::new(ServerSynchronisedData::new(ServerConfig::default()));
    let a = TestUnit::new(1, "A");
    authority.set_item(1, 0, a.clone());

    let link = Arc::new(DirectLink::new(authority));
    let replica = ClientSynchronisedData::new(ClientConfig::default(), link.clone());

    assert!(replica.try_pool_data_update(1).is_none());
    assert_eq!(
        link.take_sent(),
        vec![SyncMessage::ChecksumRequest(ChecksumRequest::new(1))]
    );
    link.flush_into(&replica);

    replica.try_pool_data_update(1);
    assert_eq!(
        link.take_sent(),
        vec![SyncMessage::DataDiffRequest(DataDiffRequest::new(1, vec![0]))]
    );
    link.flush_into(&replica);

    let page = replica.try_pool_data_update(1).unwrap();
    assert_eq!(page, HashMap::from([(0, a)]));
    assert!(link.take_sent().is_empty());
}

#[test]
fn authority_update_reaches_replica() {
    let mut network = LoopbackNetwork::new(ServerConfig::default());
    let r = network.add_replica(ClientConfig::default());

    network.authority().set_item(5, 3, TestUnit::new(10, "first"));
    let page = converge_page(&network, r, 5, 8).unwrap();
    assert_eq!(page[&3], TestUnit::new(10, "first"));

    network.authority().set_item(5, 3, TestUnit::new(11, "second"));
    network.deliver_all();
    assert!(!network.replica(r).is_synchronised(5));

    let page = converge_page(&network, r, 5, 8).unwrap();
    assert_eq!(page[&3], TestUnit::new(11, "second"));
}

#[test]
fn item_removal_is_propagated() {
    let mut network = LoopbackNetwork::new(ServerConfig::default());
    let r = network.add_replica(ClientConfig::default());
    network
        .authority()
        .set_items(1, [(0, TestUnit::new(0, "a")), (1, TestUnit::new(1, "b"))]);
    converge_page(&network, r, 1, 8).unwrap();

    network.authority().remove_item(1, 0);
    let page = converge_page(&network, r, 1, 8).unwrap();

    assert_eq!(page.len(), 1);
    assert!(page.contains_key(&1));
}

#[test]
fn page_removal_purges_replica() {
    let mut network = LoopbackNetwork::new(ServerConfig::default());
    let r = network.add_replica(ClientConfig::default());
    network.authority().set_item(7, 0, TestUnit::new(0, "a"));
    converge_page(&network, r, 7, 8).unwrap();

    network.authority().remove_page(7);
    network.deliver_all();

    let replica = network.replica(r);
    assert!(replica.cached_page(7).is_none());
    assert!(replica.authority_checksums(7).is_none());
    assert_eq!(replica.stats().purges, 1);

    assert!(replica.try_pool_data_update(7).is_none());
    network.deliver_all();
    assert!(replica.try_pool_data_update(7).is_none());
}

#[test]
fn lost_pushes_recovered_by_revalidation() {
    let mut network = LoopbackNetwork::new(ServerConfig::default());
    let r = network.add_replica(ClientConfig::default());
    network.authority().set_item(1, 0, TestUnit::new(0, "a"));
    converge_replica(&network, r, 4).unwrap();

    network.authority().set_item(1, 0, TestUnit::new(1, "b"));
    network.authority().remove_page(1);
    network.authority().set_item(3, 4, TestUnit::new(2, "c"));
    assert_eq!(network.drop_pushes(r), 3);

    // Without the pushes the stale page still looks fresh.
    assert!(network.replica(r).is_synchronised(1));

    converge_replica(&network, r, 4).unwrap();
    assert!(network.replica(r).cached_page(1).is_none());
    assert_eq!(
        network.replica(r).cached_item(3, 4),
        Some(TestUnit::new(2, "c"))
    );
}

#[test]
fn late_reply_for_purged_page_does_not_hide_items() {
    let mut network = LoopbackNetwork::new(ServerConfig::default());
    let r = network.add_replica(ClientConfig::default());
    let authority = network.authority().clone();
    authority.set_items(1, [(0, TestUnit::new(0, "a")), (1, TestUnit::new(1, "b"))]);
    converge_page(&network, r, 1, 8).unwrap();

    authority.set_item(1, 0, TestUnit::new(2, "a2"));
    network.deliver_responses();
    network.replica(r).try_pool_data_update(1);
    assert_eq!(network.pending_requests(), 1);

    authority.remove_page(1);
    network.deliver_responses();
    assert!(network.replica(r).cached_page(1).is_none());

    authority.set_items(1, [(0, TestUnit::new(3, "c")), (1, TestUnit::new(4, "d"))]);
    assert_eq!(network.drop_pushes(r), 1);
    network.deliver_all();
    assert_eq!(network.replica(r).cached_page(1).map(|p| p.len()), Some(1));
    assert!(!network.replica(r).is_synchronised(1));

    let page = converge_page(&network, r, 1, 8).unwrap();
    assert_eq!(Some(page), authority_page(&authority, 1));
}

#[test]
fn reply_overtaking_push_converges_by_pooling() {
    let mut network = LoopbackNetwork::new(ServerConfig::default());
    let r = network.add_replica(ClientConfig::default());
    let authority = network.authority().clone();
    authority.set_items(1, [(0, TestUnit::new(0, "a")), (1, TestUnit::new(1, "b"))]);
    converge_page(&network, r, 1, 8).unwrap();

    authority.set_item(1, 1, TestUnit::new(2, "b2"));
    network.deliver_all();
    network.replica(r).try_pool_data_update(1);
    authority.set_item(1, 1, TestUnit::new(3, "b3"));
    network.deliver_requests();

    assert_eq!(network.deliver_responses_on(&[Channel::DataDiffQuery]), 1);
    assert_eq!(
        network.replica(r).cached_item(1, 1),
        Some(TestUnit::new(3, "b3"))
    );
    network.deliver_all();

    let page = converge_page(&network, r, 1, 8).unwrap();
    assert_eq!(Some(page), authority_page(&authority, 1));
}

#[test]
fn reply_behind_push_does_not_undo_it() {
    let mut network = LoopbackNetwork::new(ServerConfig::default());
    let r = network.add_replica(ClientConfig::default());
    let authority = network.authority().clone();
    authority.set_items(1, [(0, TestUnit::new(0, "a")), (1, TestUnit::new(1, "b"))]);
    converge_page(&network, r, 1, 8).unwrap();

    authority.set_item(1, 1, TestUnit::new(2, "b2"));
    network.deliver_all();
    network.replica(r).try_pool_data_update(1);
    network.deliver_requests();
    authority.set_item(1, 1, TestUnit::new(3, "b3"));

    assert_eq!(
        network.deliver_responses_on(&[Channel::ChecksumQuery, Channel::ChecksumPush]),
        1
    );
    network.deliver_all();
    assert!(!network.replica(r).is_synchronised(1));

    let page = converge_page(&network, r, 1, 8).unwrap();
    assert_eq!(page[&1], TestUnit::new(3, "b3"));
}

#[test]
fn every_replica_converges() {
    let mut network = LoopbackNetwork::new(ServerConfig::default());
    let replicas: Vec<usize> = (0..3)
        .map(|_| network.add_replica(ClientConfig::default()))
        .collect();

    for page in 0..4u64 {
        let items = (0..10u32).map(|i| (i, TestUnit::new(i64::from(i), format!("p{page}i{i}"))));
        network.authority().set_items(page, items);
    }

    for &r in &replicas {
        converge_replica(&network, r, 4).unwrap();
        assert!(replica_matches(
            network.authority().as_ref(),
            network.replica(r).as_ref()
        ));
    }
}

#[test]
fn batched_pushes_arrive_on_flush() {
    let mut network =
        LoopbackNetwork::new(ServerConfig::default().with_push_mode(PushMode::Batched));
    let r = network.add_replica(ClientConfig::default());

    network.authority().set_item(1, 0, TestUnit::new(0, "a"));
    network.authority().flush_notifications();
    converge_page(&network, r, 1, 8).unwrap();

    network.authority().set_item(1, 1, TestUnit::new(1, "b"));
    network.authority().set_item(1, 2, TestUnit::new(2, "c"));
    assert_eq!(network.pending_inbound(r), 0);

    assert_eq!(network.authority().flush_notifications(), 1);
    assert_eq!(network.pending_inbound(r), 1);
    network.deliver_all();

    assert_eq!(network.replica(r).authority_checksums(1).unwrap().len(), 3);
    assert_eq!(network.replica(r).stats().pushes_applied, 2);
}

#[test]
fn small_request_limit_still_converges() {
    let mut network = LoopbackNetwork::new(ServerConfig::default().with_max_request_indices(4));
    let r = network.add_replica(ClientConfig::default().with_max_indices_per_request(4));
    let items = (0..25u32).map(|i| (i, TestUnit::new(i64::from(i), "x")));
    network.authority().set_items(9, items);

    let page = converge_page(&network, r, 9, 8).unwrap();
    assert_eq!(page.len(), 25);
    assert_eq!(network.authority().stats().requests_rejected, 0);
}

#[test]
fn oversized_requests_are_dropped_by_authority() {
    let mut network = LoopbackNetwork::new(ServerConfig::default().with_max_request_indices(4));
    let r = network.add_replica(ClientConfig::default().with_max_indices_per_request(16));
    let items = (0..8u32).map(|i| (i, TestUnit::new(i64::from(i), "x")));
    network.authority().set_items(2, items);

    assert!(converge_page(&network, r, 2, 4).is_none());
    assert!(network.authority().stats().requests_rejected > 0);
    assert!(network.replica(r).cached_page(2).is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn replicas_converge_after_random_mutations(
        ops in page_ops_strategy(80),
        drop_pushes in any::<bool>(),
    ) {
        let mut network = LoopbackNetwork::new(ServerConfig::default());
        let r = network.add_replica(ClientConfig::default().with_max_indices_per_request(5));

        for (step, op) in ops.iter().enumerate() {
            op.apply(network.authority());
            if drop_pushes {
                network.drop_pushes(r);
            }
            if step % 7 == 0 {
                network.replica(r).try_pool_data_update(op.page());
                network.deliver_all();
            }
        }

        prop_assert!(converge_replica(&network, r, 3).is_some());
    }

    #[test]
    fn pooling_alone_converges_after_interleaved_session(
        steps in sync_steps_strategy(120),
    ) {
        let mut network = LoopbackNetwork::new(ServerConfig::default());
        let r = network.add_replica(ClientConfig::default().with_max_indices_per_request(5));

        for step in &steps {
            step.run(&network, r);
        }

        prop_assert!(pool_until_matching(&network, r, 8).is_some());
    }
}

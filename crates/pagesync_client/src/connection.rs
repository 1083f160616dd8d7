//! Inbound packet handling for the replica.

use crate::cache::ClientSynchronisedData;
use crate::error::{ClientError, ClientResult};
use pagesync_protocol::{
    Channel, ChecksumResponse, ChecksumsUpdatedPush, DataDiffResponse, DataUnit, SyncMessage,
};
use tracing::{debug, trace, warn};

impl<T: DataUnit> ClientSynchronisedData<T> {
    /// Applies a checksum response.
    ///
    /// An absent page is purged; otherwise the advertisement is replaced.
    pub fn apply_checksum_response(&self, response: ChecksumResponse) {
        let page = response.page;
        let mut state = self.state.lock();
        state.stats.responses_applied += 1;
        if !response.page_exists {
            state.purge(page);
            debug!(page, "authority reports page absent");
            return;
        }
        trace!(page, items = response.checksums.len(), "checksums received");
        state.set_advertisement(page, response.checksums);
    }

    /// Applies a data-diff response.
    ///
    /// Every payload is decoded before anything is stored; if one fails the
    /// whole packet is dropped and the cache is left untouched. A reply for a
    /// page with no known checksums (purged while the request was in flight)
    /// is stored as a fresh page; the next pooling call fetches checksums.
    pub fn apply_data_diff_response(&self, response: DataDiffResponse) -> ClientResult<()> {
        let page = response.page;
        if !response.page_exists {
            let mut state = self.state.lock();
            state.stats.responses_applied += 1;
            state.purge(page);
            debug!(page, "authority reports page absent");
            return Ok(());
        }

        let units = match response.decode_units::<T>() {
            Ok(units) => units,
            Err(e) => {
                self.state.lock().stats.packets_dropped += 1;
                warn!(page, error = %e, "dropping data diff with undecodable payload");
                return Err(e.into());
            }
        };

        trace!(
            page,
            items = units.len(),
            removed = response.removed_indices.len(),
            "data diff received"
        );
        let mut state = self.state.lock();
        state.stats.responses_applied += 1;
        if state.store_data(page, units, &response.removed_indices) {
            debug!(page, "data diff disagrees with known checksums, revalidating");
        }
        Ok(())
    }

    /// Applies a checksum push. Payloads are left alone.
    ///
    /// Changes for a page without known checksums are ignored: they would
    /// describe only part of it.
    pub fn apply_checksums_pushed(&self, push: ChecksumsUpdatedPush) {
        let page = push.page;
        let mut state = self.state.lock();
        state.stats.pushes_applied += 1;
        if push.was_removed {
            state.purge(page);
            debug!(page, "authority removed page");
            return;
        }
        trace!(
            page,
            updated = push.updated.len(),
            removed = push.removed_indices.len(),
            "checksum push received"
        );
        if !state.merge_advertisement(page, push.updated, &push.removed_indices) {
            trace!(page, "ignoring push for page without checksums");
        }
    }

    /// Dispatches a decoded packet from the authority.
    pub fn handle_message(&self, message: SyncMessage) -> ClientResult<()> {
        match message {
            SyncMessage::ChecksumResponse(response) => {
                self.apply_checksum_response(response);
                Ok(())
            }
            SyncMessage::DataDiffResponse(response) => self.apply_data_diff_response(response),
            SyncMessage::ChecksumsUpdated(push) => {
                self.apply_checksums_pushed(push);
                Ok(())
            }
            other => {
                self.state.lock().stats.packets_dropped += 1;
                Err(ClientError::UnexpectedMessage(other.name()))
            }
        }
    }

    /// Decodes a frame received on `channel` and applies it.
    pub fn handle_frame(&self, channel: Channel, frame: &[u8]) -> ClientResult<()> {
        let message = match SyncMessage::decode_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                self.state.lock().stats.packets_dropped += 1;
                return Err(e.into());
            }
        };

        if message.channel() != channel {
            self.state.lock().stats.packets_dropped += 1;
            return Err(ClientError::ChannelMismatch {
                message: message.name(),
                expected: message.channel(),
                actual: channel,
            });
        }

        self.handle_message(message)
    }

    /// Like [`handle_frame`](Self::handle_frame), but logs and drops failures.
    ///
    /// Returns true if the frame was applied.
    pub fn receive_frame(&self, channel: Channel, frame: &[u8]) -> bool {
        match self.handle_frame(channel, frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(?channel, error = %e, "dropping packet");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::ClientSynchronisedData;
    use crate::config::ClientConfig;
    use crate::error::ClientError;
    use crate::transport::MockLink;
    use pagesync_protocol::{
        Channel, Checksum, ChecksumRequest, ChecksumResponse, ChecksumsUpdatedPush,
        DataDiffResponse, DataUnit, ProtocolError, ProtocolResult, SyncMessage,
    };
    use std::sync::Arc;

    /// A unit that refuses to decode anything starting with 0xff.
    #[derive(Debug, Clone, PartialEq)]
    struct Picky(Vec<u8>);

    impl DataUnit for Picky {
        fn encode(&self) -> Vec<u8> {
            self.0.clone()
        }

        fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
            if bytes.first() == Some(&0xff) {
                return Err(ProtocolError::invalid_payload("reserved prefix"));
            }
            Ok(Picky(bytes.to_vec()))
        }
    }

    fn replica() -> ClientSynchronisedData<Picky> {
        ClientSynchronisedData::new(ClientConfig::default(), Arc::new(MockLink::new()))
    }

    fn frame(message: SyncMessage) -> Vec<u8> {
        message.encode_frame().unwrap()
    }

    fn advertise(replica: &ClientSynchronisedData<Picky>, page: u64, items: &[(u32, &[u8])]) {
        let checksums = items.iter().map(|(i, b)| (*i, Checksum::of(b))).collect();
        replica.apply_checksum_response(ChecksumResponse::present(page, checksums));
    }

    #[test]
    fn matching_data_response_fills_payloads() {
        let replica = replica();
        advertise(&replica, 1, &[(3, &[1, 2])]);
        replica
            .apply_data_diff_response(DataDiffResponse::present(1, vec![(3, vec![1, 2])], vec![]))
            .unwrap();

        let checksum = Checksum::of(&[1, 2]);
        assert_eq!(replica.authority_checksums(1).unwrap()[&3], checksum);
        assert_eq!(replica.local_checksums(1).unwrap()[&3], checksum);
        assert_eq!(replica.cached_item(1, 3), Some(Picky(vec![1, 2])));
        assert!(replica.is_synchronised(1));
    }

    #[test]
    fn data_response_for_unknown_page_stores_without_checksums() {
        let replica = replica();
        replica
            .apply_data_diff_response(DataDiffResponse::present(1, vec![(0, vec![4])], vec![]))
            .unwrap();

        assert_eq!(replica.cached_item(1, 0), Some(Picky(vec![4])));
        assert!(replica.authority_checksums(1).is_none());
        assert!(!replica.is_synchronised(1));
        assert!(replica.is_consistent());
    }

    #[test]
    fn contradicting_data_response_drops_checksums() {
        let replica = replica();
        advertise(&replica, 1, &[(0, &[1]), (1, &[2])]);
        replica
            .apply_data_diff_response(DataDiffResponse::present(1, vec![(0, vec![9])], vec![]))
            .unwrap();

        assert!(replica.authority_checksums(1).is_none());
        assert_eq!(replica.cached_item(1, 0), Some(Picky(vec![9])));

        advertise(&replica, 1, &[(0, &[9]), (1, &[2])]);
        replica
            .apply_data_diff_response(DataDiffResponse::present(1, vec![], vec![1]))
            .unwrap();
        assert!(replica.authority_checksums(1).is_none());
    }

    #[test]
    fn older_data_response_does_not_undo_push() {
        let link = Arc::new(MockLink::new());
        let replica: ClientSynchronisedData<Picky> =
            ClientSynchronisedData::new(ClientConfig::default(), link.clone());
        advertise(&replica, 1, &[(0, &[1])]);
        let newer = Checksum::of(&[2]);
        replica.apply_checksums_pushed(ChecksumsUpdatedPush::updated(1, vec![(0, newer)], vec![]));

        replica
            .apply_data_diff_response(DataDiffResponse::present(1, vec![(0, vec![1])], vec![]))
            .unwrap();

        assert!(!replica.is_synchronised(1));
        assert_eq!(replica.cached_item(1, 0), Some(Picky(vec![1])));
        replica.try_pool_data_update(1);
        assert_eq!(
            link.take_sent(),
            vec![SyncMessage::ChecksumRequest(ChecksumRequest::new(1))]
        );
    }

    #[test]
    fn removed_indices_leave_payloads_and_local_checksums() {
        let replica = replica();
        advertise(&replica, 1, &[(0, &[1]), (1, &[2])]);
        replica
            .apply_data_diff_response(DataDiffResponse::present(
                1,
                vec![(0, vec![1]), (1, vec![2])],
                vec![],
            ))
            .unwrap();
        advertise(&replica, 1, &[(0, &[1])]);
        replica
            .apply_data_diff_response(DataDiffResponse::present(1, vec![], vec![1]))
            .unwrap();

        assert_eq!(replica.cached_page(1).unwrap().len(), 1);
        assert!(!replica.local_checksums(1).unwrap().contains_key(&1));
        assert_eq!(replica.authority_checksums(1).unwrap().len(), 1);
        assert!(replica.is_synchronised(1));
        assert!(replica.is_consistent());
    }

    #[test]
    fn undecodable_payload_drops_whole_packet() {
        let replica = replica();
        let response = DataDiffResponse::present(1, vec![(0, vec![1]), (1, vec![0xff])], vec![]);

        let err = replica.apply_data_diff_response(response).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(replica.cached_page(1).is_none());
        assert_eq!(replica.stats().packets_dropped, 1);
    }

    #[test]
    fn push_merges_without_touching_payloads() {
        let replica = replica();
        advertise(&replica, 1, &[(0, &[1])]);
        replica
            .apply_data_diff_response(DataDiffResponse::present(1, vec![(0, vec![1])], vec![]))
            .unwrap();

        let newer = Checksum::of(&[9]);
        replica.apply_checksums_pushed(ChecksumsUpdatedPush::updated(1, vec![(0, newer)], vec![]));

        assert_eq!(replica.authority_checksums(1).unwrap()[&0], newer);
        assert_eq!(replica.cached_item(1, 0), Some(Picky(vec![1])));
        assert!(!replica.is_synchronised(1));
    }

    #[test]
    fn push_item_removal_updates_advertisement() {
        let replica = replica();
        advertise(&replica, 1, &[(0, &[1]), (1, &[2])]);
        replica.apply_checksums_pushed(ChecksumsUpdatedPush::updated(1, vec![], vec![1]));

        let advertised = replica.authority_checksums(1).unwrap();
        assert_eq!(advertised.len(), 1);
        assert!(advertised.contains_key(&0));
    }

    #[test]
    fn push_for_unknown_page_is_ignored() {
        let replica = replica();
        replica.apply_checksums_pushed(ChecksumsUpdatedPush::updated(8, vec![], vec![0]));
        replica.apply_checksums_pushed(ChecksumsUpdatedPush::updated(
            8,
            vec![(5, Checksum::of(&[5]))],
            vec![],
        ));

        assert!(replica.authority_checksums(8).is_none());
        assert_eq!(replica.stats().pushes_applied, 2);
    }

    #[test]
    fn removal_push_purges_page() {
        let replica = replica();
        replica
            .apply_data_diff_response(DataDiffResponse::present(1, vec![(0, vec![1])], vec![]))
            .unwrap();
        replica.apply_checksums_pushed(ChecksumsUpdatedPush::removed(1));

        assert!(replica.cached_page(1).is_none());
        assert!(replica.authority_checksums(1).is_none());
        assert!(replica.local_checksums(1).is_none());
    }

    #[test]
    fn frames_are_dispatched_by_type() {
        let replica = replica();
        let response = SyncMessage::ChecksumResponse(ChecksumResponse::present(
            2,
            vec![(0, Checksum::of(&[7]))],
        ));

        replica
            .handle_frame(Channel::ChecksumQuery, &frame(response))
            .unwrap();
        assert_eq!(replica.authority_checksums(2).unwrap().len(), 1);
        assert_eq!(replica.stats().responses_applied, 1);
    }

    #[test]
    fn misrouted_and_malformed_frames_are_dropped() {
        let replica = replica();
        let push = frame(SyncMessage::ChecksumsUpdated(ChecksumsUpdatedPush::removed(1)));

        let err = replica.handle_frame(Channel::ChecksumQuery, &push).unwrap_err();
        assert!(matches!(err, ClientError::ChannelMismatch { .. }));

        assert!(!replica.receive_frame(Channel::ChecksumPush, &[]));
        assert!(!replica.receive_frame(Channel::ChecksumPush, &push[..push.len() - 1]));

        let request = frame(SyncMessage::ChecksumRequest(ChecksumRequest::new(1)));
        let err = replica.handle_frame(Channel::ChecksumQuery, &request).unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedMessage("ChecksumRequest")));

        assert_eq!(replica.stats().packets_dropped, 4);
    }
}

//! Property tests for frame decoding.

use pagesync_protocol::{
    Checksum, ChecksumResponse, ChecksumsUpdatedPush, DataDiffRequest, SyncMessage,
};
use proptest::prelude::*;

fn checksum_pairs() -> impl Strategy<Value = Vec<(u32, Checksum)>> {
    prop::collection::vec(
        (any::<u32>(), prop::collection::vec(any::<u8>(), 0..16)),
        0..32,
    )
    .prop_map(|items| {
        items
            .into_iter()
            .map(|(index, bytes)| (index, Checksum::of(&bytes)))
            .collect()
    })
}

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(frame in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = SyncMessage::decode_frame(&frame);
    }

    #[test]
    fn truncated_frames_are_rejected(page in any::<u64>(), pairs in checksum_pairs(), cut in 1usize..64) {
        let frame = SyncMessage::ChecksumResponse(ChecksumResponse::present(page, pairs))
            .encode_frame()
            .unwrap();
        let keep = frame.len().saturating_sub(cut).max(1);
        prop_assume!(keep < frame.len());
        prop_assert!(SyncMessage::decode_frame(&frame[..keep]).is_err());
    }

    #[test]
    fn push_frames_preserve_page_and_content(
        page in any::<u64>(),
        updated in checksum_pairs(),
        removed in prop::collection::vec(any::<u32>(), 0..16),
    ) {
        let push = ChecksumsUpdatedPush::updated(page, updated, removed);
        let frame = SyncMessage::ChecksumsUpdated(push.clone()).encode_frame().unwrap();
        prop_assert_eq!(
            SyncMessage::decode_frame(&frame).unwrap(),
            SyncMessage::ChecksumsUpdated(push)
        );
    }

    #[test]
    fn encoding_is_deterministic(page in any::<u64>(), indices in prop::collection::vec(any::<u32>(), 0..64)) {
        let request = SyncMessage::DataDiffRequest(DataDiffRequest::new(page, indices));
        prop_assert_eq!(request.encode_frame().unwrap(), request.encode_frame().unwrap());
    }
}

//! Protocol messages for paged sync.

use crate::codec::{self, Fields};
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Checksum, ItemIndex, PageId};
use crate::unit::DataUnit;
use ciborium::value::Value;

/// Which end of a connection a party sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The authority (server) owning canonical page contents.
    Authority,
    /// A replica (client) caching page contents.
    Replica,
}

impl Side {
    /// Lowercase name for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Authority => "authority",
            Side::Replica => "replica",
        }
    }
}

/// The three independent channels of a sync connection.
///
/// Each channel carries exactly one packet type in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// `ChecksumRequest` → `ChecksumResponse`.
    ChecksumQuery,
    /// `DataDiffRequest` → `DataDiffResponse`.
    DataDiffQuery,
    /// `ChecksumsUpdatedPush`, authority to replica.
    ChecksumPush,
}

impl Channel {
    /// Every channel, in registration order.
    pub const ALL: [Channel; 3] = [
        Channel::ChecksumQuery,
        Channel::DataDiffQuery,
        Channel::ChecksumPush,
    ];

    /// Short channel suffix.
    pub fn suffix(&self) -> &'static str {
        match self {
            Channel::ChecksumQuery => "checksum_query",
            Channel::DataDiffQuery => "data_diff_query",
            Channel::ChecksumPush => "checksum_push",
        }
    }

    /// Channel name namespaced by a synchronizer id, e.g. `renderers:checksum_push`.
    pub fn name(&self, id: &str) -> String {
        format!("{id}:{}", self.suffix())
    }
}

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// Checksum query from a replica.
    ChecksumRequest(ChecksumRequest),
    /// Checksum answer from the authority.
    ChecksumResponse(ChecksumResponse),
    /// Data-diff query from a replica.
    DataDiffRequest(DataDiffRequest),
    /// Data-diff answer from the authority.
    DataDiffResponse(DataDiffResponse),
    /// Unsolicited checksum change notice from the authority.
    ChecksumsUpdated(ChecksumsUpdatedPush),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::ChecksumRequest(_) => 1,
            SyncMessage::ChecksumResponse(_) => 2,
            SyncMessage::DataDiffRequest(_) => 3,
            SyncMessage::DataDiffResponse(_) => 4,
            SyncMessage::ChecksumsUpdated(_) => 5,
        }
    }

    /// Packet name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SyncMessage::ChecksumRequest(_) => ChecksumRequest::NAME,
            SyncMessage::ChecksumResponse(_) => ChecksumResponse::NAME,
            SyncMessage::DataDiffRequest(_) => DataDiffRequest::NAME,
            SyncMessage::DataDiffResponse(_) => DataDiffResponse::NAME,
            SyncMessage::ChecksumsUpdated(_) => ChecksumsUpdatedPush::NAME,
        }
    }

    /// The channel this message travels on.
    pub fn channel(&self) -> Channel {
        match self {
            SyncMessage::ChecksumRequest(_) | SyncMessage::ChecksumResponse(_) => {
                Channel::ChecksumQuery
            }
            SyncMessage::DataDiffRequest(_) | SyncMessage::DataDiffResponse(_) => {
                Channel::DataDiffQuery
            }
            SyncMessage::ChecksumsUpdated(_) => Channel::ChecksumPush,
        }
    }

    /// The side that sends this message.
    pub fn sender(&self) -> Side {
        match self {
            SyncMessage::ChecksumRequest(_) | SyncMessage::DataDiffRequest(_) => Side::Replica,
            _ => Side::Authority,
        }
    }

    /// The page this message is about.
    pub fn page(&self) -> PageId {
        match self {
            SyncMessage::ChecksumRequest(m) => m.page,
            SyncMessage::ChecksumResponse(m) => m.page,
            SyncMessage::DataDiffRequest(m) => m.page,
            SyncMessage::DataDiffResponse(m) => m.page,
            SyncMessage::ChecksumsUpdated(m) => m.page,
        }
    }

    /// Encodes the message as a frame: one type code byte, then the CBOR body.
    pub fn encode_frame(&self) -> ProtocolResult<Vec<u8>> {
        let body = match self {
            SyncMessage::ChecksumRequest(m) => m.encode()?,
            SyncMessage::ChecksumResponse(m) => m.encode()?,
            SyncMessage::DataDiffRequest(m) => m.encode()?,
            SyncMessage::DataDiffResponse(m) => m.encode()?,
            SyncMessage::ChecksumsUpdated(m) => m.encode()?,
        };
        let mut frame = Vec::with_capacity(body.len() + 1);
        frame.push(self.type_code());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decodes a frame produced by [`SyncMessage::encode_frame`].
    pub fn decode_frame(frame: &[u8]) -> ProtocolResult<Self> {
        let (&code, body) = frame.split_first().ok_or(ProtocolError::EmptyFrame)?;
        match code {
            1 => ChecksumRequest::decode(body).map(SyncMessage::ChecksumRequest),
            2 => ChecksumResponse::decode(body).map(SyncMessage::ChecksumResponse),
            3 => DataDiffRequest::decode(body).map(SyncMessage::DataDiffRequest),
            4 => DataDiffResponse::decode(body).map(SyncMessage::DataDiffResponse),
            5 => ChecksumsUpdatedPush::decode(body).map(SyncMessage::ChecksumsUpdated),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// Checksum query: "what does page P look like now?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRequest {
    /// Page being asked about.
    pub page: PageId,
}

impl ChecksumRequest {
    const NAME: &'static str = "ChecksumRequest";

    /// Creates a new checksum request.
    pub fn new(page: PageId) -> Self {
        Self { page }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        codec::to_cbor(&codec::map(vec![("page", codec::uint(self.page))]))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = codec::from_cbor(bytes)?;
        let fields = Fields::of(Self::NAME, &value)?;
        Ok(Self {
            page: fields.u64("page")?,
        })
    }
}

/// Full checksum listing of a page, or notice that it no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumResponse {
    /// Page being described.
    pub page: PageId,
    /// False when the authority has no such page.
    pub page_exists: bool,
    /// Checksum of every item on the page.
    pub checksums: Vec<(ItemIndex, Checksum)>,
}

impl ChecksumResponse {
    const NAME: &'static str = "ChecksumResponse";

    /// Creates a response for an existing page.
    pub fn present(page: PageId, checksums: Vec<(ItemIndex, Checksum)>) -> Self {
        Self {
            page,
            page_exists: true,
            checksums,
        }
    }

    /// Creates a response for a page the authority does not have.
    pub fn absent(page: PageId) -> Self {
        Self {
            page,
            page_exists: false,
            checksums: Vec::new(),
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        codec::to_cbor(&codec::map(vec![
            ("page", codec::uint(self.page)),
            ("page_exists", Value::Bool(self.page_exists)),
            ("checksums", codec::checksum_pairs(&self.checksums)),
        ]))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = codec::from_cbor(bytes)?;
        let fields = Fields::of(Self::NAME, &value)?;
        Ok(Self {
            page: fields.u64("page")?,
            page_exists: fields.bool("page_exists")?,
            checksums: fields.checksum_pairs("checksums")?,
        })
    }
}

/// Data query for specific items of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDiffRequest {
    /// Page being asked about.
    pub page: PageId,
    /// Items the replica believes are stale or missing.
    pub indices: Vec<ItemIndex>,
}

impl DataDiffRequest {
    const NAME: &'static str = "DataDiffRequest";

    /// Creates a new data-diff request.
    pub fn new(page: PageId, indices: Vec<ItemIndex>) -> Self {
        Self { page, indices }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        codec::to_cbor(&codec::map(vec![
            ("page", codec::uint(self.page)),
            ("indices", codec::indices(&self.indices)),
        ]))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = codec::from_cbor(bytes)?;
        let fields = Fields::of(Self::NAME, &value)?;
        Ok(Self {
            page: fields.u64("page")?,
            indices: fields.indices("indices")?,
        })
    }
}

/// Current payloads for requested items, plus the requested items that are gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDiffResponse {
    /// Page being described.
    pub page: PageId,
    /// False when the authority has no such page.
    pub page_exists: bool,
    /// Encoded data units for requested items that still exist.
    pub new_data: Vec<(ItemIndex, Vec<u8>)>,
    /// Requested items the page no longer holds.
    pub removed_indices: Vec<ItemIndex>,
}

impl DataDiffResponse {
    const NAME: &'static str = "DataDiffResponse";

    /// Creates a response for an existing page from already encoded payloads.
    pub fn present(
        page: PageId,
        new_data: Vec<(ItemIndex, Vec<u8>)>,
        removed_indices: Vec<ItemIndex>,
    ) -> Self {
        Self {
            page,
            page_exists: true,
            new_data,
            removed_indices,
        }
    }

    /// Creates a response for an existing page, encoding each unit.
    pub fn from_units<T: DataUnit>(
        page: PageId,
        units: Vec<(ItemIndex, T)>,
        removed_indices: Vec<ItemIndex>,
    ) -> Self {
        let new_data = units
            .into_iter()
            .map(|(index, unit)| (index, unit.encode()))
            .collect();
        Self::present(page, new_data, removed_indices)
    }

    /// Creates a response for a page the authority does not have.
    pub fn absent(page: PageId) -> Self {
        Self {
            page,
            page_exists: false,
            new_data: Vec::new(),
            removed_indices: Vec::new(),
        }
    }

    /// Decodes every payload as `T`.
    ///
    /// Fails on the first payload that does not decode; callers drop the
    /// whole packet in that case.
    pub fn decode_units<T: DataUnit>(&self) -> ProtocolResult<Vec<(ItemIndex, T)>> {
        self.new_data
            .iter()
            .map(|(index, bytes)| Ok((*index, T::decode(bytes)?)))
            .collect()
    }

    /// Total payload bytes carried.
    pub fn payload_size(&self) -> usize {
        self.new_data.iter().map(|(_, bytes)| bytes.len()).sum()
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        codec::to_cbor(&codec::map(vec![
            ("page", codec::uint(self.page)),
            ("page_exists", Value::Bool(self.page_exists)),
            ("new_data", codec::byte_pairs(&self.new_data)),
            ("removed_indices", codec::indices(&self.removed_indices)),
        ]))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = codec::from_cbor(bytes)?;
        let fields = Fields::of(Self::NAME, &value)?;
        Ok(Self {
            page: fields.u64("page")?,
            page_exists: fields.bool("page_exists")?,
            new_data: fields.byte_pairs("new_data")?,
            removed_indices: fields.indices("removed_indices")?,
        })
    }
}

/// Checksum change notice pushed by the authority after it mutates a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumsUpdatedPush {
    /// Page that changed.
    pub page: PageId,
    /// True when the whole page was deleted.
    pub was_removed: bool,
    /// New checksums of inserted or updated items.
    pub updated: Vec<(ItemIndex, Checksum)>,
    /// Items deleted from a page that still exists.
    pub removed_indices: Vec<ItemIndex>,
}

impl ChecksumsUpdatedPush {
    const NAME: &'static str = "ChecksumsUpdatedPush";

    /// Creates a push describing item-level changes.
    pub fn updated(
        page: PageId,
        updated: Vec<(ItemIndex, Checksum)>,
        removed_indices: Vec<ItemIndex>,
    ) -> Self {
        Self {
            page,
            was_removed: false,
            updated,
            removed_indices,
        }
    }

    /// Creates a push announcing that the page is gone.
    pub fn removed(page: PageId) -> Self {
        Self {
            page,
            was_removed: true,
            updated: Vec::new(),
            removed_indices: Vec::new(),
        }
    }

    /// Returns true if the push carries no information.
    pub fn is_empty(&self) -> bool {
        !self.was_removed && self.updated.is_empty() && self.removed_indices.is_empty()
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        codec::to_cbor(&codec::map(vec![
            ("page", codec::uint(self.page)),
            ("was_removed", Value::Bool(self.was_removed)),
            ("updated", codec::checksum_pairs(&self.updated)),
            ("removed_indices", codec::indices(&self.removed_indices)),
        ]))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = codec::from_cbor(bytes)?;
        let fields = Fields::of(Self::NAME, &value)?;
        Ok(Self {
            page: fields.u64("page")?,
            was_removed: fields.bool("was_removed")?,
            updated: fields.checksum_pairs("updated")?,
            removed_indices: fields.indices("removed_indices")?,
        })
    }
}

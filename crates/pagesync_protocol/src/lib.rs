//! # pagesync Protocol
//!
//! Wire types and CBOR framing for paged, checksum-diffed synchronization.
//!
//! This crate provides:
//! - `PageId`, `ItemIndex` and `Checksum` identifiers
//! - The `DataUnit` trait implemented by replicated payloads
//! - Protocol packets (checksum query, data-diff query, checksum push)
//! - `SyncMessage` framing (type code byte followed by a CBOR map)
//! - The `Channel` each packet travels on
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Frames
//!
//! ```
//! use pagesync_protocol::{ChecksumRequest, SyncMessage};
//!
//! let frame = SyncMessage::ChecksumRequest(ChecksumRequest::new(7)).encode_frame().unwrap();
//! let decoded = SyncMessage::decode_frame(&frame).unwrap();
//! assert_eq!(decoded.page(), 7);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod messages;
mod types;
mod unit;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    Channel, ChecksumRequest, ChecksumResponse, ChecksumsUpdatedPush, DataDiffRequest,
    DataDiffResponse, Side, SyncMessage,
};
pub use types::{Checksum, ItemIndex, PageId, CHECKSUM_LEN};
pub use unit::DataUnit;

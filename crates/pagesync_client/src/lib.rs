//! # pagesync Client
//!
//! The replica side of paged checksum sync.
//!
//! This crate provides:
//! - `ClientSynchronisedData`, a non-blocking cache of authority pages
//! - Inbound handling for checksum responses, data diffs and pushes
//! - The `ServerLink` transport abstraction and a recording `MockLink`
//!
//! ## Architecture
//!
//! Each cached page keeps three maps:
//! 1. the checksums the authority last advertised,
//! 2. the checksums of the payloads actually held,
//! 3. the payloads.
//!
//! A page is fresh when (1) and (2) are equal. Every call to
//! `try_pool_data_update` returns the payloads held right now and sends at
//! most the requests needed to close the gap; replies arrive later through
//! `handle_frame`. There are no timeouts or retries: the next call simply
//! looks again.
//!
//! ## Key Invariants
//!
//! - The authority is always right; local state is only a cache
//! - Payloads and their local checksums change together
//! - Before a diff request, only advertised payloads are kept
//! - A page the authority reports absent is evicted entirely

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod connection;
mod error;
mod transport;

pub use cache::{ClientSynchronisedData, ReplicaStats};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use transport::{MockLink, ServerLink};

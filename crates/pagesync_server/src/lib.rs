//! # pagesync Server
//!
//! The authoritative side of paged checksum sync.
//!
//! This crate provides:
//! - `ServerSynchronisedData`, the canonical per-page item store
//! - Checksum-changed pushes to subscribed replicas (immediate or batched)
//! - `RequestHandler`, which answers checksum and data-diff queries
//!
//! # Architecture
//!
//! Every page holds its items and their checksums side by side and both
//! are mutated under the same lock, so a checksum listing never disagrees
//! with the data it describes. A page exists from its first write until its
//! last item is removed.
//!
//! Replicas are reached through [`ReplicaLink`]s handed to
//! [`ServerSynchronisedData::subscribe`]; the store never owns sockets.
//!
//! ```rust,ignore
//! use pagesync_server::{RequestHandler, ServerConfig, ServerSynchronisedData};
//!
//! let authority = Arc::new(ServerSynchronisedData::<MyUnit>::new(ServerConfig::new("renderers")));
//! authority.subscribe(link_to_replica);
//! authority.set_item(page, 3, unit);
//!
//! let handler = RequestHandler::new(Arc::clone(&authority));
//! if let Some(reply) = handler.serve_frame(channel, &frame) {
//!     send_back(channel, reply);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod authority;
mod config;
mod error;
mod handler;
mod notify;
mod store;

pub use authority::{AuthorityStats, ServerSynchronisedData};
pub use config::{PushMode, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use notify::{ReplicaId, ReplicaLink};
pub use store::{DataDiff, PageChange};

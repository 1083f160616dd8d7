//! # pagesync Testkit
//!
//! Test utilities for pagesync.
//!
//! This crate provides:
//! - `TestUnit`, a small `DataUnit` for tests and simulations
//! - Property-based test generators using proptest
//! - `LoopbackNetwork`, an in-process authority with queued replica links
//! - Convergence helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pagesync_testkit::prelude::*;
//!
//! #[test]
//! fn replica_catches_up() {
//!     let mut network = LoopbackNetwork::new(ServerConfig::default());
//!     let r = network.add_replica(ClientConfig::default());
//!     network.authority().set_item(5, 3, TestUnit::new(1, "rope"));
//!     assert!(converge_replica(&network, r, 4).is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod network;
pub mod unit;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::network::*;
    pub use crate::unit::*;
    pub use pagesync_client::ClientConfig;
    pub use pagesync_server::{PushMode, ServerConfig};
}

pub use fixtures::*;
pub use generators::*;
pub use network::*;
pub use unit::*;

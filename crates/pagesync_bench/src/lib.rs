//! Benchmark support for pagesync.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;

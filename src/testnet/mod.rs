//! In-memory test harness
//!
//! Shared helpers for exercising the ledger and the protocol without sockets.

pub mod test_utils;

pub use test_utils::*;

//! Tamper-evident activity log.
//!
//! Each entry's hash covers the previous entry's hash, so editing or
//! removing any row breaks every link after it.

mod chain;

pub use chain::*;

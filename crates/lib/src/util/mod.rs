//! Shared utilities.
//!
//! Hashing helpers, the concurrent fan-in used by every graph traversal, and
//! test helpers.

pub mod hash;
pub mod task;

#[cfg(test)]
pub mod testutil;

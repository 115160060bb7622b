//! Shared test utilities used across moonfold crates.

pub mod fixtures;
pub mod proptest_profile;
pub mod tracing;

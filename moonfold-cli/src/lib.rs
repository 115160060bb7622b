//! Support library for the moonfold CLI binary.
//!
//! Exposes the command pipeline and logging setup so tests can drive the
//! generators without spawning a subprocess.

pub mod cli;
pub mod logging;

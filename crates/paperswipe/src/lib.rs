//! `paperswipe` crate (library surface).
//!
//! The `paperswipe` binary (HTTP relay + CLI) is the primary entrypoint. The router and
//! helpers live here so they can be embedded and exercised without spawning the binary.

pub mod envfile;
pub mod server;
pub mod telemetry;

pub use paperswipe_core as core;
pub use paperswipe_local as local;

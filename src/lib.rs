//! lansentry library surface.
//!
//! The binary in `main.rs` wires CLI arguments, the ingest loop, and the
//! dashboard reader around the [`engine`]; everything stateful lives here so
//! integration tests can drive the same pipeline the binary runs.

pub mod cli;
pub mod engine;
pub mod error;
pub mod logger;

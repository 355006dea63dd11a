//! # scriptwrap-core
//!
//! Shared plumbing for the scriptwrap crates.
//!
//! - **Logging**: [`logging::init_subscriber`] installs the stderr `tracing`
//!   subscriber used by the `scriptwrap` binary.
//! - **Log capture**: [`logging::capture_logs`] records events in memory so
//!   tests can assert on warnings raised by the hook engine.

#![deny(unsafe_code)]

pub mod logging;

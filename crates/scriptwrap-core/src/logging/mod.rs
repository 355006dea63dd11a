//! Structured logging with `tracing`.
//!
//! The engine crates only emit events through the `tracing` macros; choosing
//! where those events go is left to the binary embedding them. This module
//! provides:
//! - [`init_subscriber`] for the stderr subscriber used by the CLI
//! - [`capture_logs`] and [`CapturedLogs`] for asserting on events in tests
//!
//! Script output (`println` inside a hook script) is emitted under the
//! [`SCRIPT_TARGET`] target so it can be filtered separately from engine
//! diagnostics, e.g. `RUST_LOG=warn,scriptwrap::script=info`.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// `tracing` target used for output produced by hook scripts themselves.
pub const SCRIPT_TARGET: &str = "scriptwrap::script";

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` takes precedence over `level` when set. Repeated calls are
/// no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

/// Initialize the global subscriber with JSON lines on stderr.
///
/// Used when hook diagnostics are shipped to a log collector instead of a
/// terminal.
pub fn init_json_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}

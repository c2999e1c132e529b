//! Structured logging setup.
//!
//! The library only emits `tracing` events; hosts that do not install their
//! own subscriber can call one of these helpers once at startup.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted for the log filter.
pub const LOG_ENV: &str = "OPSLEDGER_LOG";

/// Initialize a JSON subscriber filtered by `OPSLEDGER_LOG` (default `info`).
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .try_init()
        .is_ok()
}

/// Initialize with an explicit filter string (for tests or embedding).
pub fn init_tracing_with_filter(filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .json()
        .try_init()
        .is_ok()
}

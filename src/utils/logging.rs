//! Diagnostic logging setup for the binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary so embedders keep control of their own output.

use tracing_subscriber::EnvFilter;

/// Environment variable read before `RUST_LOG`.
pub const LOG_ENV: &str = "CHATWEB_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";

/// Build the filter from `CHATWEB_LOG`, then `RUST_LOG`, then the default.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install a stderr fmt subscriber; `verbose` raises the floor to debug.
///
/// Calling this twice is harmless: the second install is ignored.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("chatweb=debug")
    } else {
        env_filter()
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

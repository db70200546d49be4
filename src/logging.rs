//! Logging initialization.
//!
//! Console-only `tracing` subscriber; the filter comes from `RUST_LOG` and
//! falls back to `info`. Library code logs through `tracing` macros and
//! never writes files.

use tracing_subscriber::EnvFilter;

/// Install the global console subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

//! Diagnostic logging for the CLI itself.
//!
//! Diagnostics always go to stderr: stdout belongs to the NDJSON / pretty
//! stream and must never be interleaved with log noise.

use tracing_subscriber::EnvFilter;

/// Initialise the tracing subscriber. `RUST_LOG` wins over the configured
/// default level. Safe to call more than once (later calls are no-ops,
/// which keeps tests simple).
pub fn setup_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

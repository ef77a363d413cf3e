//! Development-time tracing for debugging the wizard.
//!
//! Diagnostics go to stderr only. Command results (paths, JSON summaries)
//! go to stdout and are unaffected by the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber for development logging. Call once per process.
///
/// Reads `RUST_LOG`, falling back to `default_filter` (the config's
/// `log_filter`). Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=wizard=debug cargo run -- show --path /pick
/// ```
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

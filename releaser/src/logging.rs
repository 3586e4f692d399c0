//! Diagnostic tracing for the releaser.
//!
//! Tracing goes to stderr and is separate from the release trace, which is
//! product output: printed as JSON on stdout and persisted in the store.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Enables debug logging when set to `1`, `true` or `yes`.
pub const DEBUG_ENV: &str = "DEBUG";

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `debug` if `verbose` or the
/// `DEBUG` env var asks for it, else `default_level`.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=releaser=debug releaser release-group g1
/// ```
pub fn init(default_level: &str, verbose: bool) {
    let level = if verbose || debug_requested(std::env::var(DEBUG_ENV).ok().as_deref()) {
        "debug"
    } else {
        default_level
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // `try_init` so repeated calls (tests, embedding) do not panic.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

fn debug_requested(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

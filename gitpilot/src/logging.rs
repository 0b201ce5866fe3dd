//! Diagnostic tracing for gitpilot.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Dev diagnostics via `RUST_LOG`, output to stderr.
//!   Never interleaved with the interactive prompts on stdout.
//!
//! - **Terminal UI (`ui`)**: The plan, prompts, and results the user reads.
//!   Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Falls back to `warn`, or `gitpilot=debug` when `verbose`
/// is set. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=gitpilot=debug gitpilot run "push my branch"
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "gitpilot=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

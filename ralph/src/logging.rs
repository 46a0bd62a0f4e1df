//! Diagnostic tracing for ralph.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RALPH_LOG` / `RUST_LOG`, output
//!   to stderr. Not persisted, not part of ralph's product output.
//!
//! - **Attempt artifacts (`io/attempt_log`)**: prompts, agent logs and
//!   validation reports under `.ralph/runs/`. Always written, unaffected by
//!   log filters.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RALPH_LOG`, then `RUST_LOG`. Defaults to `warn`, or `info` when
/// `verbose` is set. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RALPH_LOG=ralph=debug ralph execute
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("RALPH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

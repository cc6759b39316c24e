//! Operator-facing tracing setup.
//!
//! Progress lines (`task: <name>:run`) go to stdout from the sequencer. This
//! module only configures diagnostics, which go to stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `basebox=info` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=basebox=debug basebox provision
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("basebox=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

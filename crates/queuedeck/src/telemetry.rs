//! Log output for the binaries.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Filter comes from `RUST_LOG` (default `info`).
///
/// Calling it again is a no-op.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

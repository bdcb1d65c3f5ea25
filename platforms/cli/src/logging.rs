//! Diagnostics via `RUST_LOG`, written to stderr so the step trace on stdout stays clean.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber. Defaults to `warn` if `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=tursim=debug tursim-cli --example "Bit Inverter"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

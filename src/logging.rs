//! Diagnostic logging.
//!
//! User-facing output goes through the coloured `info!`/`success!` macros;
//! this module only wires `tracing` events to stderr so that a failing
//! refresh or a dropped stream can be traced with `TIDECLI_LOG=debug`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "tidecli=warn";

/// Initialize the logging system.
///
/// The filter is read from `TIDECLI_LOG`, then `RUST_LOG`, and defaults to
/// warnings from this crate only. Calling this twice is harmless.
pub fn init() {
    let filter = std::env::var("TIDECLI_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .without_time();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

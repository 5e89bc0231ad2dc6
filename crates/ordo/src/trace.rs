//! Tracing subscriber initialisation.

use crate::cli::{LogFormat, LogLevel};
use tracing_subscriber::EnvFilter;

/// Initialise the global subscriber from the CLI's logging flags.
///
/// `RUST_LOG` takes precedence over `--log-level` when set, so targeted
/// per-module filters keep working.
pub fn init(level: LogLevel, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_tracing().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

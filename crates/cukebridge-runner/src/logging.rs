//! Process-wide tracing setup for the `cukebridge` binary.
//!
//! Logs go to stderr so stdout stays a clean JSON-lines event stream. The
//! filter comes from `CUKEBRIDGE_LOG` (same syntax as `RUST_LOG`), default
//! `info`.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "CUKEBRIDGE_LOG";
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}

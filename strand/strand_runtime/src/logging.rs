//! Logging bootstrap.
//!
//! Installs a `tracing` fmt subscriber. Records emitted through the `log`
//! facade by the library crates are forwarded to it as well.

use strand_core::LogLevel;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configured level.
pub const LOG_ENV: &str = "STRAND_LOG";

/// The filter for `level`, unless `STRAND_LOG` holds a valid directive.
pub fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level.as_directive()))
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed, which leaves
/// the existing one in place.
pub fn init(level: LogLevel) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

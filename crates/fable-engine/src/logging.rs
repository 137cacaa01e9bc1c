//! Subscriber setup for binaries and demos.
//!
//! Library code only emits through `tracing`; installing a subscriber is left
//! to whoever owns `main`.

use tracing_subscriber::EnvFilter;

/// Environment variable read for the log filter.
pub const LOG_ENV_VAR: &str = "FABLE_LOG";

/// Build the filter from `FABLE_LOG`, falling back to `default_filter`.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install a formatting subscriber.
///
/// Returns `false` if a global subscriber was already installed, which is
/// left in place.
pub fn init_logging(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .with_target(false)
        .try_init()
        .is_ok()
}

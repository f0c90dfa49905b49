//! Tracing setup for test binaries.
//!
//! Output goes through libtest's capture, so logs only show for failing tests
//! (or with `--nocapture`).

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{DEFAULT_LOG_FILTER, LoggingConfig, TestkitConfig};

/// Install the global subscriber from `RUST_LOG` or the testkit config.
///
/// Safe to call from every test: only the first call in a process installs
/// anything.
pub fn init() {
    let (config, load_error) = match TestkitConfig::load() {
        Ok(config) => (config.unwrap_or_default(), None),
        Err(err) => (TestkitConfig::default(), Some(err)),
    };

    if init_with(&config.logging)
        && let Some(err) = load_error
    {
        tracing::warn!(path = %err.path().display(), "Ignoring testkit config: {err}");
    }
}

/// Install the global subscriber with `config`. Returns `false` if a global
/// subscriber was already set.
pub fn init_with(config: &LoggingConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(config.ansi).with_test_writer())
        .with(env_filter)
        .try_init()
        .is_ok()
}

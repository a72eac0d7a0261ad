//! Log setup and log-line helpers.
//!
//! `RUST_LOG` overrides `LOG_LEVEL`, so a single module can be made verbose
//! without touching the service config.

use crate::config::Config;
use std::borrow::Cow;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Longest rendered value written to a log line.
pub const MAX_LOGGED_VALUE: usize = 200;

/// Cut `value` to at most `max` characters, marking the cut with `...`.
#[must_use]
pub fn truncate_for_log(value: &str, max: usize) -> Cow<'_, str> {
    match value.char_indices().nth(max) {
        Some((end, _)) => Cow::Owned(format!("{}...", &value[..end])),
        None => Cow::Borrowed(value),
    }
}

fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber described by `config`.
///
/// Returns `false` when a subscriber was already installed, as happens when
/// several tests in one process set up logging.
pub fn init_logging(config: &Config) -> bool {
    let registry = tracing_subscriber::registry().with(log_filter(&config.log_level));
    let installed = if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init().is_ok()
    };

    if installed {
        info!(
            service = %config.service_name,
            level = %config.log_level,
            json = config.log_json,
            "Logging initialised"
        );
    }
    installed
}

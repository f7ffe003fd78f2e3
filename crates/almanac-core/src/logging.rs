//! Tracing subscriber bootstrap.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::error::{CoreError, CoreResult};

/// ## Summary
/// Builds the `EnvFilter` used by the subscriber.
///
/// `RUST_LOG` wins over the configured level when it is set and valid.
///
/// ## Errors
/// Returns `CoreError::ConfigError` if the configured level is not a valid filter directive.
pub fn build_filter(config: &LoggingConfig) -> CoreResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(config.level.as_str())
        .map_err(|e| CoreError::ConfigError(format!("invalid log level {}: {e}", config.level)))
}

/// ## Summary
/// Installs the global tracing subscriber.
///
/// ## Errors
/// Returns an error if the level is invalid or a global subscriber is already installed.
///
/// ## Side Effects
/// Sets the process-wide default subscriber.
pub fn init_tracing(config: &LoggingConfig) -> CoreResult<()> {
    let filter = build_filter(config)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .map_err(|e| CoreError::ConfigError(format!("failed to install subscriber: {e}")))?;

    tracing::debug!(level = %config.level, "Tracing initialised");
    Ok(())
}

//! Configuration validation logic.

use crate::errors::ConfigError;
use crate::types::PulseConfig;

/// Pollers and sweeps below this period would spin the event loop.
pub const MIN_INTERVAL_MS: u64 = 100;

/// Upper bound for every millisecond period and timeout (one day).
pub const MAX_INTERVAL_MS: u64 = 86_400_000;

/// Upper bound for every period configured in seconds (one day).
pub const MAX_PERIOD_SECS: u64 = 86_400;

/// Validate a PulseConfig, returning an error if any values are invalid.
///
/// # Validation Rules
///
/// - `http.base_url` must start with `http://` or `https://`
/// - `http.request_timeout_ms`, if set, must be in `1..=MAX_INTERVAL_MS`
/// - `poll.interval_ms` and `poll.error_backoff_ms` must be in
///   `MIN_INTERVAL_MS..=MAX_INTERVAL_MS`
/// - `connection.countdown_secs`, `actions.cooldown_secs` and
///   `actions.sweep_interval_secs` must be in `1..=MAX_PERIOD_SECS`
pub fn validate_config(config: &PulseConfig) -> Result<(), ConfigError> {
    let base_url = config.http.base_url();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(invalid(format!(
            "http.base_url must start with http:// or https://, got '{}'",
            base_url
        )));
    }

    if let Some(timeout_ms) = config.http.request_timeout_ms {
        check_range("http.request_timeout_ms", timeout_ms, 1, MAX_INTERVAL_MS)?;
    }

    check_range(
        "poll.interval_ms",
        millis(config.poll.interval()),
        MIN_INTERVAL_MS,
        MAX_INTERVAL_MS,
    )?;
    check_range(
        "poll.error_backoff_ms",
        millis(config.poll.error_backoff()),
        MIN_INTERVAL_MS,
        MAX_INTERVAL_MS,
    )?;

    check_range(
        "connection.countdown_secs",
        u64::from(config.connection.countdown_secs()),
        1,
        MAX_PERIOD_SECS,
    )?;
    check_range(
        "actions.cooldown_secs",
        config.actions.cooldown().as_secs(),
        1,
        MAX_PERIOD_SECS,
    )?;
    check_range(
        "actions.sweep_interval_secs",
        config.actions.sweep_interval().as_secs(),
        1,
        MAX_PERIOD_SECS,
    )?;

    Ok(())
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min {
        return Err(invalid(format!("{} must be >= {}", field, min)));
    }
    if value > max {
        return Err(invalid(format!("{} must be <= {}", field, max)));
    }
    Ok(())
}

fn invalid(message: String) -> ConfigError {
    ConfigError::InvalidConfiguration { message }
}

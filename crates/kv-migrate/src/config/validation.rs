//! Configuration validation.

use super::{Config, RetryConfig, TimeoutConfig};
use crate::error::{MigrateError, Result};
use crate::timeout::MAX_OPERATION_TIMEOUT;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.source.url.trim().is_empty() {
        return Err(MigrateError::Config("source.url is required".into()));
    }
    if config.target.url.trim().is_empty() {
        return Err(MigrateError::Config("target.url is required".into()));
    }

    // Cannot migrate onto the same store
    if config.source.url == config.target.url {
        return Err(MigrateError::Config(
            "source and target cannot be the same store".into(),
        ));
    }

    // Migration config validation - only check if explicitly set
    if let Some(0) = config.migration.workers {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.batch_size {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.scan_count {
        return Err(MigrateError::Config(
            "migration.scan_count must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.progress_interval_secs {
        return Err(MigrateError::Config(
            "migration.progress_interval_secs must be at least 1".into(),
        ));
    }
    if config.migration.key_pattern.is_empty() {
        return Err(MigrateError::Config(
            "migration.key_pattern cannot be empty".into(),
        ));
    }
    if config.verify.concurrency == 0 {
        return Err(MigrateError::Config(
            "verify.concurrency must be at least 1".into(),
        ));
    }
    if !(config.verify.score_epsilon >= 0.0) {
        return Err(MigrateError::Config(
            "verify.score_epsilon must be non-negative".into(),
        ));
    }

    validate_retry(&config.retry)?;
    validate_timeouts(&config.timeouts)?;

    Ok(())
}

/// Validate retry settings.
pub fn validate_retry(retry: &RetryConfig) -> Result<()> {
    if retry.max_attempts == 0 {
        return Err(MigrateError::Config(
            "retry.max_attempts must be at least 1".into(),
        ));
    }
    if !(retry.backoff_factor > 1.0) {
        return Err(MigrateError::Config(format!(
            "retry.backoff_factor must be greater than 1.0, got {}",
            retry.backoff_factor
        )));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(MigrateError::Config(
            "retry.max_delay_ms must not be smaller than retry.initial_delay_ms".into(),
        ));
    }
    Ok(())
}

/// Validate timeout settings.
pub fn validate_timeouts(timeouts: &TimeoutConfig) -> Result<()> {
    let ceiling = MAX_OPERATION_TIMEOUT.as_millis() as u64;
    let bases = [
        ("timeouts.default_ms", timeouts.default_ms),
        ("timeouts.string_ms", timeouts.string_ms),
        ("timeouts.hash_ms", timeouts.hash_ms),
        ("timeouts.list_ms", timeouts.list_ms),
        ("timeouts.set_ms", timeouts.set_ms),
        ("timeouts.zset_ms", timeouts.zset_ms),
    ];
    for (field, value) in bases {
        if value == 0 || value > ceiling {
            return Err(MigrateError::Config(format!(
                "{} must be between 1 and {} ms, got {}",
                field, ceiling, value
            )));
        }
    }

    let multiplier = timeouts.large_data_multiplier;
    if !(multiplier > 1.0 && multiplier <= 10.0) {
        return Err(MigrateError::Config(format!(
            "timeouts.large_data_multiplier must be in (1.0, 10.0], got {}",
            multiplier
        )));
    }

    Ok(())
}

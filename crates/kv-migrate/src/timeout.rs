//! Operation timeouts scaled by data type and size.
//!
//! The transfer engine never enforces timeouts itself. It only reports how
//! big a value is; store clients ask the [`TimeoutPolicy`] they were built
//! with how long a command touching that value may take.

use std::time::Duration;

use crate::config::{validation, TimeoutConfig};
use crate::core::KeyType;
use crate::error::Result;

/// Hard ceiling for any single store operation.
pub const MAX_OPERATION_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Immutable timeout table built from a validated [`TimeoutConfig`].
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    config: TimeoutConfig,
}

impl TimeoutPolicy {
    /// Build a policy, rejecting configurations outside the allowed bounds.
    pub fn new(config: TimeoutConfig) -> Result<Self> {
        validation::validate_timeouts(&config)?;
        Ok(Self { config })
    }

    /// Timeout for a type regardless of size.
    pub fn base_timeout(&self, key_type: &KeyType) -> Duration {
        let ms = match key_type {
            KeyType::String => self.config.string_ms,
            KeyType::Hash => self.config.hash_ms,
            KeyType::List => self.config.list_ms,
            KeyType::Set => self.config.set_ms,
            KeyType::ZSet => self.config.zset_ms,
            KeyType::None | KeyType::Unsupported(_) => self.config.default_ms,
        };
        Duration::from_millis(ms)
    }

    /// Timeout for commands that do not touch a value (TYPE, EXISTS, PING...).
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.config.default_ms)
    }

    /// Whether `size` crosses the large-data threshold.
    pub fn is_large(&self, size: usize) -> bool {
        size > self.config.large_data_threshold
    }

    /// Element count (or byte length) above which data counts as large.
    pub fn large_data_threshold(&self) -> usize {
        self.config.large_data_threshold
    }

    /// Timeout for an operation on a value of `key_type` with `size` elements.
    pub fn timeout_for(&self, key_type: &KeyType, size: usize) -> Duration {
        let base = self.base_timeout(key_type);
        if !self.is_large(size) {
            return base;
        }
        base.mul_f64(self.config.large_data_multiplier)
            .min(MAX_OPERATION_TIMEOUT)
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            config: TimeoutConfig::default(),
        }
    }
}

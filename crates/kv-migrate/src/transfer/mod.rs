//! Type-aware transfer of a single key.
//!
//! [`DataTypeProcessor`] moves one key from source to target: read the value,
//! check it against the type the source declared, write it, then carry the
//! TTL over. Retrying is the caller's business; a processor call makes each
//! store request exactly once.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::{KeyType, KvStore, Value};
use crate::error::{MigrateError, Result};
use crate::logging::LoggerRef;
use crate::timeout::TimeoutPolicy;

/// Result of transferring one key.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub key: String,
    pub key_type: KeyType,
    pub success: bool,
    /// Element count (byte length for strings); 0 when the read failed.
    pub size: usize,
    /// Approximate payload bytes written.
    pub bytes: u64,
    pub duration: Duration,
    /// Whether the value crossed the large-data threshold.
    pub large: bool,
    /// TTL carried over to the target, if any.
    pub ttl: Option<Duration>,
    pub error: Option<String>,
}

impl TransferOutcome {
    /// Outcome for a key whose transfer failed.
    pub fn failed(key: &str, key_type: KeyType, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            key_type,
            success: false,
            size: 0,
            bytes: 0,
            duration,
            large: false,
            ttl: None,
            error: Some(error.into()),
        }
    }
}

/// Per-type transfer logic.
pub struct DataTypeProcessor {
    large_data_threshold: usize,
    logger: LoggerRef,
}

impl DataTypeProcessor {
    pub fn new(large_data_threshold: usize, logger: LoggerRef) -> Self {
        Self {
            large_data_threshold,
            logger,
        }
    }

    /// Processor sharing the large-data threshold of a timeout policy, so
    /// "large" means the same thing to the processor and to the store clients.
    pub fn from_policy(policy: &TimeoutPolicy, logger: LoggerRef) -> Self {
        Self::new(policy.large_data_threshold(), logger)
    }

    /// Transfer `key` and report the outcome. Never fails: errors end up in
    /// the returned outcome, which is also logged.
    pub async fn process_key(
        &self,
        key: &str,
        declared: &KeyType,
        source: &dyn KvStore,
        target: &dyn KvStore,
    ) -> TransferOutcome {
        let start = Instant::now();
        let outcome = match self.transfer_key(key, declared, source, target).await {
            Ok(outcome) => outcome,
            Err(e) => TransferOutcome::failed(key, declared.clone(), start.elapsed(), e.to_string()),
        };
        self.logger.log_key_transfer(&outcome);
        outcome
    }

    /// Transfer `key`, returning the typed error on failure.
    ///
    /// This is the form to wrap in a retry: type mismatches and unsupported
    /// types come back as errors that are never retried.
    pub async fn transfer_key(
        &self,
        key: &str,
        declared: &KeyType,
        source: &dyn KvStore,
        target: &dyn KvStore,
    ) -> Result<TransferOutcome> {
        match declared {
            KeyType::String => self.process_string(key, source, target).await,
            KeyType::Hash => self.process_hash(key, source, target).await,
            KeyType::List => self.process_list(key, source, target).await,
            KeyType::Set => self.process_set(key, source, target).await,
            KeyType::ZSet => self.process_zset(key, source, target).await,
            KeyType::None => Err(MigrateError::KeyNotFound(key.to_string())),
            KeyType::Unsupported(name) => Err(MigrateError::UnsupportedType {
                key: key.to_string(),
                key_type: name.clone(),
            }),
        }
    }

    pub async fn process_string(
        &self,
        key: &str,
        source: &dyn KvStore,
        target: &dyn KvStore,
    ) -> Result<TransferOutcome> {
        self.transfer_typed(key, KeyType::String, source, target).await
    }

    pub async fn process_hash(
        &self,
        key: &str,
        source: &dyn KvStore,
        target: &dyn KvStore,
    ) -> Result<TransferOutcome> {
        self.transfer_typed(key, KeyType::Hash, source, target).await
    }

    pub async fn process_list(
        &self,
        key: &str,
        source: &dyn KvStore,
        target: &dyn KvStore,
    ) -> Result<TransferOutcome> {
        self.transfer_typed(key, KeyType::List, source, target).await
    }

    pub async fn process_set(
        &self,
        key: &str,
        source: &dyn KvStore,
        target: &dyn KvStore,
    ) -> Result<TransferOutcome> {
        self.transfer_typed(key, KeyType::Set, source, target).await
    }

    pub async fn process_zset(
        &self,
        key: &str,
        source: &dyn KvStore,
        target: &dyn KvStore,
    ) -> Result<TransferOutcome> {
        self.transfer_typed(key, KeyType::ZSet, source, target).await
    }

    async fn transfer_typed(
        &self,
        key: &str,
        expected: KeyType,
        source: &dyn KvStore,
        target: &dyn KvStore,
    ) -> Result<TransferOutcome> {
        let start = Instant::now();

        let value = source
            .get_value(key)
            .await
            .map_err(|e| wrap(e, key, format!("read from {}", source.name())))?;

        let actual = value.key_type();
        if actual != expected {
            return Err(MigrateError::TypeMismatch {
                key: key.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        let size = value.size();
        let large = size > self.large_data_threshold;
        if large {
            self.logger
                .with_fields(&[("key", key), ("type", expected.as_str())])
                .info(&format!(
                    "large data: {} elements (threshold {}), extended timeouts apply",
                    size, self.large_data_threshold
                ));
        }

        let ttl = match source.get_ttl(key).await {
            Ok(ttl) => ttl.filter(|d| !d.is_zero()),
            Err(e) => {
                self.logger
                    .with_field("key", key)
                    .warn(&format!("failed to read TTL, migrating without expiry: {}", e));
                None
            }
        };

        target
            .set_value(key, &value)
            .await
            .map_err(|e| wrap(e, key, format!("write to {}", target.name())))?;

        let mut applied_ttl = None;
        if let Some(ttl) = ttl {
            match target.set_ttl(key, ttl).await {
                Ok(()) => applied_ttl = Some(ttl),
                Err(e) => self
                    .logger
                    .with_field("key", key)
                    .warn(&format!("failed to set TTL of {:?} on target: {}", ttl, e)),
            }
        }

        Ok(TransferOutcome {
            key: key.to_string(),
            key_type: expected,
            success: true,
            size,
            bytes: payload_bytes(&value),
            duration: start.elapsed(),
            large,
            ttl: applied_ttl,
            error: None,
        })
    }
}

fn payload_bytes(value: &Value) -> u64 {
    value.byte_size() as u64
}

/// Add the key and step to a store error. Data errors are returned as they
/// are; anything else keeps the store error as its source, which is what
/// retry classification looks at.
fn wrap(err: MigrateError, key: &str, step: String) -> MigrateError {
    if err.is_fatal_for_key() {
        return err;
    }
    MigrateError::key_operation(key, step, err)
}

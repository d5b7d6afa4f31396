//! Post-migration verification.
//!
//! [`DataVerifier`] compares keys between source and target and explains
//! every difference it finds:
//!
//! 1. The key must exist in the target.
//! 2. Both sides must report the same type. A type difference is recorded
//!    as a single mismatch and content is not compared.
//! 3. Content is compared per type (see [`compare`]).
//!
//! Verification only reports. It never writes to either store.

pub mod compare;
mod types;

pub use types::{VerificationResult, VerificationSummary};

use std::time::Instant;

use futures::stream::{self, StreamExt};

use crate::config::VerifyConfig;
use crate::core::{KeyType, KvStore};
use crate::error::Result;
use crate::logging::LoggerRef;

/// Message for a key absent from the target.
pub const MISSING_IN_TARGET: &str = "key does not exist in target database";

/// Compares source and target key by key.
pub struct DataVerifier {
    concurrency: usize,
    score_epsilon: f64,
    logger: LoggerRef,
}

impl DataVerifier {
    pub fn new(config: &VerifyConfig, logger: LoggerRef) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            score_epsilon: config.score_epsilon,
            logger,
        }
    }

    /// Verify a single key.
    pub async fn verify_key(
        &self,
        key: &str,
        source: &dyn KvStore,
        target: &dyn KvStore,
    ) -> VerificationResult {
        let start = Instant::now();
        let mut result = VerificationResult {
            key: key.to_string(),
            key_type: KeyType::None,
            success: false,
            error_msg: None,
            mismatches: Vec::new(),
            duration: Default::default(),
        };

        if let Err(e) = self.compare_key(key, source, target, &mut result).await {
            self.logger.log_error("verify", Some(key), &e.to_string());
            result.error_msg = Some(e.to_string());
        }

        result.success = result.error_msg.is_none() && result.mismatches.is_empty();
        result.duration = start.elapsed();
        result
    }

    async fn compare_key(
        &self,
        key: &str,
        source: &dyn KvStore,
        target: &dyn KvStore,
        result: &mut VerificationResult,
    ) -> Result<()> {
        if !target.exists(key).await? {
            result.error_msg = Some(MISSING_IN_TARGET.to_string());
            return Ok(());
        }

        let (source_type, target_type) =
            tokio::try_join!(source.get_key_type(key), target.get_key_type(key))?;
        result.key_type = source_type.clone();

        if source_type != target_type {
            result.mismatches.push(format!(
                "type mismatch: source={}, target={}",
                source_type, target_type
            ));
            return Ok(());
        }

        match &source_type {
            // Both sides report none when the key expired or was deleted
            // after the existence check.
            KeyType::None => {
                result.error_msg = Some("key does not exist in source database".to_string());
                return Ok(());
            }
            KeyType::Unsupported(name) => {
                result.error_msg = Some(format!("unsupported key type {}", name));
                return Ok(());
            }
            _ => {}
        }

        let (source_value, target_value) =
            tokio::try_join!(source.get_value(key), target.get_value(key))?;
        result.mismatches = compare::compare_values(&source_value, &target_value, self.score_epsilon);
        Ok(())
    }

    /// Verify every key in `keys`, up to the configured concurrency at a time.
    ///
    /// Results are independent of completion order; the summary lists them
    /// sorted by key.
    pub async fn verify_all_keys(
        &self,
        keys: &[String],
        source: &dyn KvStore,
        target: &dyn KvStore,
    ) -> VerificationSummary {
        self.logger.info(&format!(
            "Verifying {} keys (concurrency {})",
            keys.len(),
            self.concurrency
        ));

        let results: Vec<VerificationResult> = stream::iter(keys)
            .map(|key| self.verify_key(key, source, target))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let summary = VerificationSummary::from_results(results);
        for failure in summary.failures() {
            let logger = self.logger.with_field("key", &failure.key);
            if let Some(msg) = &failure.error_msg {
                logger.warn(msg);
            }
            for mismatch in &failure.mismatches {
                logger.warn(mismatch);
            }
        }
        summary
    }
}

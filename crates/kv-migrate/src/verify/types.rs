//! Verification result types.

use std::time::Duration;

use serde::Serialize;

use crate::core::KeyType;

/// Outcome of comparing one key between source and target.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub key: String,
    /// Type on the source side (`none` if it could not be determined).
    pub key_type: KeyType,
    /// True only if the key exists in the target, types match, no mismatch
    /// was found and no error occurred.
    pub success: bool,
    /// Set when the comparison could not be carried out.
    pub error_msg: Option<String>,
    /// Every discrepancy found, in a deterministic order.
    pub mismatches: Vec<String>,
    pub duration: Duration,
}

impl VerificationResult {
    /// Whether this key failed because of a content or type difference
    /// (as opposed to an error).
    pub fn has_mismatches(&self) -> bool {
        !self.success && !self.mismatches.is_empty()
    }
}

/// Aggregate over a set of verified keys.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationSummary {
    pub total_keys: usize,
    pub verified_keys: usize,
    pub failed_keys: usize,
    /// Failed keys with at least one named mismatch.
    pub mismatched_keys: usize,
    pub results: Vec<VerificationResult>,
}

impl VerificationSummary {
    /// Build a summary, sorting results by key.
    pub fn from_results(mut results: Vec<VerificationResult>) -> Self {
        results.sort_by(|a, b| a.key.cmp(&b.key));
        let total_keys = results.len();
        let verified_keys = results.iter().filter(|r| r.success).count();
        let mismatched_keys = results.iter().filter(|r| r.has_mismatches()).count();
        Self {
            total_keys,
            verified_keys,
            failed_keys: total_keys - verified_keys,
            mismatched_keys,
            results,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed_keys == 0
    }

    /// Results for keys that did not verify.
    pub fn failures(&self) -> impl Iterator<Item = &VerificationResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

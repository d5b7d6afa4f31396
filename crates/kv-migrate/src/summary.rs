//! Final report of a migration run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{MigrateError, Result};
use crate::progress::MigrationStats;
use crate::state::RunStatus;
use crate::verify::VerificationSummary;

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    /// Unique run identifier, kept across resumes.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// When the migration first started (the original run, when resuming).
    pub started_at: DateTime<Utc>,

    /// When this run finished.
    pub completed_at: DateTime<Utc>,

    /// Counters for the keys handled in this run.
    pub stats: MigrationStats,

    /// Keys that could not be transferred.
    pub failed_keys: Vec<String>,

    /// Keys skipped because an earlier run completed them.
    pub skipped_keys: usize,

    /// Post-migration verification, if it ran.
    pub verification: Option<VerificationSummary>,
}

impl MigrationSummary {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The error a caller should report for this run, if it did not succeed.
    pub fn error(&self) -> Option<MigrateError> {
        if self.status == RunStatus::Cancelled {
            return Some(MigrateError::Cancelled);
        }
        if let Some(verification) = self.verification.as_ref().filter(|v| !v.is_success()) {
            return Some(MigrateError::Verification(format!(
                "{} of {} keys failed verification",
                verification.failed_keys, verification.total_keys
            )));
        }
        self.failed_keys.first().map(|first| {
            MigrateError::transfer(
                first.clone(),
                format!("{} keys failed to transfer", self.failed_keys.len()),
            )
        })
    }
}

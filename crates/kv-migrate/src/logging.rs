//! Structured migration events.
//!
//! [`MigrationLogger`] is the event sink the engine reports through. Loggers
//! are immutable: [`MigrationLogger::with_field`] returns a new logger that
//! carries the previous context plus the new field, and the original is left
//! untouched, so a per-key logger can be derived inside a worker without
//! affecting any other worker.

use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::progress::MigrationStats;
use crate::summary::MigrationSummary;
use crate::transfer::TransferOutcome;

/// Shared handle to a logger.
pub type LoggerRef = Arc<dyn MigrationLogger>;

/// Event sink for migration activity.
pub trait MigrationLogger: Send + Sync {
    /// One key finished transferring (successfully or not).
    fn log_key_transfer(&self, outcome: &TransferOutcome);

    /// A store connection was attempted.
    fn log_connection(&self, store: &str, address: &str, connected: bool, error: Option<&str>);

    /// Periodic progress snapshot.
    fn log_progress(&self, stats: &MigrationStats);

    /// An operation failed; `key` names the affected key when there is one.
    fn log_error(&self, operation: &str, key: Option<&str>, error: &str);

    /// Final run summary.
    fn log_summary(&self, summary: &MigrationSummary);

    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);

    /// Fields attached to this logger, oldest first.
    fn fields(&self) -> &[(String, String)];

    /// New logger with one more field attached.
    fn with_field(&self, key: &str, value: &str) -> LoggerRef;

    /// New logger with several more fields attached.
    fn with_fields(&self, fields: &[(&str, &str)]) -> LoggerRef;
}

/// Logger that forwards events to `tracing`.
///
/// Attached fields are rendered into a single `context` field
/// (`key=value key=value`), since `tracing` field names are static.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    fields: Arc<Vec<(String, String)>>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle with no fields attached.
    pub fn shared() -> LoggerRef {
        Arc::new(Self::new())
    }

    fn context(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.fields.iter() {
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = write!(out, "{}={}", key, value);
        }
        out
    }

    fn extended<'a>(&self, extra: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut fields: Vec<(String, String)> = self.fields.as_ref().clone();
        fields.extend(extra.into_iter().map(|(k, v)| (k.to_string(), v.to_string())));
        Self {
            fields: Arc::new(fields),
        }
    }
}

impl MigrationLogger for TracingLogger {
    fn log_key_transfer(&self, outcome: &TransferOutcome) {
        let duration_ms = outcome.duration.as_millis() as u64;
        if outcome.success {
            debug!(
                context = %self.context(),
                key = %outcome.key,
                key_type = %outcome.key_type,
                size = outcome.size,
                duration_ms,
                "key transferred"
            );
        } else {
            warn!(
                context = %self.context(),
                key = %outcome.key,
                key_type = %outcome.key_type,
                duration_ms,
                error = outcome.error.as_deref().unwrap_or("unknown error"),
                "key transfer failed"
            );
        }
    }

    fn log_connection(&self, store: &str, address: &str, connected: bool, err: Option<&str>) {
        if connected {
            info!(context = %self.context(), store, address, "connected");
        } else {
            error!(
                context = %self.context(),
                store,
                address,
                error = err.unwrap_or("unknown error"),
                "connection failed"
            );
        }
    }

    fn log_progress(&self, stats: &MigrationStats) {
        info!(
            context = %self.context(),
            processed = stats.processed_keys,
            total = stats.total_keys,
            successful = stats.successful_keys,
            failed = stats.failed_keys,
            bytes = stats.bytes_transferred,
            "progress {:.1}% ({:.1} keys/s)",
            stats.percentage,
            stats.throughput
        );
    }

    fn log_error(&self, operation: &str, key: Option<&str>, err: &str) {
        match key {
            Some(key) => error!(context = %self.context(), operation, key, "{}", err),
            None => error!(context = %self.context(), operation, "{}", err),
        }
    }

    fn log_summary(&self, summary: &MigrationSummary) {
        let stats = &summary.stats;
        info!(
            context = %self.context(),
            run_id = %summary.run_id,
            status = %summary.status,
            "Migration {}: {}/{} keys ({} failed, {} skipped) in {:.1}s ({:.1} keys/s, {} bytes)",
            summary.status,
            stats.successful_keys,
            stats.total_keys,
            stats.failed_keys,
            summary.skipped_keys,
            stats.duration.as_secs_f64(),
            stats.throughput,
            stats.bytes_transferred
        );
        for key in &summary.failed_keys {
            warn!(context = %self.context(), key = %key, "key failed to transfer");
        }
        if let Some(verification) = &summary.verification {
            info!(
                context = %self.context(),
                "Verification: {}/{} keys verified, {} failed, {} with mismatches",
                verification.verified_keys,
                verification.total_keys,
                verification.failed_keys,
                verification.mismatched_keys
            );
            for result in verification.results.iter().filter(|r| !r.success) {
                if let Some(msg) = &result.error_msg {
                    warn!(context = %self.context(), key = %result.key, "{}", msg);
                }
                for mismatch in &result.mismatches {
                    warn!(context = %self.context(), key = %result.key, "{}", mismatch);
                }
            }
        }
    }

    fn debug(&self, message: &str) {
        debug!(context = %self.context(), "{}", message);
    }

    fn info(&self, message: &str) {
        info!(context = %self.context(), "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(context = %self.context(), "{}", message);
    }

    fn error(&self, message: &str) {
        error!(context = %self.context(), "{}", message);
    }

    fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    fn with_field(&self, key: &str, value: &str) -> LoggerRef {
        Arc::new(self.extended([(key, value)]))
    }

    fn with_fields(&self, fields: &[(&str, &str)]) -> LoggerRef {
        Arc::new(self.extended(fields.iter().copied()))
    }
}

//! Migration progress tracking.
//!
//! [`ProgressMonitor`] keeps every counter behind one `parking_lot::RwLock`
//! so that a snapshot is always internally consistent: readers never observe
//! `processed` without the matching `successful`/`failed` increment.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Lifecycle of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    /// Reserved; no transition leads here yet.
    Paused,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// A point-in-time view of a run's counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStats {
    pub status: MigrationStatus,
    pub total_keys: u64,
    pub processed_keys: u64,
    pub successful_keys: u64,
    pub failed_keys: u64,
    pub bytes_transferred: u64,
    /// Elapsed time while running, frozen once the run ends.
    pub duration: Duration,
    /// Processed keys per second.
    pub throughput: f64,
    /// Processed share of the total, 0..=100.
    pub percentage: f64,
}

/// A failure recorded against a key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyError {
    pub key: String,
    pub message: String,
}

#[derive(Debug)]
struct MonitorState {
    status: MigrationStatus,
    total: u64,
    processed: u64,
    successful: u64,
    failed: u64,
    bytes: u64,
    started_at: Option<Instant>,
    duration: Option<Duration>,
    errors: Vec<KeyError>,
    failure_reason: Option<String>,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            status: MigrationStatus::NotStarted,
            total: 0,
            processed: 0,
            successful: 0,
            failed: 0,
            bytes: 0,
            started_at: None,
            duration: None,
            errors: Vec::new(),
            failure_reason: None,
        }
    }

    fn elapsed(&self) -> Duration {
        match (self.duration, self.started_at) {
            (Some(frozen), _) => frozen,
            (None, Some(start)) => start.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    fn finish(&mut self, status: MigrationStatus) -> bool {
        if self.status != MigrationStatus::Running {
            return false;
        }
        self.duration = Some(self.elapsed());
        self.status = status;
        true
    }
}

/// Thread-safe progress counters with a status state machine.
///
/// `NotStarted -> Running -> {Completed, Failed}`. Counter updates are
/// ignored unless the monitor is `Running`; calling [`start`](Self::start)
/// again resets everything.
pub struct ProgressMonitor {
    state: RwLock<MonitorState>,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MonitorState::new()),
        }
    }

    /// Enter `Running` with `total` keys, clearing counters, errors and the clock.
    pub fn start(&self, total: u64) {
        let mut state = self.state.write();
        *state = MonitorState::new();
        state.total = total;
        state.status = MigrationStatus::Running;
        state.started_at = Some(Instant::now());
    }

    /// A key transferred successfully with `bytes` of payload.
    pub fn record_success(&self, bytes: u64) {
        let mut state = self.state.write();
        if state.status != MigrationStatus::Running {
            return;
        }
        state.processed += 1;
        state.successful += 1;
        state.bytes += bytes;
    }

    /// A key failed; the error is kept for the final report.
    pub fn record_failure(&self, key: &str, message: &str) {
        let mut state = self.state.write();
        if state.status != MigrationStatus::Running {
            return;
        }
        state.processed += 1;
        state.failed += 1;
        state.errors.push(KeyError {
            key: key.to_string(),
            message: message.to_string(),
        });
    }

    /// Count a successful key without payload accounting.
    pub fn increment_processed(&self) {
        self.record_success(0);
    }

    /// Count a failed key without an error entry.
    pub fn increment_failed(&self) {
        let mut state = self.state.write();
        if state.status != MigrationStatus::Running {
            return;
        }
        state.processed += 1;
        state.failed += 1;
    }

    /// `Running -> Completed`, freezing the duration. No-op in any other state.
    pub fn complete(&self) -> bool {
        self.state.write().finish(MigrationStatus::Completed)
    }

    /// `Running -> Failed`, freezing the duration. No-op in any other state.
    pub fn fail(&self, reason: &str) -> bool {
        let mut state = self.state.write();
        let changed = state.finish(MigrationStatus::Failed);
        if changed {
            state.failure_reason = Some(reason.to_string());
        }
        changed
    }

    pub fn status(&self) -> MigrationStatus {
        self.state.read().status
    }

    /// Processed keys per second since start; 0 before any time has elapsed.
    pub fn throughput(&self) -> f64 {
        let state = self.state.read();
        throughput(state.processed, state.elapsed())
    }

    /// Processed share of the total; 0 when the total is 0.
    pub fn percentage(&self) -> f64 {
        let state = self.state.read();
        percentage(state.processed, state.total)
    }

    /// Consistent snapshot of every counter.
    pub fn stats(&self) -> MigrationStats {
        let state = self.state.read();
        let duration = state.elapsed();
        MigrationStats {
            status: state.status,
            total_keys: state.total,
            processed_keys: state.processed,
            successful_keys: state.successful,
            failed_keys: state.failed,
            bytes_transferred: state.bytes,
            duration,
            throughput: throughput(state.processed, duration),
            percentage: percentage(state.processed, state.total),
        }
    }

    /// Errors recorded so far, in arrival order.
    pub fn errors(&self) -> Vec<KeyError> {
        self.state.read().errors.clone()
    }

    /// Why the run failed, if it did.
    pub fn failure_reason(&self) -> Option<String> {
        self.state.read().failure_reason.clone()
    }
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn throughput(processed: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    processed as f64 / secs
}

fn percentage(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    processed as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_monitor_defaults() {
        let monitor = ProgressMonitor::new();
        let stats = monitor.stats();
        assert_eq!(stats.status, MigrationStatus::NotStarted);
        assert_eq!(stats.processed_keys, 0);
        assert_eq!(stats.percentage, 0.0);
        assert_eq!(stats.throughput, 0.0);
    }

    #[test]
    fn test_updates_ignored_before_start() {
        let monitor = ProgressMonitor::new();
        monitor.record_success(10);
        monitor.record_failure("k", "boom");
        monitor.increment_processed();
        monitor.increment_failed();
        let stats = monitor.stats();
        assert_eq!(stats.processed_keys, 0);
        assert!(monitor.errors().is_empty());
    }

    #[test]
    fn test_percentage_and_invariant() {
        let monitor = ProgressMonitor::new();
        monitor.start(200);
        for _ in 0..30 {
            monitor.record_success(5);
        }
        for i in 0..20 {
            monitor.record_failure(&format!("k{}", i), "reset");
        }
        let stats = monitor.stats();
        assert_eq!(stats.processed_keys, 50);
        assert_eq!(
            stats.processed_keys,
            stats.successful_keys + stats.failed_keys
        );
        assert!((stats.percentage - 25.0).abs() < f64::EPSILON);
        assert_eq!(stats.bytes_transferred, 150);
        assert_eq!(monitor.errors().len(), 20);
    }

    #[test]
    fn test_percentage_zero_total() {
        let monitor = ProgressMonitor::new();
        monitor.start(0);
        monitor.increment_processed();
        assert_eq!(monitor.percentage(), 0.0);
    }

    #[test]
    fn test_complete_freezes_duration() {
        let monitor = ProgressMonitor::new();
        monitor.start(1);
        monitor.increment_processed();
        thread::sleep(Duration::from_millis(5));
        assert!(monitor.complete());
        let first = monitor.stats().duration;
        thread::sleep(Duration::from_millis(10));
        assert_eq!(monitor.stats().duration, first);
        assert!(monitor.throughput() > 0.0);

        // Terminal: further transitions and updates are ignored
        assert!(!monitor.fail("late"));
        monitor.increment_processed();
        assert_eq!(monitor.status(), MigrationStatus::Completed);
        assert_eq!(monitor.stats().processed_keys, 1);
    }

    #[test]
    fn test_fail_records_reason() {
        let monitor = ProgressMonitor::new();
        assert!(!monitor.fail("not running"));
        monitor.start(10);
        assert!(monitor.fail("source unreachable"));
        assert_eq!(monitor.status(), MigrationStatus::Failed);
        assert_eq!(
            monitor.failure_reason().as_deref(),
            Some("source unreachable")
        );
    }

    #[test]
    fn test_restart_resets_counters() {
        let monitor = ProgressMonitor::new();
        monitor.start(10);
        monitor.record_failure("a", "x");
        monitor.start(5);
        let stats = monitor.stats();
        assert_eq!(stats.total_keys, 5);
        assert_eq!(stats.processed_keys, 0);
        assert!(monitor.errors().is_empty());
        assert_eq!(stats.status, MigrationStatus::Running);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let monitor = Arc::new(ProgressMonitor::new());
        monitor.start(8_000);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let monitor = monitor.clone();
                thread::spawn(move || {
                    for i in 0..1_000 {
                        if i % 4 == 0 {
                            monitor.record_failure(&format!("{}:{}", t, i), "x");
                        } else {
                            monitor.record_success(1);
                        }
                        let stats = monitor.stats();
                        assert_eq!(
                            stats.processed_keys,
                            stats.successful_keys + stats.failed_keys
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = monitor.stats();
        assert_eq!(stats.processed_keys, 8_000);
        assert_eq!(stats.failed_keys, 2_000);
        assert!((stats.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(MigrationStatus::NotStarted.to_string(), "not_started");
        assert_eq!(MigrationStatus::Completed.to_string(), "completed");
    }
}

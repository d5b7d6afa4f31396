//! Migration orchestrator - main workflow coordinator.
//!
//! A run enumerates the source keys, skips those completed by an earlier
//! run, and transfers the rest in batches. Within a batch every key is its
//! own task, bounded by a semaphore sized to the worker count. Between
//! batches the orchestrator checks for cancellation and checkpoints the
//! resume state. Verification starts only after every batch has drained.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{Config, StoreConfig};
use crate::core::{KeyType, StoreRef};
use crate::error::{MigrateError, Result};
use crate::logging::{LoggerRef, TracingLogger};
use crate::progress::{MigrationStats, ProgressMonitor};
use crate::recovery::ConnectionRecovery;
use crate::summary::MigrationSummary;
use crate::state::{
    FileStateBackend, NoOpStateBackend, ResumeSnapshot, ResumeState, RunStatus, StateBackend,
};
use crate::store::RedisStore;
use crate::timeout::TimeoutPolicy;
use crate::transfer::{DataTypeProcessor, TransferOutcome};
use crate::verify::{DataVerifier, VerificationSummary};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: StoreRef,
    target: StoreRef,
    state_backend: Arc<dyn StateBackend>,
    snapshot: Option<ResumeSnapshot>,
    logger: LoggerRef,
    monitor: Arc<ProgressMonitor>,
    progress_output: bool,
}

/// Connectivity of both stores.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Everything a transfer task needs.
struct WorkerContext {
    source: StoreRef,
    target: StoreRef,
    processor: Arc<DataTypeProcessor>,
    recovery: ConnectionRecovery,
    resume: Arc<ResumeState>,
    monitor: Arc<ProgressMonitor>,
    logger: LoggerRef,
}

#[derive(Default)]
struct BatchResults {
    transferred: Vec<String>,
    failed: Vec<String>,
    cancelled: bool,
}

impl Orchestrator {
    /// Create a new orchestrator connected to the configured stores.
    pub async fn new(config: Config) -> Result<Self> {
        let timeouts = TimeoutPolicy::new(config.timeouts.clone())?;
        let recovery = ConnectionRecovery::new(config.retry.clone())?;
        let logger = TracingLogger::shared();

        let source = connect(&config, &config.source, "source", &timeouts, &recovery, &logger).await?;
        let target = connect(&config, &config.target, "target", &timeouts, &recovery, &logger).await?;

        Ok(Self::with_stores(config, source, target).with_logger(logger))
    }

    /// Create an orchestrator over already connected stores.
    pub fn with_stores(config: Config, source: StoreRef, target: StoreRef) -> Self {
        Self {
            config,
            source,
            target,
            state_backend: Arc::new(NoOpStateBackend::new()),
            snapshot: None,
            logger: TracingLogger::shared(),
            monitor: Arc::new(ProgressMonitor::new()),
            progress_output: false,
        }
    }

    /// Set the state file path for resume capability.
    pub fn with_state_file(self, path: PathBuf) -> Self {
        self.with_state_backend(Arc::new(FileStateBackend::new(path)))
    }

    pub fn with_state_backend(mut self, backend: Arc<dyn StateBackend>) -> Self {
        self.state_backend = backend;
        self
    }

    pub fn with_logger(mut self, logger: LoggerRef) -> Self {
        self.logger = logger;
        self
    }

    /// Print progress updates as JSON lines to stderr.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress_output = enabled;
        self
    }

    /// Progress monitor updated by [`run`](Self::run).
    pub fn monitor(&self) -> Arc<ProgressMonitor> {
        self.monitor.clone()
    }

    /// Load existing state for resume.
    pub async fn resume(mut self) -> Result<Self> {
        match self.state_backend.load(&self.config.hash()).await? {
            Some(snapshot) => {
                info!(
                    "Resuming run {} ({} keys already migrated, {} backend)",
                    snapshot.run_id,
                    snapshot.processed_keys.len(),
                    self.state_backend.backend_type()
                );
                self.snapshot = Some(snapshot);
            }
            None => info!("No previous state found, starting a fresh run"),
        }
        Ok(self)
    }

    /// Run the migration.
    pub async fn run(self, cancel: CancellationToken) -> Result<MigrationSummary> {
        let started_at = self
            .snapshot
            .as_ref()
            .map(|s| s.started_at)
            .unwrap_or_else(Utc::now);
        let run_id = self
            .snapshot
            .as_ref()
            .map(|s| s.run_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let config_hash = self.config.hash();
        let logger = self.logger.with_field("run_id", &run_id);
        let resume = Arc::new(
            self.snapshot
                .as_ref()
                .map(ResumeState::restore)
                .unwrap_or_default(),
        );
        let recovery = ConnectionRecovery::new(self.config.retry.clone())?;

        logger.info(&format!(
            "Starting migration run: {} -> {}",
            self.source.name(),
            self.target.name()
        ));

        // Only total loss of either store aborts the run
        if let Err(e) = self.reach_stores(&recovery).await {
            return Err(self.abort(&logger, "connect", e).await);
        }
        let keys = match self.enumerate_keys(&recovery).await {
            Ok(keys) => keys,
            Err(e) => return Err(self.abort(&logger, "enumerate keys", e).await),
        };

        resume.set_total(keys.len() as u64);
        let pending: Vec<String> = keys
            .iter()
            .filter(|k| !resume.is_processed(k))
            .cloned()
            .collect();
        let skipped_keys = keys.len() - pending.len();
        if skipped_keys > 0 {
            logger.info(&format!(
                "Skipping {} keys completed by a previous run",
                skipped_keys
            ));
        }
        logger.info(&format!("Found {} keys to migrate", pending.len()));

        self.monitor.start(pending.len() as u64);
        let reporter_stop = CancellationToken::new();
        let reporter = spawn_progress_reporter(
            self.monitor.clone(),
            logger.clone(),
            self.config.migration.get_progress_interval(),
            self.progress_output,
            reporter_stop.clone(),
        );

        let ctx = Arc::new(WorkerContext {
            source: self.source.clone(),
            target: self.target.clone(),
            processor: Arc::new(DataTypeProcessor::new(
                self.config.timeouts.large_data_threshold,
                logger.clone(),
            )),
            recovery,
            resume: resume.clone(),
            monitor: self.monitor.clone(),
            logger: logger.clone(),
        });

        let batch_results = self
            .transfer_batches(&ctx, &pending, &cancel, &run_id, &config_hash, started_at)
            .await;
        reporter_stop.cancel();
        let _ = reporter.await;
        let BatchResults {
            transferred,
            failed: failed_keys,
            cancelled,
        } = match batch_results {
            Ok(results) => results,
            Err(e) => return Err(self.abort(&logger, "transfer", e).await),
        };

        if cancelled {
            self.monitor.fail("cancelled");
        } else {
            self.monitor.complete();
        }

        let verification = if !cancelled && self.config.migration.verify {
            let verifier = DataVerifier::new(&self.config.verify, logger.clone());
            Some(
                verifier
                    .verify_all_keys(&transferred, self.source.as_ref(), self.target.as_ref())
                    .await,
            )
        } else {
            None
        };

        let status = if cancelled {
            RunStatus::Cancelled
        } else if !failed_keys.is_empty()
            || verification.as_ref().is_some_and(|v| !v.is_success())
        {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        if let Err(e) = self
            .checkpoint(&resume, &run_id, &config_hash, started_at, status)
            .await
        {
            return Err(self.abort(&logger, "save state", e).await);
        }

        let summary = MigrationSummary {
            run_id,
            status,
            started_at,
            completed_at: Utc::now(),
            stats: self.monitor.stats(),
            failed_keys,
            skipped_keys,
            verification,
        };
        logger.log_summary(&summary);
        if self.progress_output {
            emit_progress_line(&summary.stats);
        }

        self.disconnect().await;
        Ok(summary)
    }

    async fn transfer_batches(
        &self,
        ctx: &Arc<WorkerContext>,
        pending: &[String],
        cancel: &CancellationToken,
        run_id: &str,
        config_hash: &str,
        started_at: DateTime<Utc>,
    ) -> Result<BatchResults> {
        let batch_size = self.config.migration.get_batch_size().max(1);
        let workers = self.config.migration.get_workers().max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let total_batches = pending.len().div_ceil(batch_size);
        let mut results = BatchResults::default();

        for (index, batch) in pending.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                ctx.logger.warn(&format!(
                    "Cancellation requested, stopping before batch {}/{}",
                    index + 1,
                    total_batches
                ));
                results.cancelled = true;
                break;
            }

            let mut handles: Vec<(String, JoinHandle<TransferOutcome>)> =
                Vec::with_capacity(batch.len());
            for key in batch {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| MigrateError::transfer(key.clone(), e.to_string()))?;
                let ctx = ctx.clone();
                let task_key = key.clone();
                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    migrate_key(&ctx, task_key).await
                });
                handles.push((key.clone(), handle));
            }

            for (key, handle) in handles {
                match handle.await {
                    Ok(outcome) if outcome.success => results.transferred.push(outcome.key),
                    Ok(outcome) => results.failed.push(outcome.key),
                    Err(e) => {
                        let message = format!("transfer task aborted: {}", e);
                        ctx.logger.log_error("transfer", Some(&key), &message);
                        ctx.monitor.record_failure(&key, &message);
                        results.failed.push(key);
                    }
                }
            }

            self.checkpoint(&ctx.resume, run_id, config_hash, started_at, RunStatus::Running)
                .await?;
            debug!(
                "Batch {}/{} done ({} keys)",
                index + 1,
                total_batches,
                batch.len()
            );
        }

        Ok(results)
    }

    async fn checkpoint(
        &self,
        resume: &ResumeState,
        run_id: &str,
        config_hash: &str,
        started_at: DateTime<Utc>,
        status: RunStatus,
    ) -> Result<()> {
        let snapshot = resume.snapshot(run_id, config_hash, started_at, status);
        self.state_backend.save(&snapshot).await
    }

    async fn reach_stores(&self, recovery: &ConnectionRecovery) -> Result<()> {
        for store in [&self.source, &self.target] {
            recovery
                .with_retry(&format!("ping {}", store.name()), || {
                    let store = store.clone();
                    async move { store.ping().await }
                })
                .await?;
        }
        Ok(())
    }

    async fn enumerate_keys(&self, recovery: &ConnectionRecovery) -> Result<Vec<String>> {
        recovery
            .with_retry("enumerate source keys", || {
                let source = self.source.clone();
                async move { source.get_all_keys().await }
            })
            .await
    }

    /// Mark the run failed and release both stores before surfacing `err`.
    async fn abort(&self, logger: &LoggerRef, operation: &str, err: MigrateError) -> MigrateError {
        let message = err.to_string();
        logger.log_error(operation, None, &message);
        self.monitor.fail(&message);
        self.disconnect().await;
        err
    }

    async fn disconnect(&self) {
        for store in [&self.source, &self.target] {
            if let Err(e) = store.disconnect().await {
                self.logger
                    .warn(&format!("Failed to disconnect from {}: {}", store.name(), e));
            }
        }
    }

    /// Compare every source key with the target without transferring anything.
    pub async fn verify_only(&self) -> Result<VerificationSummary> {
        let recovery = ConnectionRecovery::new(self.config.retry.clone())?;
        self.reach_stores(&recovery).await?;
        let keys = self.enumerate_keys(&recovery).await?;

        let verifier = DataVerifier::new(&self.config.verify, self.logger.clone());
        let summary = verifier
            .verify_all_keys(&keys, self.source.as_ref(), self.target.as_ref())
            .await;
        self.logger.info(&format!(
            "Verification: {}/{} keys verified, {} failed, {} with mismatches",
            summary.verified_keys, summary.total_keys, summary.failed_keys, summary.mismatched_keys
        ));
        Ok(summary)
    }

    /// Ping both stores and report latency.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let (source_connected, source_latency_ms, source_error) = ping_store(&self.source).await;
        let (target_connected, target_latency_ms, target_error) = ping_store(&self.target).await;

        Ok(HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            target_connected,
            target_latency_ms,
            target_error,
            healthy: source_connected && target_connected,
        })
    }
}

async fn connect(
    config: &Config,
    store: &StoreConfig,
    role: &str,
    timeouts: &TimeoutPolicy,
    recovery: &ConnectionRecovery,
    logger: &LoggerRef,
) -> Result<StoreRef> {
    let address = store.redacted_url();
    let result = recovery
        .with_retry(&format!("connect {}", role), || {
            let timeouts = timeouts.clone();
            async move { RedisStore::connect(store, role, timeouts).await }
        })
        .await;

    match result {
        Ok(client) => {
            logger.log_connection(role, &address, true, None);
            Ok(Arc::new(client.with_scan(
                &config.migration.key_pattern,
                config.migration.get_scan_count(),
            )))
        }
        Err(e) => {
            logger.log_connection(role, &address, false, Some(&e.to_string()));
            Err(e)
        }
    }
}

/// Transfer one key with retries, then record the outcome.
async fn migrate_key(ctx: &WorkerContext, key: String) -> TransferOutcome {
    let start = Instant::now();
    let mut key_type = KeyType::None;
    let type_result = ctx
        .recovery
        .with_retry(&format!("type {}", key), || {
            let source = ctx.source.clone();
            let key = key.clone();
            async move { source.get_key_type(&key).await }
        })
        .await;

    let result = match type_result {
        Ok(read) => {
            key_type = read.clone();
            ctx.recovery
                .with_retry(&format!("transfer {}", key), || {
                    let source = ctx.source.clone();
                    let target = ctx.target.clone();
                    let processor = ctx.processor.clone();
                    let key = key.clone();
                    let key_type = read.clone();
                    async move {
                        processor
                            .transfer_key(&key, &key_type, source.as_ref(), target.as_ref())
                            .await
                    }
                })
                .await
        }
        Err(e) => Err(e),
    };

    let mut outcome = result.unwrap_or_else(|e| {
        TransferOutcome::failed(&key, key_type, Duration::ZERO, e.to_string())
    });
    outcome.duration = start.elapsed();

    if outcome.success {
        ctx.resume.mark_processed(&key);
        ctx.monitor.record_success(outcome.bytes);
    } else {
        let message = outcome.error.as_deref().unwrap_or("unknown error");
        ctx.monitor.record_failure(&key, message);
    }
    ctx.logger.log_key_transfer(&outcome);
    outcome
}

async fn ping_store(store: &StoreRef) -> (bool, u64, Option<String>) {
    let start = Instant::now();
    let result = store.ping().await;
    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => (true, latency_ms, None),
        Err(e) => (false, latency_ms, Some(e.to_string())),
    }
}

fn spawn_progress_reporter(
    monitor: Arc<ProgressMonitor>,
    logger: LoggerRef,
    interval: Duration,
    json_lines: bool,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let stats = monitor.stats();
                    logger.log_progress(&stats);
                    if json_lines {
                        emit_progress_line(&stats);
                    }
                }
            }
        }
    })
}

fn emit_progress_line(stats: &MigrationStats) {
    if let Ok(line) = serde_json::to_string(stats) {
        eprintln!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{KvStore, Value};
    use crate::progress::MigrationStatus;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tempfile::TempDir;

    const CONFIG: &str = r#"
source:
  url: redis://source:6379
target:
  url: redis://target:6379
migration:
  workers: 3
  batch_size: 2
retry:
  max_attempts: 3
  initial_delay_ms: 1
  max_delay_ms: 2
"#;

    fn config() -> Config {
        Config::from_yaml(CONFIG).unwrap()
    }

    fn seeded_source() -> Arc<MemoryStore> {
        let source = MemoryStore::new("source");
        let mut hash = BTreeMap::new();
        hash.insert("name".to_string(), "ada".to_string());
        source.insert("user:1", Value::Hash(hash));
        source.insert("greeting", Value::from("hello"));
        source.insert("queue", Value::List(vec!["a".into(), "b".into()]));
        source.insert("tags", Value::Set(["x".to_string()].into_iter().collect()));
        source.insert("scores", Value::ZSet(vec![("ada".into(), 10.0)]));
        source.insert("empty", Value::List(Vec::new()));
        Arc::new(source)
    }

    /// Wraps a MemoryStore and fails writes: the first `transient` writes
    /// with a retryable error, and writes to `poisoned` keys always.
    struct FlakyStore {
        inner: MemoryStore,
        transient: AtomicU32,
        poisoned: HashSet<String>,
        disconnected: AtomicBool,
    }

    impl FlakyStore {
        fn new(transient: u32, poisoned: &[&str]) -> Self {
            Self {
                inner: MemoryStore::new("flaky"),
                transient: AtomicU32::new(transient),
                poisoned: poisoned.iter().map(|s| s.to_string()).collect(),
                disconnected: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl KvStore for FlakyStore {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn get_all_keys(&self) -> Result<Vec<String>> {
            self.inner.get_all_keys().await
        }
        async fn get_key_type(&self, key: &str) -> Result<KeyType> {
            self.inner.get_key_type(key).await
        }
        async fn get_value(&self, key: &str) -> Result<Value> {
            self.inner.get_value(key).await
        }
        async fn set_value(&self, key: &str, value: &Value) -> Result<()> {
            if self.poisoned.contains(key) {
                return Err(MigrateError::Connection("NOAUTH authentication required".into()));
            }
            let remaining = self.transient.load(Ordering::SeqCst);
            if remaining > 0
                && self
                    .transient
                    .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                return Err(MigrateError::Connection("connection reset by peer".into()));
            }
            self.inner.set_value(key, value).await
        }
        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }
        async fn get_ttl(&self, key: &str) -> Result<Option<Duration>> {
            self.inner.get_ttl(key).await
        }
        async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<()> {
            self.inner.set_ttl(key, ttl).await
        }
        async fn disconnect(&self) -> Result<()> {
            self.disconnected.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn name(&self) -> &str {
            "flaky"
        }
    }

    /// Backend that cannot persist anything.
    struct ReadOnlyBackend;

    #[async_trait]
    impl StateBackend for ReadOnlyBackend {
        async fn load(&self, _config_hash: &str) -> Result<Option<ResumeSnapshot>> {
            Ok(None)
        }
        async fn save(&self, _snapshot: &ResumeSnapshot) -> Result<()> {
            Err(MigrateError::State("read-only file system".into()))
        }
        fn backend_type(&self) -> &'static str {
            "read-only"
        }
    }

    #[tokio::test]
    async fn test_full_run_transfers_and_verifies() {
        let source = seeded_source();
        let target = Arc::new(MemoryStore::new("target"));

        let summary = Orchestrator::with_stores(config(), source.clone(), target.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.stats.total_keys, 6);
        assert_eq!(summary.stats.successful_keys, 6);
        assert!(summary.failed_keys.is_empty());
        assert!(summary.error().is_none());

        let verification = summary.verification.unwrap();
        assert_eq!(verification.verified_keys, 6);
        for key in source.get_all_keys().await.unwrap() {
            assert_eq!(target.peek(&key), source.peek(&key), "{}", key);
        }
        assert_eq!(target.get_key_type("empty").await.unwrap(), KeyType::List);
    }

    #[tokio::test]
    async fn test_transient_write_failures_are_retried() {
        let source = seeded_source();
        let target = Arc::new(FlakyStore::new(2, &[]));

        let summary = Orchestrator::with_stores(config(), source, target.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.stats.failed_keys, 0);
        assert_eq!(target.inner.len(), 6);
    }

    #[tokio::test]
    async fn test_permanent_failure_does_not_abort_run() {
        let source = seeded_source();
        let target = Arc::new(FlakyStore::new(0, &["queue"]));

        let orchestrator = Orchestrator::with_stores(config(), source, target.clone());
        let monitor = orchestrator.monitor();
        let summary = orchestrator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.failed_keys, vec!["queue"]);
        assert_eq!(summary.stats.successful_keys, 5);
        assert_eq!(summary.stats.processed_keys, 6);
        assert_eq!(monitor.errors().len(), 1);
        assert!(monitor.errors()[0].message.contains("NOAUTH"));
        // Failed keys are not verified
        assert_eq!(summary.verification.as_ref().unwrap().total_keys, 5);
        assert!(matches!(summary.error(), Some(MigrateError::Transfer { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_batch() {
        let source = seeded_source();
        let target = Arc::new(MemoryStore::new("target"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = Orchestrator::with_stores(config(), source, target.clone())
            .run(cancel)
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Cancelled);
        assert!(summary.verification.is_none());
        assert_eq!(summary.stats.processed_keys, 0);
        assert!(target.is_empty());
        assert!(matches!(summary.error(), Some(MigrateError::Cancelled)));
    }

    #[tokio::test]
    async fn test_resume_skips_completed_keys() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("state.json");
        let config = config();

        let previous = ResumeState::new();
        previous.mark_processed("greeting");
        previous.mark_processed("user:1");
        let snapshot = previous.snapshot("run-42", &config.hash(), Utc::now(), RunStatus::Cancelled);
        FileStateBackend::new(&state_path).save(&snapshot).await.unwrap();

        let source = seeded_source();
        let target = Arc::new(MemoryStore::new("target"));
        let summary = Orchestrator::with_stores(config, source, target.clone())
            .with_state_file(state_path.clone())
            .resume()
            .await
            .unwrap()
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.run_id, "run-42");
        assert_eq!(summary.skipped_keys, 2);
        assert_eq!(summary.stats.total_keys, 4);
        assert!(!target.exists("greeting").await.unwrap());
        assert!(target.exists("queue").await.unwrap());
        assert_eq!(summary.verification.unwrap().total_keys, 4);

        let saved = ResumeSnapshot::load(&state_path).unwrap();
        assert_eq!(saved.status, RunStatus::Completed);
        assert_eq!(saved.processed_keys.len(), 6);
        assert_eq!(saved.total_keys, 6);
    }

    #[tokio::test]
    async fn test_resume_refuses_changed_config() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("state.json");
        let snapshot = ResumeState::new().snapshot("r", "stale-hash", Utc::now(), RunStatus::Failed);
        FileStateBackend::new(&state_path).save(&snapshot).await.unwrap();

        let result = Orchestrator::with_stores(
            config(),
            seeded_source(),
            Arc::new(MemoryStore::new("target")),
        )
        .with_state_file(state_path)
        .resume()
        .await;
        assert!(matches!(result, Err(MigrateError::ConfigChanged)));
    }

    #[tokio::test]
    async fn test_verify_only_reports_drift() {
        let source = seeded_source();
        let target = Arc::new(MemoryStore::new("target"));
        Orchestrator::with_stores(config(), source.clone(), target.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();

        target.insert("greeting", Value::from("goodbye"));
        target.remove("tags");

        let summary = Orchestrator::with_stores(config(), source, target)
            .verify_only()
            .await
            .unwrap();
        assert_eq!(summary.total_keys, 6);
        assert_eq!(summary.failed_keys, 2);
        assert_eq!(summary.mismatched_keys, 1);
    }

    #[tokio::test]
    async fn test_health_check() {
        let result = Orchestrator::with_stores(
            config(),
            Arc::new(MemoryStore::new("source")),
            Arc::new(MemoryStore::new("target")),
        )
        .health_check()
        .await
        .unwrap();
        assert!(result.healthy);
        assert!(result.source_error.is_none());
    }

    #[tokio::test]
    async fn test_summary_json() {
        let summary = Orchestrator::with_stores(
            config(),
            seeded_source(),
            Arc::new(MemoryStore::new("target")),
        )
        .run(CancellationToken::new())
        .await
        .unwrap();
        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["stats"]["successful_keys"], 6);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_fails_run_and_disconnects() {
        let source = seeded_source();
        let target = Arc::new(FlakyStore::new(0, &[]));

        let orchestrator = Orchestrator::with_stores(config(), source, target.clone())
            .with_state_backend(Arc::new(ReadOnlyBackend));
        let monitor = orchestrator.monitor();
        let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, MigrateError::State(_)));
        assert_eq!(monitor.status(), MigrationStatus::Failed);
        assert!(monitor
            .failure_reason()
            .unwrap()
            .contains("read-only file system"));
        assert!(target.disconnected.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_key_keeps_its_type() {
        let source = seeded_source();
        let target: StoreRef = Arc::new(FlakyStore::new(0, &["queue"]));
        let config = config();
        let monitor = Arc::new(ProgressMonitor::new());
        monitor.start(1);
        let ctx = WorkerContext {
            source,
            target,
            processor: Arc::new(DataTypeProcessor::new(10, TracingLogger::shared())),
            recovery: ConnectionRecovery::new(config.retry.clone()).unwrap(),
            resume: Arc::new(ResumeState::new()),
            monitor: monitor.clone(),
            logger: TracingLogger::shared(),
        };

        let outcome = migrate_key(&ctx, "queue".to_string()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.key_type, KeyType::List);
        assert!(outcome.error.unwrap().contains("NOAUTH"));
        assert!(!ctx.resume.is_processed("queue"));
        assert_eq!(monitor.stats().failed_keys, 1);
    }
}

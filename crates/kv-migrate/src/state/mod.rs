//! Resume capability: which keys are done, and how that survives a restart.
//!
//! [`ResumeState`] is the live, shared set of completed keys. A
//! [`ResumeSnapshot`] is its persisted form: a JSON document signed with
//! HMAC-SHA256 (keyed by the config hash) and written atomically.

pub mod backend;
pub mod noop;

pub use backend::{FileStateBackend, StateBackend};
pub use noop::NoOpStateBackend;

use crate::error::{MigrateError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    processed: HashSet<String>,
    total: Option<u64>,
}

/// Set of keys whose migration completed in this or an earlier run.
///
/// Keys are only ever added. Reads take a shared lock, so workers can
/// check membership concurrently.
#[derive(Debug, Default)]
pub struct ResumeState {
    inner: RwLock<Inner>,
}

impl ResumeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the processed set from a persisted snapshot.
    ///
    /// The declared total is not restored: each session declares its own.
    pub fn restore(snapshot: &ResumeSnapshot) -> Self {
        Self {
            inner: RwLock::new(Inner {
                processed: snapshot.processed_keys.iter().cloned().collect(),
                total: None,
            }),
        }
    }

    /// Declare the session's key total. Only the first call has an effect.
    pub fn set_total(&self, total: u64) -> bool {
        let mut inner = self.inner.write();
        if inner.total.is_some() {
            return false;
        }
        inner.total = Some(total);
        true
    }

    pub fn total(&self) -> u64 {
        self.inner.read().total.unwrap_or(0)
    }

    /// Mark `key` as done. Returns false if it already was.
    pub fn mark_processed(&self, key: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.processed.contains(key) {
            return false;
        }
        inner.processed.insert(key.to_string())
    }

    pub fn is_processed(&self, key: &str) -> bool {
        self.inner.read().processed.contains(key)
    }

    pub fn processed_count(&self) -> usize {
        self.inner.read().processed.len()
    }

    /// Processed keys in sorted order.
    pub fn processed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.read().processed.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Capture the current state for persistence.
    pub fn snapshot(
        &self,
        run_id: &str,
        config_hash: &str,
        started_at: DateTime<Utc>,
        status: RunStatus,
    ) -> ResumeSnapshot {
        ResumeSnapshot {
            run_id: run_id.to_string(),
            config_hash: config_hash.to_string(),
            started_at,
            updated_at: Utc::now(),
            status,
            total_keys: self.total(),
            processed_keys: self.processed_keys(),
            hmac: None,
        }
    }
}

/// Persisted form of [`ResumeState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeSnapshot {
    /// Unique run identifier, kept across resumes.
    pub run_id: String,

    /// SHA256 hash of the configuration.
    pub config_hash: String,

    /// When the first run of this migration started.
    pub started_at: DateTime<Utc>,

    /// When this snapshot was taken.
    pub updated_at: DateTime<Utc>,

    /// Run status at snapshot time.
    pub status: RunStatus,

    /// Keys in scope when the snapshot was taken.
    pub total_keys: u64,

    /// Keys fully migrated, sorted.
    pub processed_keys: Vec<String>,

    /// HMAC-SHA256 signature over the snapshot (excluding this field),
    /// keyed by config_hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

impl ResumeSnapshot {
    fn compute_hmac(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.hmac = None;

        let content = serde_json::to_string(&unsigned)
            .map_err(|e| MigrateError::State(format!("Failed to serialize state for HMAC: {}", e)))?;

        let mut mac = HmacSha256::new_from_slice(self.config_hash.as_bytes())
            .map_err(|e| MigrateError::State(format!("Failed to create HMAC: {}", e)))?;

        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Load a snapshot from a file, rejecting it if the signature does not match.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Self = serde_json::from_str(&content)?;

        match &snapshot.hmac {
            Some(stored) => {
                if stored != &snapshot.compute_hmac()? {
                    return Err(MigrateError::State(
                        "State file integrity check failed: HMAC mismatch (possible tampering)"
                            .to_string(),
                    ));
                }
            }
            None => {
                tracing::warn!("State file has no HMAC signature, integrity cannot be verified");
            }
        }

        Ok(snapshot)
    }

    /// Sign and save the snapshot (atomic write: temp file, then rename).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        self.hmac = Some(self.compute_hmac()?);

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| MigrateError::State(format!("Failed to serialize state: {}", e)))?;

        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Validate that the config hash matches for resume.
    pub fn validate_config(&self, config_hash: &str) -> Result<()> {
        if self.config_hash != config_hash {
            return Err(MigrateError::ConfigChanged);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mark_processed_is_idempotent() {
        let state = ResumeState::new();
        assert!(!state.is_processed("user:1"));
        assert!(state.mark_processed("user:1"));
        assert!(!state.mark_processed("user:1"));
        assert!(state.is_processed("user:1"));
        assert_eq!(state.processed_count(), 1);
    }

    #[test]
    fn test_total_is_set_once() {
        let state = ResumeState::new();
        assert_eq!(state.total(), 0);
        assert!(state.set_total(10));
        assert!(!state.set_total(20));
        assert_eq!(state.total(), 10);
    }

    #[test]
    fn test_concurrent_marking() {
        let state = Arc::new(ResumeState::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        state.mark_processed(&format!("key:{}", i));
                        assert!(state.is_processed(&format!("key:{}", i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(state.processed_count(), 500);
    }

    #[test]
    fn test_snapshot_save_load_round_trip() {
        let state = ResumeState::new();
        state.set_total(3);
        state.mark_processed("b");
        state.mark_processed("a");

        let mut snapshot = state.snapshot("run-1", "hash", Utc::now(), RunStatus::Running);
        assert_eq!(snapshot.processed_keys, vec!["a", "b"]);

        let file = NamedTempFile::new().unwrap();
        snapshot.save(file.path()).unwrap();

        let loaded = ResumeSnapshot::load(file.path()).unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(loaded.total_keys, 3);
        assert!(loaded.hmac.is_some());

        let restored = ResumeState::restore(&loaded);
        assert!(restored.is_processed("a"));
        assert!(restored.is_processed("b"));
        assert_eq!(restored.processed_count(), 2);
        assert_eq!(restored.total(), 0);
    }

    #[test]
    fn test_tampered_snapshot_rejected() {
        let state = ResumeState::new();
        state.mark_processed("a");
        let mut snapshot = state.snapshot("run-1", "hash", Utc::now(), RunStatus::Running);

        let file = NamedTempFile::new().unwrap();
        snapshot.save(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        std::fs::write(file.path(), content.replace("\"a\"", "\"z\"")).unwrap();

        let err = ResumeSnapshot::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("HMAC mismatch"));
    }

    #[test]
    fn test_config_validation() {
        let snapshot = ResumeState::new().snapshot("r", "abc123", Utc::now(), RunStatus::Running);
        assert!(snapshot.validate_config("abc123").is_ok());
        assert!(matches!(
            snapshot.validate_config("different"),
            Err(MigrateError::ConfigChanged)
        ));
    }

    #[test]
    fn test_state_file_is_pretty_json() {
        let mut snapshot = ResumeState::new().snapshot("r", "h", Utc::now(), RunStatus::Completed);
        let file = NamedTempFile::new().unwrap();
        snapshot.save(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains('\n'), "JSON should be pretty-printed");
        assert!(content.contains("\"status\": \"completed\""));
        assert!(serde_json::from_str::<serde_json::Value>(&content).is_ok());
    }
}

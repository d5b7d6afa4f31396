//! State backend trait for resume snapshot storage.
//!
//! The orchestrator loads a snapshot once at start and saves one at every
//! checkpoint through `Arc<dyn StateBackend>`, without knowing where the
//! snapshot lives.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::ResumeSnapshot;
use crate::error::Result;

/// Trait for resume snapshot persistence backends.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow sharing across async tasks.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Load the snapshot for a config hash.
    ///
    /// Returns `None` when there is nothing to resume, and
    /// `MigrateError::ConfigChanged` when a snapshot exists for a different
    /// configuration.
    async fn load(&self, config_hash: &str) -> Result<Option<ResumeSnapshot>>;

    /// Persist a snapshot, replacing any previous one.
    async fn save(&self, snapshot: &ResumeSnapshot) -> Result<()>;

    /// Get the backend type name for logging/debugging.
    fn backend_type(&self) -> &'static str;
}

/// JSON file backend.
#[derive(Debug, Clone)]
pub struct FileStateBackend {
    path: PathBuf,
}

impl FileStateBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl StateBackend for FileStateBackend {
    async fn load(&self, config_hash: &str) -> Result<Option<ResumeSnapshot>> {
        if !self.path.exists() {
            debug!("No state file at {:?}", self.path);
            return Ok(None);
        }
        let snapshot = ResumeSnapshot::load(&self.path)?;
        snapshot.validate_config(config_hash)?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &ResumeSnapshot) -> Result<()> {
        let mut snapshot = snapshot.clone();
        snapshot.save(&self.path)
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}

//! No-op state backend for runs without resume capability.

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::state::backend::StateBackend;
use crate::state::ResumeSnapshot;

/// State backend that doesn't persist anything.
///
/// Used when no state file is configured. Logs a warning on first use.
pub struct NoOpStateBackend {
    warned: std::sync::atomic::AtomicBool,
}

impl NoOpStateBackend {
    pub fn new() -> Self {
        Self {
            warned: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn warn_once(&self) {
        if !self.warned.swap(true, std::sync::atomic::Ordering::SeqCst) {
            warn!(
                "No state file configured: progress will not be persisted and an \
                 interrupted migration cannot be resumed."
            );
        }
    }
}

impl Default for NoOpStateBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for NoOpStateBackend {
    async fn load(&self, _config_hash: &str) -> Result<Option<ResumeSnapshot>> {
        self.warn_once();
        Ok(None)
    }

    async fn save(&self, _snapshot: &ResumeSnapshot) -> Result<()> {
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "noop"
    }
}

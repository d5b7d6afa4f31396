//! # kv-migrate
//!
//! Migration engine for Redis-compatible key-value stores.
//!
//! This library copies keys from a source store to a target store with
//! support for:
//!
//! - **Type-aware transfer** of strings, hashes, lists, sets and sorted sets,
//!   including TTLs and empty collections
//! - **Retry with exponential backoff** for transient connection failures
//! - **Resume capability** via signed JSON state files
//! - **Verification** with a named diagnostic for every difference found
//! - **Progress tracking** with throughput and completion percentage
//!
//! ## Example
//!
//! ```rust,no_run
//! use kv_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let summary = orchestrator.run(CancellationToken::new()).await?;
//!     println!("Migrated {} keys", summary.stats.successful_keys);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod progress;
pub mod recovery;
pub mod state;
pub mod store;
pub mod summary;
pub mod timeout;
pub mod transfer;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, RetryConfig, StoreConfig, TimeoutConfig, VerifyConfig};
pub use crate::core::{KeyType, KvStore, StoreRef, Value};
pub use error::{MigrateError, Result};
pub use logging::{LoggerRef, MigrationLogger, TracingLogger};
pub use orchestrator::{HealthCheckResult, Orchestrator};
pub use progress::{MigrationStats, MigrationStatus, ProgressMonitor};
pub use recovery::ConnectionRecovery;
pub use state::{FileStateBackend, NoOpStateBackend, ResumeSnapshot, ResumeState, RunStatus, StateBackend};
pub use store::{MemoryStore, RedisStore};
pub use summary::MigrationSummary;
pub use timeout::TimeoutPolicy;
pub use transfer::{DataTypeProcessor, TransferOutcome};
pub use verify::{DataVerifier, VerificationResult, VerificationSummary};

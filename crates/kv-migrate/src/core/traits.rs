//! Store capability consumed by the migration engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

use super::value::{KeyType, Value};

/// Shared handle to a store.
pub type StoreRef = Arc<dyn KvStore>;

/// A key-value store the engine can read from and write to.
///
/// Implementations own their connection handling and must bound every call
/// with a timeout; the engine never waits on a store call indefinitely
/// itself.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by all
/// transfer workers.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Check that the store answers.
    async fn ping(&self) -> Result<()>;

    /// Enumerate every key in scope (the configured key pattern).
    async fn get_all_keys(&self) -> Result<Vec<String>>;

    /// Data type held by `key`, [`KeyType::None`] if absent.
    async fn get_key_type(&self, key: &str) -> Result<KeyType>;

    /// Read the complete value of `key`.
    async fn get_value(&self, key: &str) -> Result<Value>;

    /// Replace `key` with `value`.
    ///
    /// Any previous value is discarded. Writing an empty collection must
    /// leave the key in place with the right type and zero members where
    /// the store can represent that.
    async fn set_value(&self, key: &str, value: &Value) -> Result<()>;

    /// Whether `key` exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remaining time to live; `None` when the key never expires or is absent.
    async fn get_ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Set the time to live of an existing key.
    async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Release connections (idempotent).
    async fn disconnect(&self) -> Result<()>;

    /// Short name for logs ("source", "target", ...).
    fn name(&self) -> &str;
}

//! In-memory store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::{KeyType, KvStore, Value};
use crate::error::{MigrateError, Result};

use super::glob_match;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A [`KvStore`] kept entirely in process memory.
///
/// Unlike Redis it keeps collections with zero members, so a key written
/// with an empty hash still exists afterwards with type `hash`. Expired
/// keys behave as absent.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    key_pattern: String,
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_pattern: "*".to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Restrict [`KvStore::get_all_keys`] to keys matching a glob pattern.
    pub fn with_key_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.key_pattern = pattern.into();
        self
    }

    /// Insert or replace a key without a TTL.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.entries.write().insert(
            key.into(),
            Entry {
                value,
                expires_at: None,
            },
        );
    }

    /// Insert or replace a key that expires after `ttl`.
    pub fn insert_with_ttl(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        self.entries.write().insert(
            key.into(),
            Entry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
    }

    /// Delete a key, returning its value if it was live.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        self.entries
            .write()
            .remove(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value)
    }

    /// Current value of a key, if live.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.live(key).map(|e| e.value)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .cloned()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(k, e)| !e.is_expired(now) && glob_match(&self.key_pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get_key_type(&self, key: &str) -> Result<KeyType> {
        Ok(self
            .live(key)
            .map(|e| e.value.key_type())
            .unwrap_or(KeyType::None))
    }

    async fn get_value(&self, key: &str) -> Result<Value> {
        self.live(key)
            .map(|e| e.value)
            .ok_or_else(|| MigrateError::KeyNotFound(key.to_string()))
    }

    async fn set_value(&self, key: &str, value: &Value) -> Result<()> {
        self.insert(key, value.clone());
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live(key).is_some())
    }

    async fn get_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .live(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
            .filter(|ttl| !ttl.is_zero()))
    }

    async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(key).filter(|e| !e.is_expired(now)) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(())
            }
            None => Err(MigrateError::KeyNotFound(key.to_string())),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

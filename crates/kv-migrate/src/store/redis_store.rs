//! Redis-protocol store over an async multiplexed connection.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Cmd, FromRedisValue, Pipeline};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::core::{KeyType, KvStore, Value};
use crate::error::{MigrateError, Result};
use crate::timeout::TimeoutPolicy;

/// Elements per write command when rebuilding a collection.
const WRITE_CHUNK: usize = 1_000;

/// A [`KvStore`] backed by a Redis-compatible server.
///
/// The multiplexed connection is cloned per command, so one `RedisStore` can
/// serve every worker. Each command is bounded by a timeout from the
/// [`TimeoutPolicy`], scaled by the size of the value it touches.
pub struct RedisStore {
    name: String,
    address: String,
    connection: MultiplexedConnection,
    timeouts: TimeoutPolicy,
    key_pattern: String,
    scan_count: usize,
}

impl RedisStore {
    /// Connect to the server described by `config`.
    pub async fn connect(config: &StoreConfig, name: &str, timeouts: TimeoutPolicy) -> Result<Self> {
        let address = config.redacted_url();
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| MigrateError::Config(format!("invalid {} url {}: {}", name, address, e)))?;

        let connect_timeout = timeouts.default_timeout();
        let connection = tokio::time::timeout(connect_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| MigrateError::timeout(format!("connect to {}", address), connect_timeout))?
            .map_err(|e| MigrateError::Connection(format!("failed to connect to {}: {}", address, e)))?;

        debug!("Connected to {} store at {}", name, address);

        Ok(Self {
            name: config.display_name(name).to_string(),
            address,
            connection,
            timeouts,
            key_pattern: "*".to_string(),
            scan_count: 1_000,
        })
    }

    /// Set the `SCAN MATCH` pattern and `COUNT` hint used for key enumeration.
    pub fn with_scan(mut self, key_pattern: &str, scan_count: usize) -> Self {
        self.key_pattern = key_pattern.to_string();
        self.scan_count = scan_count.max(1);
        self
    }

    /// Server address with credentials redacted.
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn query<T>(&self, operation: &str, timeout: Duration, cmd: &Cmd) -> Result<T>
    where
        T: FromRedisValue + Send,
    {
        let mut conn = self.connection.clone();
        match tokio::time::timeout(timeout, cmd.query_async(&mut conn)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(MigrateError::timeout(operation, timeout)),
        }
    }

    async fn execute(&self, operation: &str, timeout: Duration, pipe: &Pipeline) -> Result<()> {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> =
            match tokio::time::timeout(timeout, pipe.query_async(&mut conn)).await {
                Ok(result) => result,
                Err(_) => return Err(MigrateError::timeout(operation, timeout)),
            };
        Ok(result?)
    }

    /// Element count (byte length for strings) of a key of known type.
    async fn value_size(&self, key: &str, key_type: &KeyType) -> Result<usize> {
        let command = match key_type {
            KeyType::String => "STRLEN",
            KeyType::Hash => "HLEN",
            KeyType::List => "LLEN",
            KeyType::Set => "SCARD",
            KeyType::ZSet => "ZCARD",
            KeyType::None | KeyType::Unsupported(_) => return Ok(0),
        };
        let mut cmd = redis::cmd(command);
        cmd.arg(key);
        let size: u64 = self
            .query(&format!("{} {}", command, key), self.timeouts.base_timeout(key_type), &cmd)
            .await?;
        Ok(size as usize)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let cmd = redis::cmd("PING");
        let _pong: String = self.query("PING", self.timeouts.default_timeout(), &cmd).await?;
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>> {
        let timeout = self.timeouts.default_timeout();
        let mut seen = HashSet::new();
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(&self.key_pattern)
                .arg("COUNT")
                .arg(self.scan_count);
            let (next, batch): (u64, Vec<String>) = self.query("SCAN", timeout, &cmd).await?;
            // SCAN may return a key more than once
            seen.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        let mut keys: Vec<String> = seen.into_iter().collect();
        keys.sort();
        debug!("{}: {} keys match '{}'", self.name, keys.len(), self.key_pattern);
        Ok(keys)
    }

    async fn get_key_type(&self, key: &str) -> Result<KeyType> {
        let mut cmd = redis::cmd("TYPE");
        cmd.arg(key);
        let name: String = self
            .query(&format!("TYPE {}", key), self.timeouts.default_timeout(), &cmd)
            .await?;
        Ok(name.parse().unwrap_or(KeyType::Unsupported(name)))
    }

    async fn get_value(&self, key: &str) -> Result<Value> {
        let key_type = self.get_key_type(key).await?;
        let size = self.value_size(key, &key_type).await?;
        let timeout = self.timeouts.timeout_for(&key_type, size);
        if self.timeouts.is_large(size) {
            debug!("{}: reading large {} {} ({} elements, timeout {:?})", self.name, key_type, key, size, timeout);
        }

        let value = match key_type {
            KeyType::String => {
                let mut cmd = redis::cmd("GET");
                cmd.arg(key);
                let bytes: Option<Vec<u8>> = self.query(&format!("GET {}", key), timeout, &cmd).await?;
                Value::String(bytes.ok_or_else(|| MigrateError::KeyNotFound(key.to_string()))?)
            }
            KeyType::Hash => {
                let mut cmd = redis::cmd("HGETALL");
                cmd.arg(key);
                let map: BTreeMap<String, String> =
                    self.query(&format!("HGETALL {}", key), timeout, &cmd).await?;
                Value::Hash(map)
            }
            KeyType::List => {
                let mut cmd = redis::cmd("LRANGE");
                cmd.arg(key).arg(0).arg(-1);
                let items: Vec<String> = self.query(&format!("LRANGE {}", key), timeout, &cmd).await?;
                Value::List(items)
            }
            KeyType::Set => {
                let mut cmd = redis::cmd("SMEMBERS");
                cmd.arg(key);
                let members: BTreeSet<String> =
                    self.query(&format!("SMEMBERS {}", key), timeout, &cmd).await?;
                Value::Set(members)
            }
            KeyType::ZSet => {
                let mut cmd = redis::cmd("ZRANGE");
                cmd.arg(key).arg(0).arg(-1).arg("WITHSCORES");
                let members: Vec<(String, f64)> =
                    self.query(&format!("ZRANGE {}", key), timeout, &cmd).await?;
                Value::ZSet(members)
            }
            KeyType::None => return Err(MigrateError::KeyNotFound(key.to_string())),
            KeyType::Unsupported(name) => {
                return Err(MigrateError::UnsupportedType {
                    key: key.to_string(),
                    key_type: name,
                })
            }
        };
        Ok(value)
    }

    async fn set_value(&self, key: &str, value: &Value) -> Result<()> {
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();

        match value {
            Value::String(bytes) => {
                pipe.set(key, bytes.as_slice()).ignore();
            }
            Value::Hash(map) => {
                let fields: Vec<(&str, &str)> =
                    map.iter().map(|(f, v)| (f.as_str(), v.as_str())).collect();
                for chunk in fields.chunks(WRITE_CHUNK) {
                    pipe.hset_multiple(key, chunk).ignore();
                }
            }
            Value::List(items) => {
                for chunk in items.chunks(WRITE_CHUNK) {
                    pipe.rpush(key, chunk.to_vec()).ignore();
                }
            }
            Value::Set(members) => {
                let members: Vec<&str> = members.iter().map(String::as_str).collect();
                for chunk in members.chunks(WRITE_CHUNK) {
                    pipe.sadd(key, chunk.to_vec()).ignore();
                }
            }
            Value::ZSet(members) => {
                let items: Vec<(f64, &str)> =
                    members.iter().map(|(m, s)| (*s, m.as_str())).collect();
                for chunk in items.chunks(WRITE_CHUNK) {
                    pipe.zadd_multiple(key, chunk).ignore();
                }
            }
        }

        if value.is_empty_collection() {
            // Redis removes aggregates with no members
            info!(
                "{}: empty {} {} cannot be represented, key left absent",
                self.name,
                value.key_type(),
                key
            );
        }

        let key_type = value.key_type();
        let timeout = self.timeouts.timeout_for(&key_type, value.size());
        self.execute(&format!("write {} {}", key_type, key), timeout, &pipe)
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: i64 = self
            .query(&format!("EXISTS {}", key), self.timeouts.default_timeout(), &cmd)
            .await?;
        Ok(count > 0)
    }

    async fn get_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(key);
        let ms: i64 = self
            .query(&format!("PTTL {}", key), self.timeouts.default_timeout(), &cmd)
            .await?;
        // -1: no expiry, -2: no such key
        if ms <= 0 {
            return Ok(None);
        }
        Ok(Some(Duration::from_millis(ms as u64)))
    }

    async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(ttl.as_millis() as u64);
        let applied: i64 = self
            .query(&format!("PEXPIRE {}", key), self.timeouts.default_timeout(), &cmd)
            .await?;
        if applied == 0 {
            return Err(MigrateError::KeyNotFound(key.to_string()));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        // The multiplexed connection closes when its last clone is dropped
        debug!("Disconnecting from {} store at {}", self.name, self.address);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

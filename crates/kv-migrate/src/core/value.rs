//! Key types and values for type-aware key-value transfer.
//!
//! A [`Value`] always carries exactly one of the five supported shapes, so a
//! value read from a store knows its own [`KeyType`]. Type checks against the
//! type a store reported happen by comparing the two, never by probing an
//! untyped payload.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Data type of a key as reported by the store (`TYPE` command).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    String,
    Hash,
    List,
    Set,
    ZSet,
    /// The key does not exist.
    None,
    /// A type the engine does not migrate (stream, module types, ...).
    Unsupported(String),
}

impl KeyType {
    /// Wire name used by the store.
    pub fn as_str(&self) -> &str {
        match self {
            KeyType::String => "string",
            KeyType::Hash => "hash",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::ZSet => "zset",
            KeyType::None => "none",
            KeyType::Unsupported(name) => name,
        }
    }

    /// Whether values of this type can be transferred.
    pub fn is_supported(&self) -> bool {
        !matches!(self, KeyType::None | KeyType::Unsupported(_))
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "string" => KeyType::String,
            "hash" => KeyType::Hash,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::ZSet,
            "none" => KeyType::None,
            other => KeyType::Unsupported(other.to_string()),
        })
    }
}

/// A key's value, tagged with its data type.
///
/// Hash fields and set members use ordered collections so that anything
/// derived from them (diagnostics, write order) is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Binary-safe string.
    String(Vec<u8>),

    /// Field to value mapping.
    Hash(BTreeMap<String, String>),

    /// Ordered sequence, duplicates allowed.
    List(Vec<String>),

    /// Unordered collection of unique members.
    Set(BTreeSet<String>),

    /// `(member, score)` pairs in store order; members are unique.
    ZSet(Vec<(String, f64)>),
}

impl Value {
    /// The data type this value belongs to.
    pub fn key_type(&self) -> KeyType {
        match self {
            Value::String(_) => KeyType::String,
            Value::Hash(_) => KeyType::Hash,
            Value::List(_) => KeyType::List,
            Value::Set(_) => KeyType::Set,
            Value::ZSet(_) => KeyType::ZSet,
        }
    }

    /// Size metric used for large-data decisions.
    ///
    /// Byte length for strings, element count for collections.
    pub fn size(&self) -> usize {
        match self {
            Value::String(bytes) => bytes.len(),
            Value::Hash(map) => map.len(),
            Value::List(items) => items.len(),
            Value::Set(members) => members.len(),
            Value::ZSet(members) => members.len(),
        }
    }

    /// Approximate payload size in bytes, used for throughput accounting.
    pub fn byte_size(&self) -> usize {
        match self {
            Value::String(bytes) => bytes.len(),
            Value::Hash(map) => map.iter().map(|(k, v)| k.len() + v.len()).sum(),
            Value::List(items) => items.iter().map(String::len).sum(),
            Value::Set(members) => members.iter().map(String::len).sum(),
            Value::ZSet(members) => members.iter().map(|(m, _)| m.len() + 8).sum(),
        }
    }

    /// True for collections with no members. Strings are never "empty" in
    /// this sense: a zero-length string is still a value.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            _ => self.size() == 0,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.as_bytes().to_vec())
    }
}

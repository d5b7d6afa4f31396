//! Core abstractions for store-agnostic key migration.
//!
//! - [`value`]: key types and the tagged [`Value`] carried between stores
//! - [`traits`]: the [`KvStore`] capability every store client implements
//!
//! The migration engine only talks to stores through [`KvStore`], so the
//! transfer and verification logic can be exercised against the in-memory
//! store in tests and against Redis-compatible servers in production.

pub mod traits;
pub mod value;

pub use traits::{KvStore, StoreRef};
pub use value::{KeyType, Value};

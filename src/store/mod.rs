//! Shared store adapter.
//!
//! roomd keeps no durable state in process: every room record and reverse
//! index lives in a shared key-value store so any number of stateless
//! instances can serve the same rooms. This module defines the [`Store`]
//! contract over that store, a typed [`Batch`] of write operations that
//! executes as a single all-or-nothing round trip, and two backends:
//!
//! - [`RedisStore`] for production (Redis via connection manager)
//! - [`MemoryStore`] for tests, mirroring the `:memory:` database
//!   convention used elsewhere in the stack

mod lease;
mod memory;
mod redis;

pub use self::lease::Lease;
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Store-level errors.
///
/// `Unavailable` is the only retry-eligible class. Callers must treat it
/// as "unknown final state": a failure between a record write and its
/// index cleanup can leave the two inconsistent until the next read
/// tolerates and skips the dangling entry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected value at {key}: {reason}")]
    UnexpectedValue { key: String, reason: String },

    #[error("{0} is busy, lease not acquired")]
    Contended(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A write operation inside a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Set a string-valued key.
    Set { key: String, value: String },
    /// Delete a key of any type.
    Delete { key: String },
    /// Push a value onto the head of a list-valued key.
    ListPush { key: String, value: String },
    /// Remove the first occurrence of a value from a list-valued key.
    ListRemove { key: String, value: String },
}

/// A bundle of heterogeneous writes executed in one round trip.
///
/// Backends must apply the whole bundle or none of it (`MULTI`/`EXEC` on
/// Redis), so a room record and its reverse-index entries move together.
#[derive(Debug, Default)]
pub struct Batch {
    ops: Vec<WriteOp>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a string set.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Set {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Queue a key deletion.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    /// Queue a list push.
    pub fn list_push(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::ListPush {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Queue a first-occurrence list removal.
    pub fn list_remove(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::ListRemove {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Whether the batch contains no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Consume the batch, yielding its operations in queue order.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Contract over the shared key-value store.
///
/// String keys hold one value; list keys hold an ordered sequence. Every
/// method is a suspension point and may fail with
/// [`StoreError::Unavailable`]; no method blocks a thread.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Get a string-valued key. `None` if absent.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Get many string-valued keys in one round trip, position-aligned.
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>>;

    /// Set a string-valued key unconditionally.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Set a string-valued key with a TTL, only if it does not exist.
    /// Returns `true` when the key was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Push a value onto the head of a list.
    async fn list_push(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove the first occurrence of a value from a list.
    async fn list_remove(&self, key: &str, value: &str) -> StoreResult<()>;

    /// All elements of a list, head first. Empty if the key is absent.
    async fn list_range(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Length of a list. Zero if the key is absent.
    async fn list_len(&self, key: &str) -> StoreResult<usize>;

    /// Execute a write bundle as a single all-or-nothing round trip.
    async fn apply(&self, batch: Batch) -> StoreResult<()>;
}

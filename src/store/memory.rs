//! In-memory store backend for tests.
//!
//! Single-process stand-in for Redis. A batch applies under one lock
//! acquisition, which gives the same all-or-nothing observability as
//! `MULTI`/`EXEC` does in production.

use super::{Batch, Store, StoreError, StoreResult, WriteOp};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(Vec<String>),
}

#[derive(Default)]
struct Inner {
    data: HashMap<String, Value>,
    /// Expiry instants for keys written by `set_if_absent`.
    expiries: HashMap<String, Instant>,
}

impl Inner {
    fn purge_expired(&mut self, key: &str) {
        if let Some(deadline) = self.expiries.get(key) {
            if Instant::now() >= *deadline {
                self.expiries.remove(key);
                self.data.remove(key);
            }
        }
    }

    fn as_str(&self, key: &str) -> StoreResult<Option<&String>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(Value::List(_)) => Err(StoreError::UnexpectedValue {
                key: key.to_string(),
                reason: "expected string, found list".to_string(),
            }),
        }
    }

    fn as_list_mut(&mut self, key: &str) -> StoreResult<&mut Vec<String>> {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::List(Vec::new()));
        match entry {
            Value::List(list) => Ok(list),
            Value::Str(_) => Err(StoreError::UnexpectedValue {
                key: key.to_string(),
                reason: "expected list, found string".to_string(),
            }),
        }
    }

    fn apply_op(&mut self, op: WriteOp) -> StoreResult<()> {
        match op {
            WriteOp::Set { key, value } => {
                self.expiries.remove(&key);
                self.data.insert(key, Value::Str(value));
            }
            WriteOp::Delete { key } => {
                self.expiries.remove(&key);
                self.data.remove(&key);
            }
            WriteOp::ListPush { key, value } => {
                self.as_list_mut(&key)?.insert(0, value);
            }
            WriteOp::ListRemove { key, value } => {
                if let Some(Value::List(list)) = self.data.get_mut(&key) {
                    if let Some(pos) = list.iter().position(|v| *v == value) {
                        list.remove(pos);
                    }
                    if list.is_empty() {
                        self.data.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}

/// In-memory [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-write; tests should see it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut inner = self.lock();
        inner.purge_expired(key);
        Ok(inner.as_str(key)?.cloned())
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        let mut inner = self.lock();
        keys.iter()
            .map(|key| {
                inner.purge_expired(key);
                Ok(inner.as_str(key)?.cloned())
            })
            .collect()
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock().apply_op(WriteOp::Set {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.purge_expired(key);
        if inner.data.contains_key(key) {
            return Ok(false);
        }
        inner
            .data
            .insert(key.to_string(), Value::Str(value.to_string()));
        inner.expiries.insert(key.to_string(), Instant::now() + ttl);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.lock().apply_op(WriteOp::Delete {
            key: key.to_string(),
        })
    }

    async fn list_push(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock().apply_op(WriteOp::ListPush {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    async fn list_remove(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock().apply_op(WriteOp::ListRemove {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    async fn list_range(&self, key: &str) -> StoreResult<Vec<String>> {
        let inner = self.lock();
        match inner.data.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(list.clone()),
            Some(Value::Str(_)) => Err(StoreError::UnexpectedValue {
                key: key.to_string(),
                reason: "expected list, found string".to_string(),
            }),
        }
    }

    async fn list_len(&self, key: &str) -> StoreResult<usize> {
        let inner = self.lock();
        match inner.data.get(key) {
            None => Ok(0),
            Some(Value::List(list)) => Ok(list.len()),
            Some(Value::Str(_)) => Err(StoreError::UnexpectedValue {
                key: key.to_string(),
                reason: "expected list, found string".to_string(),
            }),
        }
    }

    async fn apply(&self, batch: Batch) -> StoreResult<()> {
        let mut inner = self.lock();
        for op in batch.into_ops() {
            inner.apply_op(op)?;
        }
        Ok(())
    }
}

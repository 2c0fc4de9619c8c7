//! In-memory ordered backend.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use super::{Backend, Versioned, WriteBatch, WriteOp};
use crate::error::BackendError;
use crate::key::Key;

/// A [`Backend`] over a `BTreeMap` behind an async lock.
///
/// Every write takes the write lock, so compare-and-swap and batch commits
/// are atomic with respect to all other operations.
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<Key, Versioned>>,
    version: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            version: AtomicU64::new(0),
        }
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Total number of stored entries, live or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn range_from<'a>(
    entries: &'a BTreeMap<Key, Versioned>,
    prefix: &'a Key,
    start_after: Option<&Key>,
) -> impl Iterator<Item = (&'a Key, &'a Versioned)> + 'a {
    let lower = match start_after {
        Some(after) if after >= prefix => Bound::Excluded(after.clone()),
        _ => Bound::Included(prefix.clone()),
    };
    entries
        .range((lower, Bound::Unbounded))
        .take_while(move |(k, _)| k.starts_with(prefix))
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &Key) -> Result<Option<Versioned>, BackendError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: Key, value: Vec<u8>) -> Result<u64, BackendError> {
        let mut entries = self.entries.write().await;
        let version = self.next_version();
        entries.insert(key, Versioned { version, value });
        Ok(version)
    }

    async fn delete(&self, key: &Key) -> Result<bool, BackendError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn scan_prefix(
        &self,
        prefix: &Key,
        start_after: Option<&Key>,
        limit: usize,
    ) -> Result<Vec<(Key, Versioned)>, BackendError> {
        let entries = self.entries.read().await;
        Ok(range_from(&entries, prefix, start_after)
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn count(&self, prefix: &Key) -> Result<u64, BackendError> {
        let entries = self.entries.read().await;
        Ok(range_from(&entries, prefix, None).count() as u64)
    }

    async fn compare_and_swap(
        &self,
        key: &Key,
        expected: Option<u64>,
        value: Option<Vec<u8>>,
    ) -> Result<bool, BackendError> {
        let mut entries = self.entries.write().await;
        let current = entries.get(key).map(|v| v.version);
        if current != expected {
            trace!(key = %key, ?expected, ?current, "memory: compare-and-swap conflict");
            return Ok(false);
        }
        match value {
            Some(value) => {
                let version = self.next_version();
                entries.insert(key.clone(), Versioned { version, value });
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(true)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), BackendError> {
        let mut entries = self.entries.write().await;
        for op in &batch.ops {
            if let WriteOp::Expect { key, version } = op {
                let current = entries.get(key).map(|v| v.version);
                if current != *version {
                    trace!(key = %key, expected = ?version, ?current, "memory: guarded commit conflict");
                    return Err(BackendError::Conflict(key.to_string()));
                }
            }
        }
        for op in batch.ops {
            match op {
                WriteOp::Put { key, value } => {
                    let version = self.next_version();
                    entries.insert(key, Versioned { version, value });
                }
                WriteOp::Delete { key } => {
                    entries.remove(&key);
                }
                WriteOp::Expect { .. } => {}
            }
        }
        Ok(())
    }
}

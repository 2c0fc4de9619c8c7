//! Backend storage contract.
//!
//! A backend is an ordered key-value space with per-key versions. The store
//! builds every read and write on top of these operations:
//!
//! - point `get`/`put`/`delete`
//! - paged, ordered `scan_prefix` and `count` over key prefixes
//! - `compare_and_swap` for atomic read-modify-write of one key
//! - `commit` for all-or-nothing multi-key writes (cascading deletes),
//!   optionally guarded by the versions the writer read
//!
//! Versions increase on every write of a key, so a compare-and-swap against
//! a version observed earlier fails if anything else wrote the key since.

mod memory;

pub use memory::MemoryBackend;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::key::Key;

/// A stored value with the version of its last write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub version: u64,
    pub value: Vec<u8>,
}

/// One operation of a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put { key: Key, value: Vec<u8> },
    Delete { key: Key },
    /// Guard: the batch only applies while `key` is at `version` (`None`
    /// meaning absent).
    Expect { key: Key, version: Option<u64> },
}

/// Writes applied atomically: either all of them become visible or none.
///
/// A batch carrying [`WriteOp::Expect`] guards fails with
/// [`BackendError::Conflict`] when any guarded key moved, and applies nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Key, value: Vec<u8>) -> &mut Self {
        self.ops.push(WriteOp::Put { key, value });
        self
    }

    pub fn delete(&mut self, key: Key) -> &mut Self {
        self.ops.push(WriteOp::Delete { key });
        self
    }

    pub fn expect(&mut self, key: Key, version: Option<u64>) -> &mut Self {
        self.ops.push(WriteOp::Expect { key, version });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Persistence abstraction the store runs on.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get(&self, key: &Key) -> Result<Option<Versioned>, BackendError>;

    /// Write a value, returning its new version.
    async fn put(&self, key: Key, value: Vec<u8>) -> Result<u64, BackendError>;

    /// Remove a key, returning whether it existed.
    async fn delete(&self, key: &Key) -> Result<bool, BackendError>;

    /// Up to `limit` entries under `prefix` in key order, starting strictly
    /// after `start_after` when given.
    async fn scan_prefix(
        &self,
        prefix: &Key,
        start_after: Option<&Key>,
        limit: usize,
    ) -> Result<Vec<(Key, Versioned)>, BackendError>;

    /// Number of entries under `prefix`.
    async fn count(&self, prefix: &Key) -> Result<u64, BackendError>;

    /// Replace the value of `key` only if its current version is `expected`
    /// (`None` meaning the key must be absent). A `None` value deletes.
    /// Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        key: &Key,
        expected: Option<u64>,
        value: Option<Vec<u8>>,
    ) -> Result<bool, BackendError>;

    /// Apply every operation of the batch atomically. Fails with
    /// [`BackendError::Conflict`] without writing when a guard does not hold.
    async fn commit(&self, batch: WriteBatch) -> Result<(), BackendError>;
}

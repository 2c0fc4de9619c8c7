//! Typed, generation-aware access to the backend.
//!
//! Every read goes through the tracker's liveness check, so records written
//! under an invalidated generation read as absent before the sweep removes
//! them. Read-modify-write runs as a compare-and-swap loop on the key's
//! version, which makes merges and reaction updates atomic per key.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shardcache_model::Id;
use tracing::{debug, trace, warn};

use crate::backend::{Backend, Versioned, WriteBatch};
use crate::codec::{self, Stamp};
use crate::error::{BackendError, Result, StoreError};
use crate::key::Key;
use crate::tracker::Tracker;

/// Back-pressured, cancellable listing. Pages are fetched on demand.
pub type EntityStream<T> = BoxStream<'static, Result<T, StoreError>>;

/// Retries before a compare-and-swap loop logs contention.
const CAS_WARN_AFTER: usize = 8;

#[derive(Clone)]
pub struct Repo {
    backend: Arc<dyn Backend>,
    tracker: Arc<Tracker>,
    page_size: usize,
}

struct ScanState {
    repo: Repo,
    prefix: Key,
    cursor: Option<Key>,
    done: bool,
}

impl Repo {
    pub fn new(backend: Arc<dyn Backend>, tracker: Arc<Tracker>, page_size: usize) -> Self {
        Self {
            backend,
            tracker,
            page_size: page_size.max(1),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    async fn decode_live<T: DeserializeOwned>(&self, stored: &Versioned) -> Result<Option<T>> {
        let (stamp, value) = codec::decode::<T>(&stored.value)?;
        if self.tracker.is_live(stamp).await? {
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn is_live_entry(&self, stored: &Versioned) -> Result<bool> {
        let stamp = codec::decode_stamp(&stored.value)?;
        self.tracker.is_live(stamp).await
    }

    /// Flag a sweep when a write lands with a generation that was
    /// invalidated while it was in flight.
    async fn check_stale_write(&self, stamp: Stamp) -> Result<()> {
        if let Some(shard) = stamp.shard {
            if !self.tracker.is_live(stamp).await? {
                debug!(shard, generation = stamp.generation, "repo: stale write landed");
                self.tracker.request_sweep(shard);
            }
        }
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &Key) -> Result<Option<T>> {
        match self.backend.get(key).await? {
            Some(stored) => self.decode_live(&stored).await,
            None => Ok(None),
        }
    }

    pub async fn exists(&self, key: &Key) -> Result<bool> {
        match self.backend.get(key).await? {
            Some(stored) => self.is_live_entry(&stored).await,
            None => Ok(false),
        }
    }

    /// Atomically replace the value at `key` with `f(current)`.
    ///
    /// `f` sees the live value (stale records count as absent) and returns
    /// the new value, or `None` to delete. It may run more than once under
    /// contention. Returns the live value that was replaced.
    pub async fn update<T, F>(&self, key: &Key, stamp: Stamp, mut f: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send,
        F: FnMut(Option<T>) -> Option<T> + Send,
    {
        let mut attempts = 0usize;
        loop {
            let stored = self.backend.get(key).await?;
            let (version, current) = match &stored {
                Some(stored) => (Some(stored.version), self.decode_live::<T>(stored).await?),
                None => (None, None),
            };
            let next = f(current.clone());
            if next.is_none() && stored.is_none() {
                return Ok(None);
            }
            let encoded = match &next {
                Some(value) => Some(codec::encode(stamp, value)?),
                None => None,
            };
            if self.backend.compare_and_swap(key, version, encoded).await? {
                if next.is_some() {
                    self.check_stale_write(stamp).await?;
                }
                trace!(key = %key, deleted = next.is_none(), "repo: record updated");
                return Ok(current);
            }
            attempts += 1;
            if attempts == CAS_WARN_AFTER {
                warn!(key = %key, attempts, "repo: sustained write contention");
            }
        }
    }

    /// Write `value`, returning the live value it replaced.
    pub async fn upsert<T>(&self, key: &Key, stamp: Stamp, value: T) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send,
    {
        self.update(key, stamp, move |_| Some(value.clone())).await
    }

    /// Merge into an existing live value. Absent keys stay absent.
    pub async fn modify<T, F>(&self, key: &Key, stamp: Stamp, mut f: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send,
        F: FnMut(T) -> T + Send,
    {
        self.update(key, stamp, |current: Option<T>| current.map(&mut f))
            .await
    }

    /// Delete `key`, returning the live value it held.
    pub async fn remove<T>(&self, key: &Key) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send,
    {
        self.update(key, Stamp::GLOBAL, |_: Option<T>| None).await
    }

    /// Apply a batch atomically.
    pub async fn commit(&self, batch: WriteBatch, stamp: Stamp) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.len();
        self.backend.commit(batch).await?;
        self.check_stale_write(stamp).await?;
        trace!(ops, "repo: batch committed");
        Ok(())
    }

    /// Apply a batch whose guards were read from this repo. Returns `false`
    /// without writing when a guarded key moved; the caller re-reads and
    /// rebuilds the batch.
    pub async fn commit_guarded(&self, batch: WriteBatch, stamp: Stamp) -> Result<bool> {
        match self.commit(batch, stamp).await {
            Ok(()) => Ok(true),
            Err(StoreError::Backend(BackendError::Conflict(key))) => {
                trace!(key = %key, "repo: guarded batch conflict");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Version of the entry at `key`, stale or not, with its live value.
    /// The version guards a later [`Repo::commit_guarded`].
    pub async fn get_versioned<T: DeserializeOwned>(
        &self,
        key: &Key,
    ) -> Result<(Option<u64>, Option<T>)> {
        match self.backend.get(key).await? {
            Some(stored) => Ok((Some(stored.version), self.decode_live(&stored).await?)),
            None => Ok((None, None)),
        }
    }

    /// Live entries under `prefix` with their versions, in key order.
    pub async fn versioned<T: DeserializeOwned>(&self, prefix: &Key) -> Result<Vec<(Key, u64, T)>> {
        let mut entries = Vec::new();
        let mut cursor: Option<Key> = None;
        loop {
            let page = self
                .backend
                .scan_prefix(prefix, cursor.as_ref(), self.page_size)
                .await?;
            let exhausted = page.len() < self.page_size;
            cursor = page.last().map(|(k, _)| k.clone());
            for (key, stored) in page {
                if let Some(value) = self.decode_live::<T>(&stored).await? {
                    entries.push((key, stored.version, value));
                }
            }
            if exhausted || cursor.is_none() {
                return Ok(entries);
            }
        }
    }

    /// Live entries under `prefix`, in key order.
    pub fn scan<T>(&self, prefix: Key) -> EntityStream<(Key, T)>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let state = ScanState {
            repo: self.clone(),
            prefix,
            cursor: None,
            done: false,
        };
        stream::try_unfold(state, next_page::<T>)
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, StoreError>)))
            .try_flatten()
            .boxed()
    }

    /// Live values under `prefix`, in key order.
    pub fn values<T>(&self, prefix: Key) -> EntityStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.scan(prefix).map_ok(|(_, value)| value).boxed()
    }

    /// Yield `inner` only while the record at `parent` is live. Children of
    /// an absent parent are orphans and never listed.
    pub fn scoped<T: Send + 'static>(&self, parent: Key, inner: EntityStream<T>) -> EntityStream<T> {
        let repo = self.clone();
        let gated = async move {
            let listing: EntityStream<T> = if repo.exists(&parent).await? {
                inner
            } else {
                trace!(parent = %parent, "repo: parent absent, listing nothing");
                stream::empty().boxed()
            };
            Ok::<_, StoreError>(listing)
        };
        stream::once(gated).try_flatten().boxed()
    }

    /// Keys of live entries under `prefix`.
    pub async fn live_keys(&self, prefix: &Key) -> Result<Vec<Key>> {
        let mut keys = Vec::new();
        let mut cursor: Option<Key> = None;
        loop {
            let page = self
                .backend
                .scan_prefix(prefix, cursor.as_ref(), self.page_size)
                .await?;
            let exhausted = page.len() < self.page_size;
            cursor = page.last().map(|(k, _)| k.clone());
            for (key, stored) in page {
                if self.is_live_entry(&stored).await? {
                    keys.push(key);
                }
            }
            if exhausted || cursor.is_none() {
                return Ok(keys);
            }
        }
    }

    /// Keys of every entry under `prefix`, stale ones included. Cascading
    /// deletes use this so nothing is left behind for the sweep.
    pub async fn keys_under(&self, prefix: &Key) -> Result<Vec<Key>> {
        let mut keys = Vec::new();
        let mut cursor: Option<Key> = None;
        loop {
            let page = self
                .backend
                .scan_prefix(prefix, cursor.as_ref(), self.page_size)
                .await?;
            let exhausted = page.len() < self.page_size;
            cursor = page.last().map(|(k, _)| k.clone());
            keys.extend(page.into_iter().map(|(k, _)| k));
            if exhausted || cursor.is_none() {
                return Ok(keys);
            }
        }
    }

    /// Last id segment of every live entry under `prefix`.
    pub async fn live_ids(&self, prefix: &Key) -> Result<Vec<Id>> {
        Ok(self
            .live_keys(prefix)
            .await?
            .iter()
            .filter_map(Key::last_id)
            .collect())
    }

    /// Number of live entries under `prefix`.
    ///
    /// Uses the backend's count unless some shard still has stale records
    /// waiting for a sweep.
    pub async fn count(&self, prefix: &Key) -> Result<u64> {
        if self.tracker.has_pending_sweeps() {
            Ok(self.live_keys(prefix).await?.len() as u64)
        } else {
            Ok(self.backend.count(prefix).await?)
        }
    }

    /// Count under `prefix` when `parent` is live, zero otherwise.
    pub async fn count_scoped(&self, parent: &Key, prefix: &Key) -> Result<u64> {
        if self.exists(parent).await? {
            self.count(prefix).await
        } else {
            Ok(0)
        }
    }
}

async fn next_page<T>(mut state: ScanState) -> Result<Option<(Vec<(Key, T)>, ScanState)>>
where
    T: DeserializeOwned + Send + 'static,
{
    if state.done {
        return Ok(None);
    }
    let page = state
        .repo
        .backend
        .scan_prefix(&state.prefix, state.cursor.as_ref(), state.repo.page_size)
        .await?;
    state.done = page.len() < state.repo.page_size;
    state.cursor = page.last().map(|(k, _)| k.clone());
    if state.cursor.is_none() {
        state.done = true;
    }
    let mut items = Vec::with_capacity(page.len());
    for (key, stored) in page {
        if let Some(value) = state.repo.decode_live::<T>(&stored).await? {
            items.push((key, value));
        }
    }
    Ok(Some((items, state)))
}

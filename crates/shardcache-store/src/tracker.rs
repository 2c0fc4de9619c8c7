//! Completeness and invalidation tracking.
//!
//! Each shard has a generation counter stored as an ordinary keyed record.
//! Every write is stamped with the writing shard's generation; invalidating a
//! shard bumps its generation, which hides everything the shard wrote before
//! at once. A sweep removes the hidden records later (see `sweep.rs`).
//!
//! Member list completion is a marker record stamped like the guild it
//! belongs to, so it disappears with the guild's generation or on
//! re-creation.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shardcache_model::Id;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::codec::{self, Stamp};
use crate::error::Result;
use crate::key::{Key, keys};

/// Why a shard's session became unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvalidationCause {
    /// The client logged out.
    Logout,
    /// The connection was replaced by a fresh session.
    HardReconnect,
    /// The session could not be resumed.
    SessionExpired,
    /// The session resumed but events were lost.
    ResumedWithGap,
}

impl InvalidationCause {
    pub const ALL: [InvalidationCause; 4] = [
        InvalidationCause::Logout,
        InvalidationCause::HardReconnect,
        InvalidationCause::SessionExpired,
        InvalidationCause::ResumedWithGap,
    ];

    pub fn all() -> BTreeSet<InvalidationCause> {
        Self::ALL.into_iter().collect()
    }
}

/// Connection state of a shard as seen by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardState {
    Connected,
    Invalidated,
}

/// Completeness of a guild's member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberListState {
    /// No such guild.
    Absent,
    /// Some members may be missing.
    Incomplete,
    /// Every member has been delivered.
    Complete,
}

/// Shard generations, shard states and pending sweeps.
///
/// Generations live in the backend; this keeps a cache of them, loaded
/// lazily per shard.
pub struct Tracker {
    backend: Arc<dyn Backend>,
    generations: DashMap<u32, u64>,
    shard_states: DashMap<u32, ShardState>,
    /// Shards with stale records left to sweep, with the request ticket.
    sweep_requests: DashMap<u32, u64>,
    sweep_tickets: AtomicU64,
    /// Cached session user id; 0 until known.
    self_user: AtomicU64,
}

impl Tracker {
    pub fn new(backend: Arc<dyn Backend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            generations: DashMap::new(),
            shard_states: DashMap::new(),
            sweep_requests: DashMap::new(),
            sweep_tickets: AtomicU64::new(0),
            self_user: AtomicU64::new(0),
        })
    }

    /// Current generation of a shard.
    pub async fn generation(&self, shard: u32) -> Result<u64> {
        if let Some(generation) = self.generations.get(&shard) {
            return Ok(*generation);
        }
        let loaded = match self.backend.get(&keys::shard_generation(shard)).await? {
            Some(stored) => codec::decode::<u64>(&stored.value)?.1,
            None => 0,
        };
        let generation = *self.generations.entry(shard).or_insert(loaded);
        Ok(generation)
    }

    /// Stamp for a write originating from `shard`.
    pub async fn stamp(&self, shard: u32) -> Result<Stamp> {
        Ok(Stamp::shard(shard, self.generation(shard).await?))
    }

    /// Whether a record with this stamp is visible.
    pub async fn is_live(&self, stamp: Stamp) -> Result<bool> {
        match stamp.shard {
            None => Ok(true),
            Some(shard) => Ok(stamp.generation >= self.generation(shard).await?),
        }
    }

    /// Stamp of the live record at `key`, if any.
    pub async fn live_stamp(&self, key: &Key) -> Result<Option<Stamp>> {
        let Some(stored) = self.backend.get(key).await? else {
            return Ok(None);
        };
        let stamp = codec::decode_stamp(&stored.value)?;
        if self.is_live(stamp).await? {
            Ok(Some(stamp))
        } else {
            Ok(None)
        }
    }

    /// Invalidate a shard.
    ///
    /// The shard is always marked invalidated. Its generation is bumped only
    /// when `filter` contains `cause`; the new generation is returned and a
    /// sweep is requested.
    pub async fn invalidate(
        &self,
        shard: u32,
        cause: InvalidationCause,
        filter: &BTreeSet<InvalidationCause>,
    ) -> Result<Option<u64>> {
        self.shard_states.insert(shard, ShardState::Invalidated);
        if !filter.contains(&cause) {
            info!(shard, ?cause, "tracker: shard invalidated, cause filtered, keeping state");
            return Ok(None);
        }
        self.request_sweep(shard);

        let key = keys::shard_generation(shard);
        loop {
            let stored = self.backend.get(&key).await?;
            let (version, current) = match &stored {
                Some(stored) => (Some(stored.version), codec::decode::<u64>(&stored.value)?.1),
                None => (None, 0),
            };
            let next = current + 1;
            let value = codec::encode(Stamp::GLOBAL, &next)?;
            if self.backend.compare_and_swap(&key, version, Some(value)).await? {
                self.generations
                    .entry(shard)
                    .and_modify(|g| *g = (*g).max(next))
                    .or_insert(next);
                info!(shard, generation = next, ?cause, "tracker: shard invalidated");
                return Ok(Some(next));
            }
            warn!(shard, "tracker: generation update conflict, retrying");
        }
    }

    pub fn mark_connected(&self, shard: u32) {
        let previous = self.shard_states.insert(shard, ShardState::Connected);
        if previous == Some(ShardState::Invalidated) {
            debug!(shard, "tracker: shard reconnected");
        }
    }

    /// Shards never seen are reported connected.
    pub fn shard_state(&self, shard: u32) -> ShardState {
        self.shard_states
            .get(&shard)
            .map(|s| *s)
            .unwrap_or(ShardState::Connected)
    }

    /// Record that `shard` has stale records to sweep. Returns the ticket.
    pub fn request_sweep(&self, shard: u32) -> u64 {
        let ticket = self.sweep_tickets.fetch_add(1, Ordering::SeqCst) + 1;
        self.sweep_requests.insert(shard, ticket);
        ticket
    }

    pub fn sweep_ticket(&self, shard: u32) -> Option<u64> {
        self.sweep_requests.get(&shard).map(|t| *t)
    }

    /// Clear the request for `shard` unless a newer one arrived meanwhile.
    pub fn finish_sweep(&self, shard: u32, ticket: u64) {
        self.sweep_requests.remove_if(&shard, |_, t| *t == ticket);
    }

    pub fn has_pending_sweeps(&self) -> bool {
        !self.sweep_requests.is_empty()
    }

    pub fn pending_sweeps(&self) -> Vec<u32> {
        let mut shards: Vec<u32> = self.sweep_requests.iter().map(|e| *e.key()).collect();
        shards.sort_unstable();
        shards
    }

    pub async fn set_self_user(&self, user_id: Id) -> Result<()> {
        self.backend
            .put(keys::self_user(), codec::encode(Stamp::GLOBAL, &user_id)?)
            .await?;
        self.self_user.store(user_id, Ordering::SeqCst);
        Ok(())
    }

    pub async fn self_user(&self) -> Result<Option<Id>> {
        let cached = self.self_user.load(Ordering::SeqCst);
        if cached != 0 {
            return Ok(Some(cached));
        }
        match self.backend.get(&keys::self_user()).await? {
            Some(stored) => {
                let (_, user_id) = codec::decode::<Id>(&stored.value)?;
                self.self_user.store(user_id, Ordering::SeqCst);
                Ok(Some(user_id))
            }
            None => Ok(None),
        }
    }

    /// Mark a guild's member list complete. No-op when the guild is absent.
    pub async fn complete_member_list(&self, guild_id: Id) -> Result<bool> {
        let Some(stamp) = self.live_stamp(&keys::guild(guild_id)).await? else {
            debug!(guild_id, "tracker: completion for unknown guild ignored");
            return Ok(false);
        };
        self.backend
            .put(keys::member_list(guild_id), codec::encode(stamp, &true)?)
            .await?;
        debug!(guild_id, "tracker: member list complete");
        Ok(true)
    }

    pub async fn member_list_state(&self, guild_id: Id) -> Result<MemberListState> {
        if self.live_stamp(&keys::guild(guild_id)).await?.is_none() {
            return Ok(MemberListState::Absent);
        }
        match self.live_stamp(&keys::member_list(guild_id)).await? {
            Some(_) => Ok(MemberListState::Complete),
            None => Ok(MemberListState::Incomplete),
        }
    }
}

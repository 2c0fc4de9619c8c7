//! Store layout over a keyed [`Backend`].
//!
//! `KvLayout` implements both sides of the store on the ordered key space
//! described in `key.rs`. Writes are stamped with the writing shard's
//! generation; reads hide anything stamped with an older one. Guild-scoped
//! records are only listed while their guild is live, which keeps children
//! that arrived before their guild out of sight until it is created.
//!
//! ## Custom actions
//!
//! - `SWEEP_SHARD` `{"shard": N}` sweeps one shard, or every shard with a
//!   pending sweep when no shard is given
//! - `MEMBER_LIST_STATE` `{"guild_id": N}` reports member list completeness
//! - `SHARD_STATE` `{"shard": N}` reports whether a shard is connected

mod read;
mod stored;
mod write;

use std::sync::Arc;

use serde::Deserialize;
use shardcache_model::{Guild, Id, Member, PartialUser, Presence, User};
use tracing::error;

use crate::accessor::DataAccessor;
use crate::action::{Action, ActionTag, CustomAction};
use crate::backend::{Backend, MemoryBackend, WriteBatch};
use crate::codec::Stamp;
use crate::config::{StoreConfig, StoreFlags};
use crate::error::{Result, StoreError};
use crate::key::{Key, Table, keys};
use crate::layout::{ActionMapper, StoreLayout, handler};
use crate::outcome::Outcome;
use crate::repo::Repo;
use crate::sweep::SweepReport;
use crate::tracker::{MemberListState, Tracker};
use crate::updater::GatewayDataUpdater;

pub use stored::StoredMessage;

/// A store layout backed by any [`Backend`].
///
/// Cheap to clone; clones share the backend and the tracker.
#[derive(Clone)]
pub struct KvLayout {
    inner: Arc<KvInner>,
}

struct KvInner {
    repo: Repo,
    config: StoreConfig,
}

impl KvLayout {
    pub fn new(backend: Arc<dyn Backend>, config: StoreConfig) -> Self {
        let tracker = Tracker::new(backend.clone());
        let repo = Repo::new(backend, tracker, config.scan_page_size);
        Self {
            inner: Arc::new(KvInner { repo, config }),
        }
    }

    /// A layout over a fresh [`MemoryBackend`].
    pub fn in_memory(config: StoreConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn repo(&self) -> &Repo {
        &self.inner.repo
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        self.inner.repo.tracker()
    }

    fn flags(&self) -> &StoreFlags {
        &self.inner.config.flags
    }

    pub async fn sweep_shard(&self, shard: u32) -> Result<SweepReport> {
        self.repo().sweep_shard(shard).await
    }

    pub async fn sweep_pending(&self) -> Result<Vec<SweepReport>> {
        self.repo().sweep_pending().await
    }

    pub async fn member_list_state(&self, guild_id: Id) -> Result<MemberListState> {
        self.tracker().member_list_state(guild_id).await
    }

    /// Run a sweep for `shard` in the background or inline, per config.
    async fn schedule_sweep(&self, shard: u32) -> Result<()> {
        if self.config().background_sweep {
            let repo = self.repo().clone();
            tokio::spawn(async move {
                if let Err(e) = repo.sweep_shard(shard).await {
                    error!(shard, error = %e, "kv: background sweep failed");
                }
            });
            Ok(())
        } else {
            self.sweep_shard(shard).await.map(|_| ())
        }
    }

    /// Fill a guild's derived id lists and completeness from the store.
    async fn hydrate_guild(&self, mut guild: Guild) -> Result<Guild> {
        let repo = self.repo();
        let id = guild.id;
        guild.members = repo.live_ids(&keys::scoped(Table::Member, id)).await?;
        guild.channels = repo.live_ids(&keys::scoped(Table::GuildChannel, id)).await?;
        guild.roles = repo.live_ids(&keys::scoped(Table::Role, id)).await?;
        guild.emojis = repo.live_ids(&keys::scoped(Table::Emoji, id)).await?;
        guild.stickers = repo.live_ids(&keys::scoped(Table::Sticker, id)).await?;
        guild.member_list_complete = repo.exists(&keys::member_list(id)).await?;
        Ok(guild)
    }

    /// Queue deletes for a guild's whole subtree, stale records included.
    async fn delete_guild_subtree(&self, batch: &mut WriteBatch, guild_id: Id) -> Result<()> {
        let mut channel_ids = Vec::new();
        for table in Table::GUILD_SCOPED {
            for key in self.repo().keys_under(&keys::scoped(table, guild_id)).await? {
                if matches!(table, Table::GuildChannel | Table::GuildThread) {
                    channel_ids.extend(key.last_id());
                }
                batch.delete(key);
            }
        }
        for channel_id in channel_ids {
            self.delete_channel_subtree(batch, channel_id).await?;
        }
        Ok(())
    }

    /// Queue deletes for a channel record and everything keyed under it.
    async fn delete_channel_subtree(&self, batch: &mut WriteBatch, channel_id: Id) -> Result<()> {
        for table in Table::CHANNEL_SCOPED {
            for key in self.repo().keys_under(&keys::scoped(table, channel_id)).await? {
                batch.delete(key);
            }
        }
        Ok(())
    }

    /// Queue deletes for every entry under `prefix`.
    async fn delete_prefix(&self, batch: &mut WriteBatch, prefix: &Key) -> Result<()> {
        for key in self.repo().keys_under(prefix).await? {
            batch.delete(key);
        }
        Ok(())
    }

    async fn stamp(&self, shard: u32) -> Result<Stamp> {
        self.tracker().stamp(shard).await
    }
}

/// Replace the embedded user with the stored one, when there is one.
async fn attach_member_user(repo: &Repo, mut member: Member) -> Result<Member> {
    if let Some(user) = repo.get::<User>(&keys::user(member.user.id)).await? {
        member.user = user;
    }
    Ok(member)
}

async fn attach_presence_user(repo: &Repo, mut presence: Presence) -> Result<Presence> {
    if let Some(user) = repo.get::<User>(&keys::user(presence.user.id)).await? {
        presence.user = PartialUser::from(&user);
    }
    Ok(presence)
}

fn custom_action(action: Action) -> Result<CustomAction> {
    match action {
        Action::Custom(custom) => Ok(custom),
        other => Err(StoreError::MismatchedAction(other.tag().to_string())),
    }
}

#[derive(Deserialize)]
struct ShardRequest {
    #[serde(default)]
    shard: Option<u32>,
}

#[derive(Deserialize)]
struct GuildRequest {
    guild_id: Id,
}

impl StoreLayout for KvLayout {
    fn data_accessor(&self) -> Arc<dyn DataAccessor> {
        Arc::new(self.clone())
    }

    fn gateway_data_updater(&self) -> Arc<dyn GatewayDataUpdater> {
        Arc::new(self.clone())
    }

    fn enabled_flags(&self) -> StoreFlags {
        *self.flags()
    }

    fn custom_action_mapper(&self) -> ActionMapper {
        let sweep = self.clone();
        let completeness = self.clone();
        let shard_state = self.clone();
        let mut mapper = ActionMapper::empty();
        mapper.insert(
            ActionTag::Custom("SWEEP_SHARD".to_string()),
            handler(move |action| {
                let layout = sweep.clone();
                async move {
                    let custom = custom_action(action)?;
                    let request: ShardRequest = custom.decode()?;
                    let reports = match request.shard.or(custom.shard) {
                        Some(shard) => vec![layout.sweep_shard(shard).await?],
                        None => layout.sweep_pending().await?,
                    };
                    Ok(Outcome::Custom(serde_json::json!(reports)))
                }
            }),
        );
        mapper.insert(
            ActionTag::Custom("MEMBER_LIST_STATE".to_string()),
            handler(move |action| {
                let layout = completeness.clone();
                async move {
                    let request: GuildRequest = custom_action(action)?.decode()?;
                    let state = layout.member_list_state(request.guild_id).await?;
                    Ok(Outcome::Custom(serde_json::json!(state)))
                }
            }),
        );
        mapper.insert(
            ActionTag::Custom("SHARD_STATE".to_string()),
            handler(move |action| {
                let layout = shard_state.clone();
                async move {
                    let custom = custom_action(action)?;
                    let request: ShardRequest = custom.decode()?;
                    let shard = request.shard.or(custom.shard).unwrap_or_default();
                    Ok(Outcome::Custom(serde_json::json!({
                        "shard": shard,
                        "state": layout.tracker().shard_state(shard),
                        "pending_sweep": layout.tracker().sweep_ticket(shard).is_some(),
                    })))
                }
            }),
        );
        mapper
    }
}

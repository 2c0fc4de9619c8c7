//! Routing tables and the layout contract.
//!
//! A layout supplies the three pieces a store is assembled from: a data
//! accessor for reads, a gateway data updater for writes, and an optional
//! table of custom actions. The store turns the first two into handler
//! tables keyed by [`ActionTag`], honouring the layout's enabled flags.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use shardcache_model::Id;
use tracing::trace;

use crate::accessor::DataAccessor;
use crate::action::{Action, ActionTag, GatewayKind, apply_dispatch};
use crate::config::StoreFlags;
use crate::error::{Result, StoreError};
use crate::outcome::{Outcome, Snapshot};
use crate::query::{EntityKind, Query, Scope};
use crate::repo::EntityStream;
use crate::updater::GatewayDataUpdater;

/// An action handler.
pub type Handler = Arc<dyn Fn(Action) -> BoxFuture<'static, Result<Outcome>> + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Action) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome>> + Send + 'static,
{
    Arc::new(move |action| f(action).boxed())
}

/// Table from action tag to handler.
#[derive(Clone, Default)]
pub struct ActionMapper {
    handlers: HashMap<ActionTag, Handler>,
}

/// Builder for an [`ActionMapper`].
#[derive(Default)]
pub struct ActionMapperBuilder {
    handlers: HashMap<ActionTag, Handler>,
    duplicate: Option<ActionTag>,
}

impl ActionMapperBuilder {
    pub fn map(mut self, tag: ActionTag, handler: Handler) -> Self {
        match self.handlers.entry(tag) {
            Entry::Occupied(entry) => {
                if self.duplicate.is_none() {
                    self.duplicate = Some(entry.key().clone());
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(handler);
            }
        }
        self
    }

    /// Map a custom action by name.
    pub fn map_custom(self, name: impl Into<String>, handler: Handler) -> Self {
        self.map(ActionTag::Custom(name.into()), handler)
    }

    /// Fails if any tag was mapped twice.
    pub fn build(self) -> Result<ActionMapper> {
        match self.duplicate {
            Some(tag) => Err(StoreError::DuplicateHandler(tag.to_string())),
            None => Ok(ActionMapper {
                handlers: self.handlers,
            }),
        }
    }
}

impl ActionMapper {
    pub fn builder() -> ActionMapperBuilder {
        ActionMapperBuilder::default()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Union of several mappers. A tag declared by more than one of them is
    /// an error.
    pub fn aggregate(mappers: impl IntoIterator<Item = ActionMapper>) -> Result<Self> {
        let mut handlers = HashMap::new();
        for mapper in mappers {
            for (tag, handler) in mapper.handlers {
                match handlers.entry(tag) {
                    Entry::Occupied(entry) => {
                        return Err(StoreError::DuplicateHandler(entry.key().to_string()));
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(handler);
                    }
                }
            }
        }
        Ok(Self { handlers })
    }

    /// Union of several mappers where the first to declare a tag wins.
    pub fn merge_first(mappers: impl IntoIterator<Item = ActionMapper>) -> Self {
        let mut handlers = HashMap::new();
        for mapper in mappers {
            for (tag, handler) in mapper.handlers {
                handlers.entry(tag).or_insert(handler);
            }
        }
        Self { handlers }
    }

    pub fn find(&self, tag: &ActionTag) -> Option<&Handler> {
        self.handlers.get(tag)
    }

    /// Add or replace one handler.
    pub fn insert(&mut self, tag: ActionTag, handler: Handler) -> Option<Handler> {
        self.handlers.insert(tag, handler)
    }

    pub fn contains(&self, tag: &ActionTag) -> bool {
        self.handlers.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// The pieces a store is assembled from.
pub trait StoreLayout: Send + Sync {
    fn data_accessor(&self) -> Arc<dyn DataAccessor>;

    fn gateway_data_updater(&self) -> Arc<dyn GatewayDataUpdater>;

    fn custom_action_mapper(&self) -> ActionMapper {
        ActionMapper::empty()
    }

    fn enabled_flags(&self) -> StoreFlags {
        StoreFlags::all()
    }
}

fn mismatched(action: &Action) -> StoreError {
    StoreError::MismatchedAction(action.tag().to_string())
}

fn skipped() -> Handler {
    handler(|action: Action| async move {
        trace!(tag = %action.tag(), "layout: category disabled, skipped");
        Ok(Outcome::Skipped)
    })
}

/// One handler per gateway kind. Kinds of disabled categories are
/// acknowledged without touching state.
pub fn gateway_mapper(updater: Arc<dyn GatewayDataUpdater>, flags: StoreFlags) -> ActionMapper {
    let mut mapper = ActionMapper::empty();
    for kind in GatewayKind::ALL.iter().copied() {
        let enabled = kind.flag().is_none_or(|flag| flags.is_enabled(flag));
        let h = if enabled {
            let updater = updater.clone();
            handler(move |action| {
                let updater = updater.clone();
                async move {
                    match action {
                        Action::Gateway(gateway) => {
                            apply_dispatch(updater.as_ref(), gateway.shard, gateway.dispatch).await
                        }
                        other => Err(mismatched(&other)),
                    }
                }
            })
        } else {
            skipped()
        };
        mapper.insert(ActionTag::Gateway(kind), h);
    }
    mapper
}

/// One handler per readable entity kind. Reads of disabled categories see
/// an empty store.
pub fn read_mapper(accessor: Arc<dyn DataAccessor>, flags: StoreFlags) -> ActionMapper {
    let mut mapper = ActionMapper::empty();
    for entity in EntityKind::ALL {
        let h = if flags.is_enabled(entity.flag()) {
            let accessor = accessor.clone();
            handler(move |action| {
                let accessor = accessor.clone();
                async move {
                    match action {
                        Action::Read(query) => run_query(accessor.as_ref(), query).await,
                        other => Err(mismatched(&other)),
                    }
                }
            })
        } else {
            handler(|action| async move {
                match action {
                    Action::Read(query) => disabled_read(&query),
                    other => Err(mismatched(&other)),
                }
            })
        };
        mapper.insert(ActionTag::Read(entity), h);
    }
    mapper
}

/// Gateway and read handlers that do nothing.
pub fn no_op_mapper() -> ActionMapper {
    let mut mapper = ActionMapper::empty();
    for kind in GatewayKind::ALL.iter().copied() {
        mapper.insert(ActionTag::Gateway(kind), skipped());
    }
    for entity in EntityKind::ALL {
        mapper.insert(
            ActionTag::Read(entity),
            handler(|action| async move {
                match action {
                    Action::Read(query) => disabled_read(&query),
                    other => Err(mismatched(&other)),
                }
            }),
        );
    }
    mapper
}

fn disabled_read(query: &Query) -> Result<Outcome> {
    match query {
        Query::Count { .. } => Ok(Outcome::Count(0)),
        Query::List { .. } => Ok(Outcome::Entities(stream::empty().boxed())),
        Query::Get { .. } => Ok(Outcome::Entity(None)),
        Query::CountExactMembers { guild_id } | Query::ListExactMembers { guild_id } => {
            Err(StoreError::ExactResultNotAvailable {
                guild_id: *guild_id,
            })
        }
    }
}

fn snapshots<T>(listing: EntityStream<T>) -> EntityStream<Snapshot>
where
    T: Into<Snapshot> + Send + 'static,
{
    listing.map_ok(Into::into).boxed()
}

fn unsupported(op: &str, entity: EntityKind, detail: impl std::fmt::Debug) -> StoreError {
    StoreError::UnsupportedQuery(format!("{} {} with {:?}", op, entity, detail))
}

/// Answer a query with the accessor method it names.
pub async fn run_query(accessor: &dyn DataAccessor, query: Query) -> Result<Outcome> {
    use EntityKind as E;
    use Scope as S;

    let outcome = match query {
        Query::CountExactMembers { guild_id } => {
            Outcome::Count(accessor.count_exact_members_in_guild(guild_id).await?)
        }
        Query::ListExactMembers { guild_id } => {
            Outcome::Entities(snapshots(accessor.get_exact_members_in_guild(guild_id).await?))
        }
        Query::Count { entity, scope } => Outcome::Count(match (entity, scope) {
            (E::Channel, S::All) => accessor.count_channels().await?,
            (E::Channel, S::Guild { guild_id }) => accessor.count_channels_in_guild(guild_id).await?,
            (E::Sticker, S::All) => accessor.count_stickers().await?,
            (E::Sticker, S::Guild { guild_id }) => accessor.count_stickers_in_guild(guild_id).await?,
            (E::Emoji, S::All) => accessor.count_emojis().await?,
            (E::Emoji, S::Guild { guild_id }) => accessor.count_emojis_in_guild(guild_id).await?,
            (E::Guild, S::All) => accessor.count_guilds().await?,
            (E::Member, S::All) => accessor.count_members().await?,
            (E::Member, S::Guild { guild_id }) => accessor.count_members_in_guild(guild_id).await?,
            (E::Message, S::All) => accessor.count_messages().await?,
            (E::Message, S::Channel { channel_id }) => {
                accessor.count_messages_in_channel(channel_id).await?
            }
            (E::Presence, S::All) => accessor.count_presences().await?,
            (E::Presence, S::Guild { guild_id }) => {
                accessor.count_presences_in_guild(guild_id).await?
            }
            (E::Role, S::All) => accessor.count_roles().await?,
            (E::Role, S::Guild { guild_id }) => accessor.count_roles_in_guild(guild_id).await?,
            (E::User, S::All) => accessor.count_users().await?,
            (E::VoiceState, S::All) => accessor.count_voice_states().await?,
            (E::VoiceState, S::Guild { guild_id }) => {
                accessor.count_voice_states_in_guild(guild_id).await?
            }
            (
                E::VoiceState,
                S::GuildChannel {
                    guild_id,
                    channel_id,
                },
            ) => {
                accessor
                    .count_voice_states_in_channel(guild_id, channel_id)
                    .await?
            }
            (entity, scope) => return Err(unsupported("count", entity, scope)),
        }),
        Query::List { entity, scope } => Outcome::Entities(match (entity, scope) {
            (E::Channel, S::All) => snapshots(accessor.get_channels()),
            (E::Channel, S::Guild { guild_id }) => {
                snapshots(accessor.get_channels_in_guild(guild_id))
            }
            (E::Sticker, S::All) => snapshots(accessor.get_stickers()),
            (E::Sticker, S::Guild { guild_id }) => {
                snapshots(accessor.get_stickers_in_guild(guild_id))
            }
            (E::Emoji, S::All) => snapshots(accessor.get_emojis()),
            (E::Emoji, S::Guild { guild_id }) => snapshots(accessor.get_emojis_in_guild(guild_id)),
            (E::Guild, S::All) => snapshots(accessor.get_guilds()),
            (E::Member, S::All) => snapshots(accessor.get_members()),
            (E::Member, S::Guild { guild_id }) => {
                snapshots(accessor.get_members_in_guild(guild_id))
            }
            (E::Message, S::All) => snapshots(accessor.get_messages()),
            (E::Message, S::Channel { channel_id }) => {
                snapshots(accessor.get_messages_in_channel(channel_id))
            }
            (E::Presence, S::All) => snapshots(accessor.get_presences()),
            (E::Presence, S::Guild { guild_id }) => {
                snapshots(accessor.get_presences_in_guild(guild_id))
            }
            (E::Role, S::All) => snapshots(accessor.get_roles()),
            (E::Role, S::Guild { guild_id }) => snapshots(accessor.get_roles_in_guild(guild_id)),
            (E::User, S::All) => snapshots(accessor.get_users()),
            (E::VoiceState, S::All) => snapshots(accessor.get_voice_states()),
            (E::VoiceState, S::Guild { guild_id }) => {
                snapshots(accessor.get_voice_states_in_guild(guild_id))
            }
            (
                E::VoiceState,
                S::GuildChannel {
                    guild_id,
                    channel_id,
                },
            ) => snapshots(accessor.get_voice_states_in_channel(guild_id, channel_id)),
            (E::ScheduledEvent, S::Guild { guild_id }) => {
                snapshots(accessor.get_scheduled_events_in_guild(guild_id))
            }
            (E::EventUser, S::ScheduledEvent { guild_id, event_id }) => {
                snapshots(accessor.get_scheduled_event_users_in_event(guild_id, event_id))
            }
            (E::ThreadMember, S::Thread { thread_id }) => {
                snapshots(accessor.get_members_in_thread(thread_id))
            }
            (entity, scope) => return Err(unsupported("list", entity, scope)),
        }),
        Query::Get {
            entity,
            parent_id,
            id,
        } => Outcome::Entity(get_entity(accessor, entity, parent_id, id).await?),
    };
    Ok(outcome)
}

async fn get_entity(
    accessor: &dyn DataAccessor,
    entity: EntityKind,
    parent_id: Option<Id>,
    id: Id,
) -> Result<Option<Snapshot>> {
    use EntityKind as E;

    let found = match (entity, parent_id) {
        (E::Channel, None) => accessor.get_channel_by_id(id).await?.map(Snapshot::from),
        (E::Guild, None) => accessor.get_guild_by_id(id).await?.map(Snapshot::from),
        (E::User, None) => accessor.get_user_by_id(id).await?.map(Snapshot::from),
        (E::StageInstance, None) => accessor
            .get_stage_instance_by_channel_id(id)
            .await?
            .map(Snapshot::from),
        (E::Sticker, Some(guild_id)) => accessor
            .get_sticker_by_id(guild_id, id)
            .await?
            .map(Snapshot::from),
        (E::Emoji, Some(guild_id)) => accessor
            .get_emoji_by_id(guild_id, id)
            .await?
            .map(Snapshot::from),
        (E::Member, Some(guild_id)) => accessor
            .get_member_by_id(guild_id, id)
            .await?
            .map(Snapshot::from),
        (E::Message, Some(channel_id)) => accessor
            .get_message_by_id(channel_id, id)
            .await?
            .map(Snapshot::from),
        (E::Presence, Some(guild_id)) => accessor
            .get_presence_by_id(guild_id, id)
            .await?
            .map(Snapshot::from),
        (E::Role, Some(guild_id)) => accessor
            .get_role_by_id(guild_id, id)
            .await?
            .map(Snapshot::from),
        (E::VoiceState, Some(guild_id)) => accessor
            .get_voice_state_by_id(guild_id, id)
            .await?
            .map(Snapshot::from),
        (E::ScheduledEvent, Some(guild_id)) => accessor
            .get_scheduled_event_by_id(guild_id, id)
            .await?
            .map(Snapshot::from),
        (E::ThreadMember, Some(thread_id)) => accessor
            .get_thread_member_by_id(thread_id, id)
            .await?
            .map(Snapshot::from),
        (entity, parent_id) => return Err(unsupported("get", entity, parent_id)),
    };
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done() -> Handler {
        handler(|_| async { Ok(Outcome::Done) })
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let result = ActionMapper::builder()
            .map_custom("A", done())
            .map_custom("A", done())
            .build();
        assert!(matches!(result, Err(StoreError::DuplicateHandler(tag)) if tag == "A"));
    }

    #[test]
    fn test_aggregate_and_merge_first() {
        let first = ActionMapper::builder()
            .map_custom("A", done())
            .build()
            .unwrap();
        let second = ActionMapper::builder()
            .map_custom("A", done())
            .map_custom("B", done())
            .build()
            .unwrap();

        assert!(ActionMapper::aggregate([first.clone(), second.clone()]).is_err());
        let merged = ActionMapper::merge_first([first, second]);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&ActionTag::Custom("B".to_string())));
    }

    #[tokio::test]
    async fn test_no_op_mapper_answers_every_builtin() {
        let mapper = no_op_mapper();
        assert_eq!(mapper.len(), GatewayKind::ALL.len() + EntityKind::ALL.len());

        let count = Query::count(EntityKind::Guild, Scope::All);
        let h = mapper.find(&ActionTag::Read(EntityKind::Guild)).unwrap();
        assert_eq!(h(Action::Read(count)).await.unwrap().count(), Some(0));

        let exact = Query::CountExactMembers { guild_id: 9 };
        let h = mapper.find(&ActionTag::Read(EntityKind::Member)).unwrap();
        assert!(matches!(
            h(Action::Read(exact)).await,
            Err(StoreError::ExactResultNotAvailable { guild_id: 9 })
        ));
    }
}

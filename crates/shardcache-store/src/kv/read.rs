//! Queries over the key space.
//!
//! Per-guild listings and counts are gated on the guild being live. Global
//! listings are plain table scans.

use async_trait::async_trait;
use futures_util::stream::{StreamExt, TryStreamExt};
use shardcache_model::{
    Channel, Emoji, Guild, Id, Member, Message, Presence, Role, ScheduledEvent, StageInstance,
    Sticker, ThreadMember, User, VoiceState,
};
use tracing::debug;

use super::stored::StoredMessage;
use super::{KvLayout, attach_member_user, attach_presence_user};
use crate::accessor::DataAccessor;
use crate::error::{Result, StoreError};
use crate::key::{Key, Table, keys};
use crate::repo::EntityStream;
use crate::tracker::MemberListState;

impl KvLayout {
    /// Records of `table` under a live guild.
    fn guild_values<T>(&self, table: Table, guild_id: Id) -> EntityStream<T>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        let inner = self.repo().values(keys::scoped(table, guild_id));
        self.repo().scoped(keys::guild(guild_id), inner)
    }

    async fn count_in_guild(&self, table: Table, guild_id: Id) -> Result<u64> {
        self.repo()
            .count_scoped(&keys::guild(guild_id), &keys::scoped(table, guild_id))
            .await
    }

    /// A guild-scoped record, visible only while its guild is.
    async fn get_in_guild<T>(&self, guild_id: Id, key: Key) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        if !self.repo().exists(&keys::guild(guild_id)).await? {
            return Ok(None);
        }
        self.repo().get(&key).await
    }

    fn with_users(&self, members: EntityStream<Member>) -> EntityStream<Member> {
        let repo = self.repo().clone();
        members
            .and_then(move |member| {
                let repo = repo.clone();
                async move { attach_member_user(&repo, member).await }
            })
            .boxed()
    }

    fn with_presence_users(&self, presences: EntityStream<Presence>) -> EntityStream<Presence> {
        let repo = self.repo().clone();
        presences
            .and_then(move |presence| {
                let repo = repo.clone();
                async move { attach_presence_user(&repo, presence).await }
            })
            .boxed()
    }

    /// Resolve index entries to channel records.
    fn indexed_channels(&self, index: Table, guild_id: Id) -> EntityStream<Channel> {
        let repo = self.repo().clone();
        self.guild_values::<Id>(index, guild_id)
            .try_filter_map(move |channel_id| {
                let repo = repo.clone();
                async move { repo.get::<Channel>(&keys::channel(channel_id)).await }
            })
            .boxed()
    }

    async fn require_complete(&self, guild_id: Id) -> Result<()> {
        match self.member_list_state(guild_id).await? {
            MemberListState::Complete => Ok(()),
            state => {
                debug!(guild_id, ?state, "kv: exact member read refused");
                Err(StoreError::ExactResultNotAvailable { guild_id })
            }
        }
    }
}

#[async_trait]
impl DataAccessor for KvLayout {
    async fn count_channels(&self) -> Result<u64> {
        self.repo().count(&Key::table(Table::Channel)).await
    }

    async fn count_channels_in_guild(&self, guild_id: Id) -> Result<u64> {
        self.count_in_guild(Table::GuildChannel, guild_id).await
    }

    async fn count_stickers(&self) -> Result<u64> {
        self.repo().count(&Key::table(Table::Sticker)).await
    }

    async fn count_stickers_in_guild(&self, guild_id: Id) -> Result<u64> {
        self.count_in_guild(Table::Sticker, guild_id).await
    }

    async fn count_emojis(&self) -> Result<u64> {
        self.repo().count(&Key::table(Table::Emoji)).await
    }

    async fn count_emojis_in_guild(&self, guild_id: Id) -> Result<u64> {
        self.count_in_guild(Table::Emoji, guild_id).await
    }

    async fn count_guilds(&self) -> Result<u64> {
        self.repo().count(&Key::table(Table::Guild)).await
    }

    async fn count_members(&self) -> Result<u64> {
        self.repo().count(&Key::table(Table::Member)).await
    }

    async fn count_members_in_guild(&self, guild_id: Id) -> Result<u64> {
        self.count_in_guild(Table::Member, guild_id).await
    }

    async fn count_exact_members_in_guild(&self, guild_id: Id) -> Result<u64> {
        self.require_complete(guild_id).await?;
        self.count_in_guild(Table::Member, guild_id).await
    }

    async fn count_messages(&self) -> Result<u64> {
        self.repo().count(&Key::table(Table::Message)).await
    }

    async fn count_messages_in_channel(&self, channel_id: Id) -> Result<u64> {
        self.repo()
            .count(&keys::scoped(Table::Message, channel_id))
            .await
    }

    async fn count_presences(&self) -> Result<u64> {
        self.repo().count(&Key::table(Table::Presence)).await
    }

    async fn count_presences_in_guild(&self, guild_id: Id) -> Result<u64> {
        self.count_in_guild(Table::Presence, guild_id).await
    }

    async fn count_roles(&self) -> Result<u64> {
        self.repo().count(&Key::table(Table::Role)).await
    }

    async fn count_roles_in_guild(&self, guild_id: Id) -> Result<u64> {
        self.count_in_guild(Table::Role, guild_id).await
    }

    async fn count_users(&self) -> Result<u64> {
        self.repo().count(&Key::table(Table::User)).await
    }

    async fn count_voice_states(&self) -> Result<u64> {
        self.repo().count(&Key::table(Table::VoiceState)).await
    }

    async fn count_voice_states_in_guild(&self, guild_id: Id) -> Result<u64> {
        self.count_in_guild(Table::VoiceState, guild_id).await
    }

    async fn count_voice_states_in_channel(&self, guild_id: Id, channel_id: Id) -> Result<u64> {
        let count = self
            .get_voice_states_in_channel(guild_id, channel_id)
            .try_fold(0u64, |n, _| async move { Ok(n + 1) })
            .await?;
        Ok(count)
    }

    fn get_channels(&self) -> EntityStream<Channel> {
        self.repo().values(Key::table(Table::Channel))
    }

    fn get_channels_in_guild(&self, guild_id: Id) -> EntityStream<Channel> {
        self.indexed_channels(Table::GuildChannel, guild_id)
    }

    async fn get_channel_by_id(&self, channel_id: Id) -> Result<Option<Channel>> {
        self.repo().get(&keys::channel(channel_id)).await
    }

    fn get_stickers(&self) -> EntityStream<Sticker> {
        self.repo().values(Key::table(Table::Sticker))
    }

    fn get_stickers_in_guild(&self, guild_id: Id) -> EntityStream<Sticker> {
        self.guild_values(Table::Sticker, guild_id)
    }

    async fn get_sticker_by_id(&self, guild_id: Id, sticker_id: Id) -> Result<Option<Sticker>> {
        self.get_in_guild(guild_id, keys::sticker(guild_id, sticker_id))
            .await
    }

    fn get_emojis(&self) -> EntityStream<Emoji> {
        self.repo().values(Key::table(Table::Emoji))
    }

    fn get_emojis_in_guild(&self, guild_id: Id) -> EntityStream<Emoji> {
        self.guild_values(Table::Emoji, guild_id)
    }

    async fn get_emoji_by_id(&self, guild_id: Id, emoji_id: Id) -> Result<Option<Emoji>> {
        self.get_in_guild(guild_id, keys::emoji(guild_id, emoji_id))
            .await
    }

    fn get_guilds(&self) -> EntityStream<Guild> {
        let layout = self.clone();
        self.repo()
            .values::<Guild>(Key::table(Table::Guild))
            .and_then(move |guild| {
                let layout = layout.clone();
                async move { layout.hydrate_guild(guild).await }
            })
            .boxed()
    }

    async fn get_guild_by_id(&self, guild_id: Id) -> Result<Option<Guild>> {
        match self.repo().get::<Guild>(&keys::guild(guild_id)).await? {
            Some(guild) => Ok(Some(self.hydrate_guild(guild).await?)),
            None => Ok(None),
        }
    }

    fn get_scheduled_events_in_guild(&self, guild_id: Id) -> EntityStream<ScheduledEvent> {
        self.guild_values(Table::ScheduledEvent, guild_id)
    }

    async fn get_scheduled_event_by_id(
        &self,
        guild_id: Id,
        event_id: Id,
    ) -> Result<Option<ScheduledEvent>> {
        self.get_in_guild(guild_id, keys::scheduled_event(guild_id, event_id))
            .await
    }

    fn get_scheduled_event_users_in_event(&self, guild_id: Id, event_id: Id) -> EntityStream<Id> {
        let prefix = Key::table(Table::EventUser).push(guild_id).push(event_id);
        let inner = self.repo().values(prefix);
        self.repo().scoped(keys::guild(guild_id), inner)
    }

    fn get_members(&self) -> EntityStream<Member> {
        self.with_users(self.repo().values(Key::table(Table::Member)))
    }

    fn get_members_in_guild(&self, guild_id: Id) -> EntityStream<Member> {
        self.with_users(self.guild_values(Table::Member, guild_id))
    }

    async fn get_exact_members_in_guild(&self, guild_id: Id) -> Result<EntityStream<Member>> {
        self.require_complete(guild_id).await?;
        Ok(self.get_members_in_guild(guild_id))
    }

    async fn get_member_by_id(&self, guild_id: Id, user_id: Id) -> Result<Option<Member>> {
        match self
            .get_in_guild::<Member>(guild_id, keys::member(guild_id, user_id))
            .await?
        {
            Some(member) => Ok(Some(attach_member_user(self.repo(), member).await?)),
            None => Ok(None),
        }
    }

    fn get_messages(&self) -> EntityStream<Message> {
        self.repo()
            .values::<StoredMessage>(Key::table(Table::Message))
            .map_ok(|stored| stored.message)
            .boxed()
    }

    fn get_messages_in_channel(&self, channel_id: Id) -> EntityStream<Message> {
        self.repo()
            .values::<StoredMessage>(keys::scoped(Table::Message, channel_id))
            .map_ok(|stored| stored.message)
            .boxed()
    }

    async fn get_message_by_id(&self, channel_id: Id, message_id: Id) -> Result<Option<Message>> {
        Ok(self
            .repo()
            .get::<StoredMessage>(&keys::message(channel_id, message_id))
            .await?
            .map(|stored| stored.message))
    }

    fn get_presences(&self) -> EntityStream<Presence> {
        self.with_presence_users(self.repo().values(Key::table(Table::Presence)))
    }

    fn get_presences_in_guild(&self, guild_id: Id) -> EntityStream<Presence> {
        self.with_presence_users(self.guild_values(Table::Presence, guild_id))
    }

    async fn get_presence_by_id(&self, guild_id: Id, user_id: Id) -> Result<Option<Presence>> {
        match self
            .get_in_guild::<Presence>(guild_id, keys::presence(guild_id, user_id))
            .await?
        {
            Some(presence) => Ok(Some(attach_presence_user(self.repo(), presence).await?)),
            None => Ok(None),
        }
    }

    fn get_roles(&self) -> EntityStream<Role> {
        self.repo().values(Key::table(Table::Role))
    }

    fn get_roles_in_guild(&self, guild_id: Id) -> EntityStream<Role> {
        self.guild_values(Table::Role, guild_id)
    }

    async fn get_role_by_id(&self, guild_id: Id, role_id: Id) -> Result<Option<Role>> {
        self.get_in_guild(guild_id, keys::role(guild_id, role_id))
            .await
    }

    fn get_users(&self) -> EntityStream<User> {
        self.repo().values(Key::table(Table::User))
    }

    async fn get_user_by_id(&self, user_id: Id) -> Result<Option<User>> {
        self.repo().get(&keys::user(user_id)).await
    }

    fn get_voice_states(&self) -> EntityStream<VoiceState> {
        self.repo().values(Key::table(Table::VoiceState))
    }

    fn get_voice_states_in_channel(&self, guild_id: Id, channel_id: Id) -> EntityStream<VoiceState> {
        self.guild_values::<VoiceState>(Table::VoiceState, guild_id)
            .try_filter(move |state| std::future::ready(state.channel_id == Some(channel_id)))
            .boxed()
    }

    fn get_voice_states_in_guild(&self, guild_id: Id) -> EntityStream<VoiceState> {
        self.guild_values(Table::VoiceState, guild_id)
    }

    async fn get_voice_state_by_id(&self, guild_id: Id, user_id: Id) -> Result<Option<VoiceState>> {
        self.get_in_guild(guild_id, keys::voice_state(guild_id, user_id))
            .await
    }

    async fn get_stage_instance_by_channel_id(
        &self,
        channel_id: Id,
    ) -> Result<Option<StageInstance>> {
        self.repo().get(&keys::stage_instance(channel_id)).await
    }

    async fn get_thread_member_by_id(
        &self,
        thread_id: Id,
        user_id: Id,
    ) -> Result<Option<ThreadMember>> {
        self.repo()
            .get(&keys::thread_member(thread_id, user_id))
            .await
    }

    fn get_members_in_thread(&self, thread_id: Id) -> EntityStream<ThreadMember> {
        self.repo()
            .values(keys::scoped(Table::ThreadMember, thread_id))
    }
}

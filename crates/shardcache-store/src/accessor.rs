//! Read-side contract.

use async_trait::async_trait;
use shardcache_model::{
    Channel, Emoji, Guild, Id, Member, Message, Presence, Role, ScheduledEvent, StageInstance,
    Sticker, ThreadMember, User, VoiceState,
};

use crate::error::Result;
use crate::repo::EntityStream;

/// Answers point lookups, listings and counts against current store state.
///
/// Point lookups return `None` for unknown entities. Listings and counts
/// scoped to a parent are empty when the parent itself is absent.
#[async_trait]
pub trait DataAccessor: Send + Sync {
    async fn count_channels(&self) -> Result<u64>;
    async fn count_channels_in_guild(&self, guild_id: Id) -> Result<u64>;
    async fn count_stickers(&self) -> Result<u64>;
    async fn count_stickers_in_guild(&self, guild_id: Id) -> Result<u64>;
    async fn count_emojis(&self) -> Result<u64>;
    async fn count_emojis_in_guild(&self, guild_id: Id) -> Result<u64>;
    async fn count_guilds(&self) -> Result<u64>;
    async fn count_members(&self) -> Result<u64>;
    async fn count_members_in_guild(&self, guild_id: Id) -> Result<u64>;
    /// Fails with `ExactResultNotAvailable` unless the member list is
    /// complete.
    async fn count_exact_members_in_guild(&self, guild_id: Id) -> Result<u64>;
    async fn count_messages(&self) -> Result<u64>;
    async fn count_messages_in_channel(&self, channel_id: Id) -> Result<u64>;
    async fn count_presences(&self) -> Result<u64>;
    async fn count_presences_in_guild(&self, guild_id: Id) -> Result<u64>;
    async fn count_roles(&self) -> Result<u64>;
    async fn count_roles_in_guild(&self, guild_id: Id) -> Result<u64>;
    async fn count_users(&self) -> Result<u64>;
    async fn count_voice_states(&self) -> Result<u64>;
    async fn count_voice_states_in_guild(&self, guild_id: Id) -> Result<u64>;
    async fn count_voice_states_in_channel(&self, guild_id: Id, channel_id: Id) -> Result<u64>;

    fn get_channels(&self) -> EntityStream<Channel>;
    fn get_channels_in_guild(&self, guild_id: Id) -> EntityStream<Channel>;
    async fn get_channel_by_id(&self, channel_id: Id) -> Result<Option<Channel>>;

    fn get_stickers(&self) -> EntityStream<Sticker>;
    fn get_stickers_in_guild(&self, guild_id: Id) -> EntityStream<Sticker>;
    async fn get_sticker_by_id(&self, guild_id: Id, sticker_id: Id) -> Result<Option<Sticker>>;

    fn get_emojis(&self) -> EntityStream<Emoji>;
    fn get_emojis_in_guild(&self, guild_id: Id) -> EntityStream<Emoji>;
    async fn get_emoji_by_id(&self, guild_id: Id, emoji_id: Id) -> Result<Option<Emoji>>;

    fn get_guilds(&self) -> EntityStream<Guild>;
    async fn get_guild_by_id(&self, guild_id: Id) -> Result<Option<Guild>>;

    fn get_scheduled_events_in_guild(&self, guild_id: Id) -> EntityStream<ScheduledEvent>;
    async fn get_scheduled_event_by_id(
        &self,
        guild_id: Id,
        event_id: Id,
    ) -> Result<Option<ScheduledEvent>>;
    fn get_scheduled_event_users_in_event(&self, guild_id: Id, event_id: Id) -> EntityStream<Id>;

    fn get_members(&self) -> EntityStream<Member>;
    fn get_members_in_guild(&self, guild_id: Id) -> EntityStream<Member>;
    /// Fails with `ExactResultNotAvailable` unless the member list is
    /// complete.
    async fn get_exact_members_in_guild(&self, guild_id: Id) -> Result<EntityStream<Member>>;
    async fn get_member_by_id(&self, guild_id: Id, user_id: Id) -> Result<Option<Member>>;

    fn get_messages(&self) -> EntityStream<Message>;
    fn get_messages_in_channel(&self, channel_id: Id) -> EntityStream<Message>;
    async fn get_message_by_id(&self, channel_id: Id, message_id: Id) -> Result<Option<Message>>;

    fn get_presences(&self) -> EntityStream<Presence>;
    fn get_presences_in_guild(&self, guild_id: Id) -> EntityStream<Presence>;
    async fn get_presence_by_id(&self, guild_id: Id, user_id: Id) -> Result<Option<Presence>>;

    fn get_roles(&self) -> EntityStream<Role>;
    fn get_roles_in_guild(&self, guild_id: Id) -> EntityStream<Role>;
    async fn get_role_by_id(&self, guild_id: Id, role_id: Id) -> Result<Option<Role>>;

    fn get_users(&self) -> EntityStream<User>;
    async fn get_user_by_id(&self, user_id: Id) -> Result<Option<User>>;

    fn get_voice_states(&self) -> EntityStream<VoiceState>;
    fn get_voice_states_in_channel(&self, guild_id: Id, channel_id: Id)
    -> EntityStream<VoiceState>;
    fn get_voice_states_in_guild(&self, guild_id: Id) -> EntityStream<VoiceState>;
    async fn get_voice_state_by_id(&self, guild_id: Id, user_id: Id)
    -> Result<Option<VoiceState>>;

    async fn get_stage_instance_by_channel_id(&self, channel_id: Id)
    -> Result<Option<StageInstance>>;

    async fn get_thread_member_by_id(
        &self,
        thread_id: Id,
        user_id: Id,
    ) -> Result<Option<ThreadMember>>;
    fn get_members_in_thread(&self, thread_id: Id) -> EntityStream<ThreadMember>;
}

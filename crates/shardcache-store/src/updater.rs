//! Write-side contract.

use async_trait::async_trait;
use shardcache_model::{
    Channel, Emoji, Guild, GuildCreate, GuildEmojisUpdate, GuildMemberRemove, GuildMemberUpdate,
    GuildMembersChunk, GuildMembersCompletion, GuildRole, GuildRoleDelete, GuildStickersUpdate,
    Member, Message, MessageDelete, MessageDeleteBulk, MessageReaction, MessageReactionRemoveAll,
    MessageReactionRemoveEmoji, PartialGuild, PartialMessage, Presence, Ready, Role,
    ScheduledEvent, ScheduledEventUser, StageInstance, Sticker, ThreadDelete, ThreadListSync,
    ThreadMember, ThreadMembersUpdate, UnavailableGuild, User, VoiceState,
};

use crate::error::Result;
use crate::tracker::InvalidationCause;

/// Result of a shard invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    pub shard: u32,
    /// New generation, or `None` when the cause was filtered out.
    pub generation: Option<u64>,
}

/// Applies gateway notifications to the store.
///
/// One method per notification category. Each returns the state the
/// notification replaced, so callers can diff old against new. Every method
/// tolerates redelivery and children arriving before their parent: creating
/// an existing entity updates it, deleting a missing one returns `None`.
#[async_trait]
pub trait GatewayDataUpdater: Send + Sync {
    async fn on_channel_create(&self, shard: u32, channel: Channel) -> Result<Option<Channel>>;
    async fn on_channel_update(&self, shard: u32, channel: Channel) -> Result<Option<Channel>>;
    async fn on_channel_delete(&self, shard: u32, channel: Channel) -> Result<Option<Channel>>;

    async fn on_guild_create(&self, shard: u32, guild: GuildCreate) -> Result<Option<Guild>>;
    async fn on_guild_update(&self, shard: u32, guild: PartialGuild) -> Result<Option<Guild>>;
    async fn on_guild_delete(&self, shard: u32, guild: UnavailableGuild) -> Result<Option<Guild>>;
    async fn on_guild_emojis_update(
        &self,
        shard: u32,
        update: GuildEmojisUpdate,
    ) -> Result<Vec<Emoji>>;
    async fn on_guild_stickers_update(
        &self,
        shard: u32,
        update: GuildStickersUpdate,
    ) -> Result<Vec<Sticker>>;

    async fn on_guild_member_add(&self, shard: u32, member: Member) -> Result<Option<Member>>;
    async fn on_guild_member_remove(
        &self,
        shard: u32,
        remove: GuildMemberRemove,
    ) -> Result<Option<Member>>;
    /// Upserts each member. Never marks the member list complete.
    async fn on_guild_members_chunk(&self, shard: u32, chunk: GuildMembersChunk) -> Result<()>;
    async fn on_guild_member_update(
        &self,
        shard: u32,
        update: GuildMemberUpdate,
    ) -> Result<Option<Member>>;
    async fn on_guild_members_completion(
        &self,
        shard: u32,
        completion: GuildMembersCompletion,
    ) -> Result<()>;

    async fn on_guild_role_create(&self, shard: u32, role: GuildRole) -> Result<Option<Role>>;
    async fn on_guild_role_update(&self, shard: u32, role: GuildRole) -> Result<Option<Role>>;
    async fn on_guild_role_delete(&self, shard: u32, delete: GuildRoleDelete)
    -> Result<Option<Role>>;

    async fn on_scheduled_event_create(
        &self,
        shard: u32,
        event: ScheduledEvent,
    ) -> Result<Option<ScheduledEvent>>;
    async fn on_scheduled_event_update(
        &self,
        shard: u32,
        event: ScheduledEvent,
    ) -> Result<Option<ScheduledEvent>>;
    async fn on_scheduled_event_delete(
        &self,
        shard: u32,
        event: ScheduledEvent,
    ) -> Result<Option<ScheduledEvent>>;
    async fn on_scheduled_event_user_add(&self, shard: u32, user: ScheduledEventUser)
    -> Result<()>;
    async fn on_scheduled_event_user_remove(
        &self,
        shard: u32,
        user: ScheduledEventUser,
    ) -> Result<()>;

    async fn on_message_create(&self, shard: u32, message: Message) -> Result<Option<Message>>;
    async fn on_message_update(
        &self,
        shard: u32,
        message: PartialMessage,
    ) -> Result<Option<Message>>;
    async fn on_message_delete(&self, shard: u32, delete: MessageDelete)
    -> Result<Option<Message>>;
    async fn on_message_delete_bulk(
        &self,
        shard: u32,
        delete: MessageDeleteBulk,
    ) -> Result<Vec<Message>>;
    async fn on_message_reaction_add(
        &self,
        shard: u32,
        reaction: MessageReaction,
    ) -> Result<Option<Message>>;
    async fn on_message_reaction_remove(
        &self,
        shard: u32,
        reaction: MessageReaction,
    ) -> Result<Option<Message>>;
    async fn on_message_reaction_remove_all(
        &self,
        shard: u32,
        remove: MessageReactionRemoveAll,
    ) -> Result<Option<Message>>;
    async fn on_message_reaction_remove_emoji(
        &self,
        shard: u32,
        remove: MessageReactionRemoveEmoji,
    ) -> Result<Option<Message>>;

    /// Applies the embedded user delta and the presence as separate writes.
    async fn on_presence_update(
        &self,
        shard: u32,
        presence: Presence,
    ) -> Result<(Option<Presence>, Option<User>)>;
    async fn on_ready(&self, shard: u32, ready: Ready) -> Result<()>;
    async fn on_user_update(&self, shard: u32, user: User) -> Result<Option<User>>;
    async fn on_voice_state_update(
        &self,
        shard: u32,
        voice_state: VoiceState,
    ) -> Result<Option<VoiceState>>;

    async fn on_stage_instance_create(
        &self,
        shard: u32,
        stage: StageInstance,
    ) -> Result<Option<StageInstance>>;
    async fn on_stage_instance_update(
        &self,
        shard: u32,
        stage: StageInstance,
    ) -> Result<Option<StageInstance>>;
    async fn on_stage_instance_delete(
        &self,
        shard: u32,
        stage: StageInstance,
    ) -> Result<Option<StageInstance>>;

    async fn on_thread_create(&self, shard: u32, thread: Channel) -> Result<Option<Channel>>;
    async fn on_thread_update(&self, shard: u32, thread: Channel) -> Result<Option<Channel>>;
    async fn on_thread_delete(&self, shard: u32, delete: ThreadDelete) -> Result<Option<Channel>>;
    async fn on_thread_list_sync(&self, shard: u32, sync: ThreadListSync) -> Result<()>;
    async fn on_thread_member_update(
        &self,
        shard: u32,
        member: ThreadMember,
    ) -> Result<Option<ThreadMember>>;
    async fn on_thread_members_update(
        &self,
        shard: u32,
        update: ThreadMembersUpdate,
    ) -> Result<Vec<ThreadMember>>;

    /// Discard everything the shard's current session contributed.
    async fn on_shard_invalidation(
        &self,
        shard: u32,
        cause: InvalidationCause,
    ) -> Result<Invalidation>;
}

//! Entity records and gateway payloads for the shardcache store.
//!
//! Every record is a plain value. The store hands out owned snapshots and
//! never aliases its own state.
//!
//! ## Contents
//!
//! - **Entities**: guilds, channels, members, messages, roles, emojis,
//!   stickers, users, presences, voice states, thread members, scheduled
//!   events and stage instances
//! - **Payloads**: the per-notification records the store consumes
//! - **Field**: three-state presence for partial updates

mod channel;
mod event;
mod field;
mod guild;
mod member;
mod message;
mod presence;
mod session;
mod user;

/// Platform identifier. Every entity is keyed by one or two of these.
pub type Id = u64;

pub use channel::{
    Channel, ChannelKind, StageInstance, ThreadDelete, ThreadListSync, ThreadMember,
    ThreadMembersUpdate,
};
pub use event::{ScheduledEvent, ScheduledEventStatus, ScheduledEventUser};
pub use field::Field;
pub use guild::{
    Emoji, Guild, GuildCreate, GuildEmojisUpdate, GuildRole, GuildRoleDelete,
    GuildStickersUpdate, PartialGuild, Role, Sticker, UnavailableGuild,
};
pub use member::{
    GuildMemberRemove, GuildMemberUpdate, GuildMembersChunk, GuildMembersCompletion, Member,
};
pub use message::{
    EmojiKey, Message, MessageDelete, MessageDeleteBulk, MessageReaction,
    MessageReactionRemoveAll, MessageReactionRemoveEmoji, PartialMessage, Reaction,
    ReactionEmoji,
};
pub use presence::{Activity, Presence, Status, VoiceState};
pub use session::Ready;
pub use user::{PartialUser, User};

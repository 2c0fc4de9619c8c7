//! Ordered, hierarchical keys.
//!
//! A key is a table tag byte followed by big-endian `u64` segments, so the
//! byte order of two keys equals the tuple order of their segments and every
//! tuple prefix is a byte prefix. `[Member, guild]` scans all members of a
//! guild; `[Member]` scans all members.

use std::fmt;

use shardcache_model::Id;

/// Record tables in the key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Table {
    /// `[guild]` guild record.
    Guild = 1,
    /// `[channel]` channel or thread record.
    Channel = 2,
    /// `[guild, channel]` index of a guild's channels.
    GuildChannel = 3,
    /// `[guild, thread]` index of a guild's threads.
    GuildThread = 4,
    /// `[guild, role]`
    Role = 5,
    /// `[guild, emoji]`
    Emoji = 6,
    /// `[guild, sticker]`
    Sticker = 7,
    /// `[guild, user]`
    Member = 8,
    /// `[guild, user]`
    Presence = 9,
    /// `[guild, user]`
    VoiceState = 10,
    /// `[channel, message]`
    Message = 11,
    /// `[user]`
    User = 12,
    /// `[thread, user]`
    ThreadMember = 13,
    /// `[guild, event]`
    ScheduledEvent = 14,
    /// `[guild, event, user]`
    EventUser = 15,
    /// `[channel]`
    StageInstance = 16,
    /// `[guild]` member list completion marker.
    MemberList = 17,
    /// `[shard]` current generation of a shard.
    ShardGeneration = 18,
    /// `[]` the session user.
    SelfUser = 19,
}

impl Table {
    pub const ALL: [Table; 19] = [
        Table::Guild,
        Table::Channel,
        Table::GuildChannel,
        Table::GuildThread,
        Table::Role,
        Table::Emoji,
        Table::Sticker,
        Table::Member,
        Table::Presence,
        Table::VoiceState,
        Table::Message,
        Table::User,
        Table::ThreadMember,
        Table::ScheduledEvent,
        Table::EventUser,
        Table::StageInstance,
        Table::MemberList,
        Table::ShardGeneration,
        Table::SelfUser,
    ];

    /// Tables scoped under a guild id, removed together with the guild.
    pub const GUILD_SCOPED: [Table; 11] = [
        Table::GuildChannel,
        Table::GuildThread,
        Table::Role,
        Table::Emoji,
        Table::Sticker,
        Table::Member,
        Table::Presence,
        Table::VoiceState,
        Table::ScheduledEvent,
        Table::EventUser,
        Table::MemberList,
    ];

    /// Tables scoped under a channel id, removed together with the channel.
    pub const CHANNEL_SCOPED: [Table; 4] = [
        Table::Channel,
        Table::Message,
        Table::ThreadMember,
        Table::StageInstance,
    ];

    pub fn from_u8(v: u8) -> Option<Table> {
        Self::ALL.iter().copied().find(|t| *t as u8 == v)
    }

    /// Whether records in this table are stamped with the writing shard.
    /// Users and bookkeeping records are global.
    pub fn is_shard_owned(self) -> bool {
        !matches!(
            self,
            Table::User | Table::ShardGeneration | Table::SelfUser
        )
    }
}

/// A storage key. See the module docs for the layout.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn table(table: Table) -> Self {
        Key(vec![table as u8])
    }

    /// Append an id segment.
    pub fn push(mut self, id: Id) -> Self {
        self.0.extend_from_slice(&id.to_be_bytes());
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn table_tag(&self) -> Option<Table> {
        self.0.first().copied().and_then(Table::from_u8)
    }

    /// Number of id segments.
    pub fn len(&self) -> usize {
        self.0.len().saturating_sub(1) / 8
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The id segment at `index`.
    pub fn id_at(&self, index: usize) -> Option<Id> {
        let start = 1 + index * 8;
        let bytes = self.0.get(start..start + 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Some(Id::from_be_bytes(buf))
    }

    pub fn last_id(&self) -> Option<Id> {
        self.len().checked_sub(1).and_then(|i| self.id_at(i))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table_tag() {
            Some(table) => write!(f, "{:?}", table)?,
            None => write!(f, "?")?,
        }
        for i in 0..self.len() {
            if let Some(id) = self.id_at(i) {
                write!(f, "/{}", id)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Key constructors for every record kind.
pub mod keys {
    use super::{Key, Table};
    use shardcache_model::Id;

    pub fn guild(guild_id: Id) -> Key {
        Key::table(Table::Guild).push(guild_id)
    }

    pub fn channel(channel_id: Id) -> Key {
        Key::table(Table::Channel).push(channel_id)
    }

    pub fn guild_channel(guild_id: Id, channel_id: Id) -> Key {
        Key::table(Table::GuildChannel).push(guild_id).push(channel_id)
    }

    pub fn guild_thread(guild_id: Id, thread_id: Id) -> Key {
        Key::table(Table::GuildThread).push(guild_id).push(thread_id)
    }

    pub fn role(guild_id: Id, role_id: Id) -> Key {
        Key::table(Table::Role).push(guild_id).push(role_id)
    }

    pub fn emoji(guild_id: Id, emoji_id: Id) -> Key {
        Key::table(Table::Emoji).push(guild_id).push(emoji_id)
    }

    pub fn sticker(guild_id: Id, sticker_id: Id) -> Key {
        Key::table(Table::Sticker).push(guild_id).push(sticker_id)
    }

    pub fn member(guild_id: Id, user_id: Id) -> Key {
        Key::table(Table::Member).push(guild_id).push(user_id)
    }

    pub fn presence(guild_id: Id, user_id: Id) -> Key {
        Key::table(Table::Presence).push(guild_id).push(user_id)
    }

    pub fn voice_state(guild_id: Id, user_id: Id) -> Key {
        Key::table(Table::VoiceState).push(guild_id).push(user_id)
    }

    pub fn message(channel_id: Id, message_id: Id) -> Key {
        Key::table(Table::Message).push(channel_id).push(message_id)
    }

    pub fn user(user_id: Id) -> Key {
        Key::table(Table::User).push(user_id)
    }

    pub fn thread_member(thread_id: Id, user_id: Id) -> Key {
        Key::table(Table::ThreadMember).push(thread_id).push(user_id)
    }

    pub fn scheduled_event(guild_id: Id, event_id: Id) -> Key {
        Key::table(Table::ScheduledEvent).push(guild_id).push(event_id)
    }

    pub fn event_user(guild_id: Id, event_id: Id, user_id: Id) -> Key {
        Key::table(Table::EventUser)
            .push(guild_id)
            .push(event_id)
            .push(user_id)
    }

    pub fn stage_instance(channel_id: Id) -> Key {
        Key::table(Table::StageInstance).push(channel_id)
    }

    pub fn member_list(guild_id: Id) -> Key {
        Key::table(Table::MemberList).push(guild_id)
    }

    pub fn shard_generation(shard: u32) -> Key {
        Key::table(Table::ShardGeneration).push(u64::from(shard))
    }

    pub fn self_user() -> Key {
        Key::table(Table::SelfUser)
    }

    /// Prefix of every record in `table` scoped under `parent`.
    pub fn scoped(table: Table, parent: Id) -> Key {
        Key::table(table).push(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_order_matches_tuple_order() {
        let a = keys::member(1, 500);
        let b = keys::member(2, 3);
        let c = keys::member(1, 256);
        assert!(c < a);
        assert!(a < b);
    }

    #[test]
    fn test_prefix_scoping() {
        let prefix = keys::scoped(Table::Member, 1);
        assert!(keys::member(1, 10).starts_with(&prefix));
        assert!(!keys::member(2, 10).starts_with(&prefix));
        assert!(!keys::presence(1, 10).starts_with(&prefix));
    }

    #[test]
    fn test_segments() {
        let key = keys::event_user(1, 2, 3);
        assert_eq!(key.len(), 3);
        assert_eq!(key.table_tag(), Some(Table::EventUser));
        assert_eq!(key.id_at(1), Some(2));
        assert_eq!(key.last_id(), Some(3));
        assert_eq!(key.id_at(3), None);
        assert_eq!(format!("{}", key), "EventUser/1/2/3");
        assert!(keys::self_user().is_empty());
    }
}

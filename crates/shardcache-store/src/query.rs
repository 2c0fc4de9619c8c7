//! Read actions.

use std::fmt;

use serde::{Deserialize, Serialize};
use shardcache_model::Id;

use crate::config::StoreFlag;

/// Entity kinds that can be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Channel,
    Emoji,
    Guild,
    Member,
    Message,
    Presence,
    Role,
    User,
    VoiceState,
    Sticker,
    ScheduledEvent,
    EventUser,
    ThreadMember,
    StageInstance,
}

impl EntityKind {
    pub const ALL: [EntityKind; 14] = [
        EntityKind::Channel,
        EntityKind::Emoji,
        EntityKind::Guild,
        EntityKind::Member,
        EntityKind::Message,
        EntityKind::Presence,
        EntityKind::Role,
        EntityKind::User,
        EntityKind::VoiceState,
        EntityKind::Sticker,
        EntityKind::ScheduledEvent,
        EntityKind::EventUser,
        EntityKind::ThreadMember,
        EntityKind::StageInstance,
    ];

    /// Category whose flag gates reads of this kind.
    pub fn flag(self) -> StoreFlag {
        match self {
            EntityKind::Channel => StoreFlag::Channel,
            EntityKind::Emoji => StoreFlag::Emoji,
            EntityKind::Guild => StoreFlag::Guild,
            EntityKind::Member => StoreFlag::Member,
            EntityKind::Message => StoreFlag::Message,
            EntityKind::Presence => StoreFlag::Presence,
            EntityKind::Role => StoreFlag::Role,
            EntityKind::User => StoreFlag::User,
            EntityKind::VoiceState => StoreFlag::VoiceState,
            EntityKind::Sticker => StoreFlag::Sticker,
            EntityKind::ScheduledEvent | EntityKind::EventUser => StoreFlag::ScheduledEvent,
            EntityKind::ThreadMember => StoreFlag::Thread,
            EntityKind::StageInstance => StoreFlag::StageInstance,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Channel => "channel",
            EntityKind::Emoji => "emoji",
            EntityKind::Guild => "guild",
            EntityKind::Member => "member",
            EntityKind::Message => "message",
            EntityKind::Presence => "presence",
            EntityKind::Role => "role",
            EntityKind::User => "user",
            EntityKind::VoiceState => "voice_state",
            EntityKind::Sticker => "sticker",
            EntityKind::ScheduledEvent => "scheduled_event",
            EntityKind::EventUser => "event_user",
            EntityKind::ThreadMember => "thread_member",
            EntityKind::StageInstance => "stage_instance",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Restricts a listing or count to one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    All,
    Guild {
        guild_id: Id,
    },
    Channel {
        channel_id: Id,
    },
    /// A voice channel inside a guild.
    GuildChannel {
        guild_id: Id,
        channel_id: Id,
    },
    ScheduledEvent {
        guild_id: Id,
        event_id: Id,
    },
    Thread {
        thread_id: Id,
    },
}

/// A read against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    Count {
        entity: EntityKind,
        #[serde(default)]
        scope: Scope,
    },
    /// Member count that fails unless the member list is complete.
    CountExactMembers { guild_id: Id },
    List {
        entity: EntityKind,
        #[serde(default)]
        scope: Scope,
    },
    /// Member listing that fails unless the member list is complete.
    ListExactMembers { guild_id: Id },
    /// Point lookup. `parent_id` is the guild, channel or thread the entity
    /// is keyed under, where it has one.
    Get {
        entity: EntityKind,
        #[serde(default)]
        parent_id: Option<Id>,
        id: Id,
    },
}

impl Query {
    pub fn count(entity: EntityKind, scope: Scope) -> Self {
        Query::Count { entity, scope }
    }

    pub fn list(entity: EntityKind, scope: Scope) -> Self {
        Query::List { entity, scope }
    }

    pub fn get(entity: EntityKind, id: Id) -> Self {
        Query::Get {
            entity,
            parent_id: None,
            id,
        }
    }

    pub fn get_in(entity: EntityKind, parent_id: Id, id: Id) -> Self {
        Query::Get {
            entity,
            parent_id: Some(parent_id),
            id,
        }
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            Query::Count { entity, .. } | Query::List { entity, .. } | Query::Get { entity, .. } => {
                *entity
            }
            Query::CountExactMembers { .. } | Query::ListExactMembers { .. } => EntityKind::Member,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_query_json() {
        let query: Query = serde_json::from_str(
            r#"{"count":{"entity":"voice_state","scope":{"guild_channel":{"guild_id":1,"channel_id":2}}}}"#,
        )
        .unwrap();
        assert_eq!(
            query,
            Query::count(
                EntityKind::VoiceState,
                Scope::GuildChannel {
                    guild_id: 1,
                    channel_id: 2
                }
            )
        );

        let query: Query = serde_json::from_str(r#"{"list":{"entity":"guild"}}"#).unwrap();
        assert_eq!(query, Query::list(EntityKind::Guild, Scope::All));
    }

    #[test]
    fn test_exact_queries_read_members() {
        assert_eq!(
            Query::ListExactMembers { guild_id: 3 }.entity(),
            EntityKind::Member
        );
        assert_eq!(EntityKind::EventUser.flag(), StoreFlag::ScheduledEvent);
    }
}

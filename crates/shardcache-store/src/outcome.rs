//! Results of executed actions.

use std::fmt;

use futures_util::TryStreamExt;
use serde::Serialize;
use shardcache_model::{
    Channel, Emoji, Guild, Id, Member, Message, Presence, Role, ScheduledEvent, StageInstance,
    Sticker, ThreadMember, User, VoiceState,
};

use crate::error::Result;
use crate::repo::EntityStream;
use crate::updater::Invalidation;

/// An owned copy of one stored entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity", content = "value", rename_all = "snake_case")]
pub enum Snapshot {
    Channel(Channel),
    Emoji(Emoji),
    Guild(Guild),
    Member(Member),
    Message(Message),
    Presence(Presence),
    Role(Role),
    User(User),
    VoiceState(VoiceState),
    Sticker(Sticker),
    ScheduledEvent(ScheduledEvent),
    /// Id of a user interested in a scheduled event.
    EventUser(Id),
    ThreadMember(ThreadMember),
    StageInstance(StageInstance),
}

macro_rules! snapshot_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Snapshot {
                fn from(value: $variant) -> Self {
                    Snapshot::$variant(value)
                }
            }
        )*
    };
}

snapshot_from!(
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
    ThreadMember,
    StageInstance,
);

impl From<Id> for Snapshot {
    fn from(user_id: Id) -> Self {
        Snapshot::EventUser(user_id)
    }
}

/// What an executed action produced.
pub enum Outcome {
    /// Applied; nothing to report.
    Done,
    /// The action's category is disabled and nothing was touched.
    Skipped,
    /// The state the update replaced.
    Previous(Option<Snapshot>),
    /// The states a multi-entity update replaced.
    PreviousMany(Vec<Snapshot>),
    /// Previous presence and previous user of a presence update.
    PresenceAndUser {
        presence: Option<Presence>,
        user: Option<User>,
    },
    /// A shard invalidation. `generation` is `None` when the cause was
    /// filtered out and state was kept.
    Invalidated { shard: u32, generation: Option<u64> },
    Count(u64),
    Entity(Option<Snapshot>),
    Entities(EntityStream<Snapshot>),
    /// Result of a custom action.
    Custom(serde_json::Value),
}

impl Outcome {
    pub fn count(&self) -> Option<u64> {
        match self {
            Outcome::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }

    /// Drain an `Entities` outcome. Other outcomes yield `None`.
    pub async fn collect(self) -> Result<Option<Vec<Snapshot>>> {
        match self {
            Outcome::Entities(stream) => Ok(Some(stream.try_collect().await?)),
            _ => Ok(None),
        }
    }

    pub fn into_entity(self) -> Option<Snapshot> {
        match self {
            Outcome::Entity(entity) => entity,
            _ => None,
        }
    }

    pub fn into_previous(self) -> Option<Snapshot> {
        match self {
            Outcome::Previous(previous) => previous,
            _ => None,
        }
    }

    pub fn into_custom(self) -> Option<serde_json::Value> {
        match self {
            Outcome::Custom(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done => f.write_str("Done"),
            Outcome::Skipped => f.write_str("Skipped"),
            Outcome::Previous(p) => f.debug_tuple("Previous").field(p).finish(),
            Outcome::PreviousMany(p) => f.debug_tuple("PreviousMany").field(p).finish(),
            Outcome::PresenceAndUser { presence, user } => f
                .debug_struct("PresenceAndUser")
                .field("presence", presence)
                .field("user", user)
                .finish(),
            Outcome::Invalidated { shard, generation } => f
                .debug_struct("Invalidated")
                .field("shard", shard)
                .field("generation", generation)
                .finish(),
            Outcome::Count(n) => f.debug_tuple("Count").field(n).finish(),
            Outcome::Entity(e) => f.debug_tuple("Entity").field(e).finish(),
            Outcome::Entities(_) => f.write_str("Entities(..)"),
            Outcome::Custom(v) => f.debug_tuple("Custom").field(v).finish(),
        }
    }
}

/// Conversion from an updater method's return value.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome {
        Outcome::Done
    }
}

impl<T: Into<Snapshot>> IntoOutcome for Option<T> {
    fn into_outcome(self) -> Outcome {
        Outcome::Previous(self.map(Into::into))
    }
}

impl<T: Into<Snapshot>> IntoOutcome for Vec<T> {
    fn into_outcome(self) -> Outcome {
        Outcome::PreviousMany(self.into_iter().map(Into::into).collect())
    }
}

impl IntoOutcome for (Option<Presence>, Option<User>) {
    fn into_outcome(self) -> Outcome {
        Outcome::PresenceAndUser {
            presence: self.0,
            user: self.1,
        }
    }
}

impl IntoOutcome for Invalidation {
    fn into_outcome(self) -> Outcome {
        Outcome::Invalidated {
            shard: self.shard,
            generation: self.generation,
        }
    }
}

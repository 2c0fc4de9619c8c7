//! Guild records and guild-level payloads.

use serde::{Deserialize, Serialize};

use crate::{Channel, Field, Id, Member, Presence, ScheduledEvent, StageInstance, VoiceState};

/// A guild snapshot.
///
/// The id lists and `member_list_complete` are derived from the store when a
/// guild is read; they are never persisted inside the guild record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Id,
    pub name: String,
    pub owner_id: Id,
    #[serde(default)]
    pub icon: Option<String>,
    /// Member count as reported by the platform. Independent of `members.len()`.
    #[serde(default)]
    pub member_count: u64,
    #[serde(default)]
    pub members: Vec<Id>,
    #[serde(default)]
    pub channels: Vec<Id>,
    #[serde(default)]
    pub roles: Vec<Id>,
    #[serde(default)]
    pub emojis: Vec<Id>,
    #[serde(default)]
    pub stickers: Vec<Id>,
    #[serde(default)]
    pub member_list_complete: bool,
}

/// Full guild snapshot delivered when a guild becomes available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildCreate {
    pub id: Id,
    pub name: String,
    pub owner_id: Id,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub member_count: u64,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub emojis: Vec<Emoji>,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub threads: Vec<Channel>,
    #[serde(default)]
    pub presences: Vec<Presence>,
    #[serde(default)]
    pub voice_states: Vec<VoiceState>,
    #[serde(default, rename = "guild_scheduled_events")]
    pub scheduled_events: Vec<ScheduledEvent>,
    #[serde(default)]
    pub stage_instances: Vec<StageInstance>,
}

impl GuildCreate {
    /// The guild record itself, without children.
    pub fn guild(&self) -> Guild {
        Guild {
            id: self.id,
            name: self.name.clone(),
            owner_id: self.owner_id,
            icon: self.icon.clone(),
            member_count: self.member_count,
            members: Vec::new(),
            channels: Vec::new(),
            roles: Vec::new(),
            emojis: Vec::new(),
            stickers: Vec::new(),
            member_list_complete: false,
        }
    }
}

/// Changed guild fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartialGuild {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub owner_id: Field<Id>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub icon: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub member_count: Field<u64>,
}

impl PartialGuild {
    pub fn merge_into(self, guild: Guild) -> Guild {
        Guild {
            name: self.name.merge_required(guild.name),
            owner_id: self.owner_id.merge_required(guild.owner_id),
            icon: self.icon.merge(guild.icon),
            member_count: self.member_count.merge_required(guild.member_count),
            ..guild
        }
    }
}

/// A guild that was removed or became unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: Id,
    #[serde(default)]
    pub unavailable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub permissions: String,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub mentionable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub id: Id,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<Id>,
    #[serde(default)]
    pub animated: bool,
    #[serde(default)]
    pub managed: bool,
    #[serde(default = "default_true")]
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sticker {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub format_type: u8,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

/// Replacement emoji set for a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildEmojisUpdate {
    pub guild_id: Id,
    pub emojis: Vec<Emoji>,
}

/// Replacement sticker set for a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildStickersUpdate {
    pub guild_id: Id,
    pub stickers: Vec<Sticker>,
}

/// Role create and update payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRole {
    pub guild_id: Id,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRoleDelete {
    pub guild_id: Id,
    pub role_id: Id,
}

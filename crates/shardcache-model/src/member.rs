//! Guild members and member payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Field, Id, User};

/// A guild member, keyed by `(guild_id, user.id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Filled in by the store when the member arrives inside a guild payload.
    #[serde(default)]
    pub guild_id: Id,
    pub user: User,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Id>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub premium_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending: bool,
}

impl Member {
    pub fn user_id(&self) -> Id {
        self.user.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMemberRemove {
    pub guild_id: Id,
    pub user: User,
}

/// One page of a requested member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMembersChunk {
    pub guild_id: Id,
    pub members: Vec<Member>,
    #[serde(default)]
    pub chunk_index: u32,
    #[serde(default = "one")]
    pub chunk_count: u32,
    #[serde(default)]
    pub not_found: Vec<Id>,
}

fn one() -> u32 {
    1
}

/// Member fields that changed. Roles and user are always sent in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMemberUpdate {
    pub guild_id: Id,
    pub user: User,
    pub roles: Vec<Id>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub nick: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub joined_at: Field<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub premium_since: Field<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub pending: Field<bool>,
}

impl GuildMemberUpdate {
    pub fn merge_into(self, member: Member) -> Member {
        Member {
            guild_id: member.guild_id,
            user: self.user,
            nick: self.nick.merge(member.nick),
            roles: self.roles,
            joined_at: self.joined_at.merge(member.joined_at),
            premium_since: self.premium_since.merge(member.premium_since),
            pending: self.pending.merge_required(member.pending),
        }
    }
}

/// Signal that every member of a guild has been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMembersCompletion {
    pub guild_id: Id,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_member_update_merge() {
        let member: Member = serde_json::from_str(
            r#"{"guild_id":1,"user":{"id":10,"username":"a"},"nick":"old","roles":[3],"pending":true}"#,
        )
        .unwrap();
        let update: GuildMemberUpdate = serde_json::from_str(
            r#"{"guild_id":1,"user":{"id":10,"username":"b"},"roles":[4,5],"nick":null}"#,
        )
        .unwrap();
        let merged = update.merge_into(member);
        assert_eq!(merged.nick, None);
        assert_eq!(merged.roles, vec![4, 5]);
        assert_eq!(merged.user.username, "b");
        assert!(merged.pending);
    }
}

//! Messages, reactions and message payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Field, Id, User};

/// A message, keyed by `(channel_id, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Id,
    pub channel_id: Id,
    #[serde(default)]
    pub guild_id: Option<Id>,
    pub author: User,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub edited_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

/// Emoji as it appears on a reaction. Custom emojis have an id, unicode
/// emojis only a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEmoji {
    #[serde(default)]
    pub id: Option<Id>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

impl ReactionEmoji {
    pub fn unicode(name: impl Into<String>) -> Self {
        ReactionEmoji {
            id: None,
            name: Some(name.into()),
            animated: false,
        }
    }

    pub fn key(&self) -> EmojiKey {
        match self.id {
            Some(id) => EmojiKey::Custom(id),
            None => EmojiKey::Unicode(self.name.clone().unwrap_or_default()),
        }
    }
}

/// Identity of a reaction emoji. Custom emojis compare by id, unicode
/// emojis by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmojiKey {
    Custom(Id),
    Unicode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: ReactionEmoji,
    pub count: u32,
    /// Whether the session user reacted.
    #[serde(default)]
    pub me: bool,
}

/// Changed message fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialMessage {
    pub id: Id,
    pub channel_id: Id,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub guild_id: Field<Id>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub content: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub edited_timestamp: Field<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub pinned: Field<bool>,
}

impl PartialMessage {
    pub fn merge_into(self, message: Message) -> Message {
        Message {
            guild_id: self.guild_id.merge(message.guild_id),
            content: self.content.merge_required(message.content),
            edited_timestamp: self.edited_timestamp.merge(message.edited_timestamp),
            pinned: self.pinned.merge_required(message.pinned),
            ..message
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelete {
    pub id: Id,
    pub channel_id: Id,
    #[serde(default)]
    pub guild_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeleteBulk {
    pub ids: Vec<Id>,
    pub channel_id: Id,
    #[serde(default)]
    pub guild_id: Option<Id>,
}

/// A single user adding or removing a reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReaction {
    pub user_id: Id,
    pub channel_id: Id,
    pub message_id: Id,
    #[serde(default)]
    pub guild_id: Option<Id>,
    pub emoji: ReactionEmoji,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReactionRemoveAll {
    pub channel_id: Id,
    pub message_id: Id,
    #[serde(default)]
    pub guild_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReactionRemoveEmoji {
    pub channel_id: Id,
    pub message_id: Id,
    #[serde(default)]
    pub guild_id: Option<Id>,
    pub emoji: ReactionEmoji,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emoji_key_identity() {
        let custom = ReactionEmoji {
            id: Some(9),
            name: Some("blob".into()),
            animated: false,
        };
        let renamed = ReactionEmoji {
            name: Some("blobby".into()),
            ..custom.clone()
        };
        assert_eq!(custom.key(), renamed.key());
        assert_eq!(
            ReactionEmoji::unicode("❤").key(),
            EmojiKey::Unicode("❤".into())
        );
        assert_ne!(ReactionEmoji::unicode("❤").key(), custom.key());
    }

    #[test]
    fn test_partial_message_merge() {
        let message: Message = serde_json::from_str(
            r#"{"id":100,"channel_id":5,"author":{"id":7,"username":"a"},"content":"hi","timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let edit: PartialMessage = serde_json::from_str(
            r#"{"id":100,"channel_id":5,"content":"hello","edited_timestamp":"2024-01-01T00:01:00Z"}"#,
        )
        .unwrap();
        let merged = edit.merge_into(message);
        assert_eq!(merged.content, "hello");
        assert!(merged.edited_timestamp.is_some());
        assert!(!merged.pinned);
    }
}

//! Global user records.

use serde::{Deserialize, Serialize};

use crate::{Field, Id};

/// A user, keyed globally by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

/// User fields embedded in presence updates. Only changed fields are sent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartialUser {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub username: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub discriminator: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub global_name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub avatar: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub bot: Field<bool>,
}

impl PartialUser {
    /// Whether the delta changes nothing besides the id.
    pub fn is_empty(&self) -> bool {
        self.username.is_unset()
            && self.discriminator.is_unset()
            && self.global_name.is_unset()
            && self.avatar.is_unset()
            && self.bot.is_unset()
    }

    /// Apply this delta over a stored user.
    pub fn merge_into(self, user: User) -> User {
        User {
            id: user.id,
            username: self.username.merge_required(user.username),
            discriminator: self.discriminator.merge(user.discriminator),
            global_name: self.global_name.merge(user.global_name),
            avatar: self.avatar.merge(user.avatar),
            bot: self.bot.merge_required(user.bot),
        }
    }

    /// Build a full user when the delta carries enough fields to stand alone.
    pub fn into_user(self) -> Option<User> {
        let username = self.username.value()?;
        Some(User {
            id: self.id,
            username,
            discriminator: self.discriminator.value(),
            global_name: self.global_name.value(),
            avatar: self.avatar.value(),
            bot: self.bot.value().unwrap_or(false),
        })
    }
}

impl From<&User> for PartialUser {
    fn from(user: &User) -> Self {
        PartialUser {
            id: user.id,
            username: Field::Value(user.username.clone()),
            discriminator: user.discriminator.clone().into(),
            global_name: user.global_name.clone().into(),
            avatar: user.avatar.clone().into(),
            bot: Field::Value(user.bot),
        }
    }
}

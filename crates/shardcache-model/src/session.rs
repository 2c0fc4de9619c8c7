//! Session handshake payload.

use serde::{Deserialize, Serialize};

use crate::{UnavailableGuild, User};

/// First dispatch of a session. Carries the session user and the guilds the
/// shard will deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {
    pub user: User,
    pub session_id: String,
    /// `[shard_id, shard_count]`.
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
}

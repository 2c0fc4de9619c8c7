//! Scheduled events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledEventStatus {
    #[default]
    Scheduled,
    Active,
    Completed,
    Canceled,
}

/// A scheduled event, keyed by `(guild_id, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub id: Id,
    pub guild_id: Id,
    #[serde(default)]
    pub channel_id: Option<Id>,
    #[serde(default)]
    pub creator_id: Option<Id>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub scheduled_start_time: DateTime<Utc>,
    #[serde(default)]
    pub scheduled_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ScheduledEventStatus,
    #[serde(default)]
    pub user_count: Option<u64>,
}

/// A user subscribing to or unsubscribing from a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEventUser {
    pub guild_id: Id,
    #[serde(rename = "guild_scheduled_event_id")]
    pub event_id: Id,
    pub user_id: Id,
}

//! Store configuration.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tracker::InvalidationCause;

/// Built-in update categories that can be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFlag {
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
    Thread,
    StageInstance,
}

impl StoreFlag {
    pub const ALL: [StoreFlag; 13] = [
        StoreFlag::Channel,
        StoreFlag::Emoji,
        StoreFlag::Guild,
        StoreFlag::Member,
        StoreFlag::Message,
        StoreFlag::Presence,
        StoreFlag::Role,
        StoreFlag::User,
        StoreFlag::VoiceState,
        StoreFlag::Sticker,
        StoreFlag::ScheduledEvent,
        StoreFlag::Thread,
        StoreFlag::StageInstance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StoreFlag::Channel => "channel",
            StoreFlag::Emoji => "emoji",
            StoreFlag::Guild => "guild",
            StoreFlag::Member => "member",
            StoreFlag::Message => "message",
            StoreFlag::Presence => "presence",
            StoreFlag::Role => "role",
            StoreFlag::User => "user",
            StoreFlag::VoiceState => "voice_state",
            StoreFlag::Sticker => "sticker",
            StoreFlag::ScheduledEvent => "scheduled_event",
            StoreFlag::Thread => "thread",
            StoreFlag::StageInstance => "stage_instance",
        }
    }
}

impl fmt::Display for StoreFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StoreFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        StoreFlag::ALL
            .into_iter()
            .find(|f| f.name() == normalized)
            .ok_or_else(|| format!("unknown store flag '{}'", s))
    }
}

/// One switch per built-in update category. All enabled by default.
///
/// A disabled category's updates are acknowledged without touching state,
/// and its reads report empty results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreFlags {
    pub channel: bool,
    pub emoji: bool,
    pub guild: bool,
    pub member: bool,
    pub message: bool,
    pub presence: bool,
    pub role: bool,
    pub user: bool,
    pub voice_state: bool,
    pub sticker: bool,
    pub scheduled_event: bool,
    pub thread: bool,
    pub stage_instance: bool,
}

impl Default for StoreFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl StoreFlags {
    pub fn all() -> Self {
        Self::uniform(true)
    }

    pub fn none() -> Self {
        Self::uniform(false)
    }

    fn uniform(on: bool) -> Self {
        Self {
            channel: on,
            emoji: on,
            guild: on,
            member: on,
            message: on,
            presence: on,
            role: on,
            user: on,
            voice_state: on,
            sticker: on,
            scheduled_event: on,
            thread: on,
            stage_instance: on,
        }
    }

    fn slot(&mut self, flag: StoreFlag) -> &mut bool {
        match flag {
            StoreFlag::Channel => &mut self.channel,
            StoreFlag::Emoji => &mut self.emoji,
            StoreFlag::Guild => &mut self.guild,
            StoreFlag::Member => &mut self.member,
            StoreFlag::Message => &mut self.message,
            StoreFlag::Presence => &mut self.presence,
            StoreFlag::Role => &mut self.role,
            StoreFlag::User => &mut self.user,
            StoreFlag::VoiceState => &mut self.voice_state,
            StoreFlag::Sticker => &mut self.sticker,
            StoreFlag::ScheduledEvent => &mut self.scheduled_event,
            StoreFlag::Thread => &mut self.thread,
            StoreFlag::StageInstance => &mut self.stage_instance,
        }
    }

    pub fn is_enabled(&self, flag: StoreFlag) -> bool {
        match flag {
            StoreFlag::Channel => self.channel,
            StoreFlag::Emoji => self.emoji,
            StoreFlag::Guild => self.guild,
            StoreFlag::Member => self.member,
            StoreFlag::Message => self.message,
            StoreFlag::Presence => self.presence,
            StoreFlag::Role => self.role,
            StoreFlag::User => self.user,
            StoreFlag::VoiceState => self.voice_state,
            StoreFlag::Sticker => self.sticker,
            StoreFlag::ScheduledEvent => self.scheduled_event,
            StoreFlag::Thread => self.thread,
            StoreFlag::StageInstance => self.stage_instance,
        }
    }

    /// Builder-style toggle.
    pub fn with(mut self, flag: StoreFlag, enabled: bool) -> Self {
        *self.slot(flag) = enabled;
        self
    }

    pub fn disabled(&self) -> Vec<StoreFlag> {
        StoreFlag::ALL
            .into_iter()
            .filter(|f| !self.is_enabled(*f))
            .collect()
    }
}

/// Runtime configuration for a key-value store layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub flags: StoreFlags,
    /// Causes that discard a shard's state. Other causes only mark the
    /// shard invalidated.
    pub invalidation_filter: BTreeSet<InvalidationCause>,
    /// Entries fetched per backend scan.
    pub scan_page_size: usize,
    /// Sweep invalidated shards on a spawned task instead of inline.
    pub background_sweep: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            flags: StoreFlags::default(),
            invalidation_filter: InvalidationCause::all(),
            scan_page_size: 256,
            background_sweep: true,
        }
    }
}

impl StoreConfig {
    pub fn with_flags(mut self, flags: StoreFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_invalidation_filter(
        mut self,
        causes: impl IntoIterator<Item = InvalidationCause>,
    ) -> Self {
        self.invalidation_filter = causes.into_iter().collect();
        self
    }

    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = size.max(1);
        self
    }

    pub fn with_background_sweep(mut self, background: bool) -> Self {
        self.background_sweep = background;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_default_all_enabled() {
        let flags = StoreFlags::default();
        assert!(StoreFlag::ALL.iter().all(|f| flags.is_enabled(*f)));
        assert!(flags.disabled().is_empty());
    }

    #[test]
    fn test_flags_toggle() {
        let flags = StoreFlags::all().with(StoreFlag::Presence, false);
        assert!(!flags.is_enabled(StoreFlag::Presence));
        assert!(flags.is_enabled(StoreFlag::Member));
        assert_eq!(flags.disabled(), vec![StoreFlag::Presence]);
    }

    #[test]
    fn test_flag_parsing() {
        assert_eq!("voice-state".parse::<StoreFlag>(), Ok(StoreFlag::VoiceState));
        assert_eq!("Presence".parse::<StoreFlag>(), Ok(StoreFlag::Presence));
        assert!("bogus".parse::<StoreFlag>().is_err());
    }

    #[test]
    fn test_partial_config_json() {
        let config: StoreConfig = serde_json::from_str(
            r#"{"flags":{"presence":false},"invalidation_filter":["LOGOUT"]}"#,
        )
        .unwrap();
        assert!(!config.flags.presence);
        assert!(config.flags.member);
        assert_eq!(
            config.invalidation_filter.into_iter().collect::<Vec<_>>(),
            vec![InvalidationCause::Logout]
        );
        assert_eq!(config.scan_page_size, 256);
        assert!(config.background_sweep);
    }
}

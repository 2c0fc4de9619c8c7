//! Actions the store executes, and the gateway dispatch table.
//!
//! Every gateway notification category is declared once in the
//! `define_gateway_dispatch!` invocation below. The macro generates:
//! - `Dispatch` - the wire form, adjacently tagged as `{"t": NAME, "d": payload}`
//! - `GatewayKind` - a payload-free tag per category, used as a routing key
//! - `apply_dispatch()` - routes a payload to its `GatewayDataUpdater` method
//!
//! # Adding a Notification Category
//!
//! 1. Add the payload record to `shardcache-model` and export it.
//! 2. Add a method to `GatewayDataUpdater` taking `(shard, payload)`. Its
//!    return type must implement `IntoOutcome`.
//! 3. Add one line to the invocation below:
//!
//! ```ignore
//! MyThingCreate(MyThing) => "MY_THING_CREATE", Some(StoreFlag::MyThing), on_my_thing_create;
//! ```
//!
//! The flag is the category that switches the handler off, or `None` for
//! notifications that are always handled.

use std::fmt;

use serde::{Deserialize, Serialize};
use shardcache_model::{
    Channel, GuildCreate, GuildEmojisUpdate, GuildMemberRemove, GuildMemberUpdate,
    GuildMembersChunk, GuildMembersCompletion, GuildRole, GuildRoleDelete, GuildStickersUpdate,
    Member, Message, MessageDelete, MessageDeleteBulk, MessageReaction, MessageReactionRemoveAll,
    MessageReactionRemoveEmoji, PartialGuild, PartialMessage, Presence, Ready, ScheduledEvent,
    ScheduledEventUser, StageInstance, ThreadDelete, ThreadListSync, ThreadMember,
    ThreadMembersUpdate, UnavailableGuild, User, VoiceState,
};

use crate::config::StoreFlag;
use crate::error::Result;
use crate::outcome::{IntoOutcome, Outcome};
use crate::query::{EntityKind, Query};
use crate::tracker::InvalidationCause;
use crate::updater::GatewayDataUpdater;

/// Define the gateway dispatch table.
///
/// # Syntax
///
/// ```ignore
/// define_gateway_dispatch! {
///     Variant(PayloadType) => "WIRE_NAME", flag_expr, updater_method;
/// }
/// ```
macro_rules! define_gateway_dispatch {
    (
        $( $variant:ident($payload:ty) => $wire:tt, $flag:expr, $method:ident; )*
    ) => {
        /// A gateway notification with its payload.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "t", content = "d")]
        pub enum Dispatch {
            $(
                #[serde(rename = $wire)]
                $variant($payload),
            )*
        }

        /// Notification category, without payload.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum GatewayKind {
            $( $variant, )*
        }

        impl GatewayKind {
            pub const ALL: &'static [GatewayKind] = &[ $( GatewayKind::$variant, )* ];

            /// Wire name, e.g. `GUILD_CREATE`.
            pub fn name(self) -> &'static str {
                match self {
                    $( GatewayKind::$variant => $wire, )*
                }
            }

            /// Category that disables this notification, if any.
            pub fn flag(self) -> Option<StoreFlag> {
                match self {
                    $( GatewayKind::$variant => $flag, )*
                }
            }
        }

        impl Dispatch {
            pub fn kind(&self) -> GatewayKind {
                match self {
                    $( Dispatch::$variant(_) => GatewayKind::$variant, )*
                }
            }
        }

        /// Route a notification to its updater method.
        pub async fn apply_dispatch(
            updater: &dyn GatewayDataUpdater,
            shard: u32,
            dispatch: Dispatch,
        ) -> Result<Outcome> {
            match dispatch {
                $(
                    Dispatch::$variant(payload) => updater
                        .$method(shard, payload)
                        .await
                        .map(IntoOutcome::into_outcome),
                )*
            }
        }
    };
}

define_gateway_dispatch! {
    ChannelCreate(Channel) => "CHANNEL_CREATE", Some(StoreFlag::Channel), on_channel_create;
    ChannelUpdate(Channel) => "CHANNEL_UPDATE", Some(StoreFlag::Channel), on_channel_update;
    ChannelDelete(Channel) => "CHANNEL_DELETE", Some(StoreFlag::Channel), on_channel_delete;

    GuildCreate(GuildCreate) => "GUILD_CREATE", Some(StoreFlag::Guild), on_guild_create;
    GuildUpdate(PartialGuild) => "GUILD_UPDATE", Some(StoreFlag::Guild), on_guild_update;
    GuildDelete(UnavailableGuild) => "GUILD_DELETE", Some(StoreFlag::Guild), on_guild_delete;
    GuildEmojisUpdate(GuildEmojisUpdate) => "GUILD_EMOJIS_UPDATE", Some(StoreFlag::Emoji), on_guild_emojis_update;
    GuildStickersUpdate(GuildStickersUpdate) => "GUILD_STICKERS_UPDATE", Some(StoreFlag::Sticker), on_guild_stickers_update;

    GuildMemberAdd(Member) => "GUILD_MEMBER_ADD", Some(StoreFlag::Member), on_guild_member_add;
    GuildMemberRemove(GuildMemberRemove) => "GUILD_MEMBER_REMOVE", Some(StoreFlag::Member), on_guild_member_remove;
    GuildMembersChunk(GuildMembersChunk) => "GUILD_MEMBERS_CHUNK", Some(StoreFlag::Member), on_guild_members_chunk;
    GuildMemberUpdate(GuildMemberUpdate) => "GUILD_MEMBER_UPDATE", Some(StoreFlag::Member), on_guild_member_update;
    GuildMembersCompletion(GuildMembersCompletion) => "GUILD_MEMBERS_COMPLETION", Some(StoreFlag::Member), on_guild_members_completion;

    GuildRoleCreate(GuildRole) => "GUILD_ROLE_CREATE", Some(StoreFlag::Role), on_guild_role_create;
    GuildRoleUpdate(GuildRole) => "GUILD_ROLE_UPDATE", Some(StoreFlag::Role), on_guild_role_update;
    GuildRoleDelete(GuildRoleDelete) => "GUILD_ROLE_DELETE", Some(StoreFlag::Role), on_guild_role_delete;

    ScheduledEventCreate(ScheduledEvent) => "GUILD_SCHEDULED_EVENT_CREATE", Some(StoreFlag::ScheduledEvent), on_scheduled_event_create;
    ScheduledEventUpdate(ScheduledEvent) => "GUILD_SCHEDULED_EVENT_UPDATE", Some(StoreFlag::ScheduledEvent), on_scheduled_event_update;
    ScheduledEventDelete(ScheduledEvent) => "GUILD_SCHEDULED_EVENT_DELETE", Some(StoreFlag::ScheduledEvent), on_scheduled_event_delete;
    ScheduledEventUserAdd(ScheduledEventUser) => "GUILD_SCHEDULED_EVENT_USER_ADD", Some(StoreFlag::ScheduledEvent), on_scheduled_event_user_add;
    ScheduledEventUserRemove(ScheduledEventUser) => "GUILD_SCHEDULED_EVENT_USER_REMOVE", Some(StoreFlag::ScheduledEvent), on_scheduled_event_user_remove;

    MessageCreate(Message) => "MESSAGE_CREATE", Some(StoreFlag::Message), on_message_create;
    MessageUpdate(PartialMessage) => "MESSAGE_UPDATE", Some(StoreFlag::Message), on_message_update;
    MessageDelete(MessageDelete) => "MESSAGE_DELETE", Some(StoreFlag::Message), on_message_delete;
    MessageDeleteBulk(MessageDeleteBulk) => "MESSAGE_DELETE_BULK", Some(StoreFlag::Message), on_message_delete_bulk;
    MessageReactionAdd(MessageReaction) => "MESSAGE_REACTION_ADD", Some(StoreFlag::Message), on_message_reaction_add;
    MessageReactionRemove(MessageReaction) => "MESSAGE_REACTION_REMOVE", Some(StoreFlag::Message), on_message_reaction_remove;
    MessageReactionRemoveAll(MessageReactionRemoveAll) => "MESSAGE_REACTION_REMOVE_ALL", Some(StoreFlag::Message), on_message_reaction_remove_all;
    MessageReactionRemoveEmoji(MessageReactionRemoveEmoji) => "MESSAGE_REACTION_REMOVE_EMOJI", Some(StoreFlag::Message), on_message_reaction_remove_emoji;

    PresenceUpdate(Presence) => "PRESENCE_UPDATE", Some(StoreFlag::Presence), on_presence_update;
    Ready(Ready) => "READY", None, on_ready;
    UserUpdate(User) => "USER_UPDATE", Some(StoreFlag::User), on_user_update;
    VoiceStateUpdate(VoiceState) => "VOICE_STATE_UPDATE", Some(StoreFlag::VoiceState), on_voice_state_update;

    StageInstanceCreate(StageInstance) => "STAGE_INSTANCE_CREATE", Some(StoreFlag::StageInstance), on_stage_instance_create;
    StageInstanceUpdate(StageInstance) => "STAGE_INSTANCE_UPDATE", Some(StoreFlag::StageInstance), on_stage_instance_update;
    StageInstanceDelete(StageInstance) => "STAGE_INSTANCE_DELETE", Some(StoreFlag::StageInstance), on_stage_instance_delete;

    ThreadCreate(Channel) => "THREAD_CREATE", Some(StoreFlag::Thread), on_thread_create;
    ThreadUpdate(Channel) => "THREAD_UPDATE", Some(StoreFlag::Thread), on_thread_update;
    ThreadDelete(ThreadDelete) => "THREAD_DELETE", Some(StoreFlag::Thread), on_thread_delete;
    ThreadListSync(ThreadListSync) => "THREAD_LIST_SYNC", Some(StoreFlag::Thread), on_thread_list_sync;
    ThreadMemberUpdate(ThreadMember) => "THREAD_MEMBER_UPDATE", Some(StoreFlag::Thread), on_thread_member_update;
    ThreadMembersUpdate(ThreadMembersUpdate) => "THREAD_MEMBERS_UPDATE", Some(StoreFlag::Thread), on_thread_members_update;

    InvalidateShard(InvalidationCause) => "INVALIDATE_SHARD", None, on_shard_invalidation;
}

impl GatewayKind {
    /// Creates bring an invalidated shard back to connected.
    pub fn is_create(self) -> bool {
        matches!(
            self,
            GatewayKind::ChannelCreate
                | GatewayKind::GuildCreate
                | GatewayKind::GuildMemberAdd
                | GatewayKind::GuildRoleCreate
                | GatewayKind::ScheduledEventCreate
                | GatewayKind::MessageCreate
                | GatewayKind::StageInstanceCreate
                | GatewayKind::ThreadCreate
        )
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A notification received on one shard.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayAction {
    pub shard: u32,
    pub dispatch: Dispatch,
}

impl GatewayAction {
    pub fn new(shard: u32, dispatch: Dispatch) -> Self {
        Self { shard, dispatch }
    }
}

/// A user-defined action, routed by name.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAction {
    pub name: String,
    pub shard: Option<u32>,
    pub payload: serde_json::Value,
}

impl CustomAction {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            shard: None,
            payload,
        }
    }

    pub fn on_shard(mut self, shard: u32) -> Self {
        self.shard = Some(shard);
        self
    }

    /// Decode the payload into a typed request.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            crate::error::StoreError::InvalidPayload {
                action: self.name.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// Anything the store can execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Gateway(GatewayAction),
    Read(Query),
    Custom(CustomAction),
}

impl Action {
    pub fn gateway(shard: u32, dispatch: Dispatch) -> Self {
        Action::Gateway(GatewayAction::new(shard, dispatch))
    }

    /// Routing key of this action.
    pub fn tag(&self) -> ActionTag {
        match self {
            Action::Gateway(action) => ActionTag::Gateway(action.dispatch.kind()),
            Action::Read(query) => ActionTag::Read(query.entity()),
            Action::Custom(action) => ActionTag::Custom(action.name.clone()),
        }
    }
}

impl From<GatewayAction> for Action {
    fn from(action: GatewayAction) -> Self {
        Action::Gateway(action)
    }
}

impl From<Query> for Action {
    fn from(query: Query) -> Self {
        Action::Read(query)
    }
}

impl From<CustomAction> for Action {
    fn from(action: CustomAction) -> Self {
        Action::Custom(action)
    }
}

/// Key under which a handler is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionTag {
    Gateway(GatewayKind),
    Read(EntityKind),
    Custom(String),
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTag::Gateway(kind) => write!(f, "{}", kind),
            ActionTag::Read(entity) => write!(f, "READ_{}", entity.name().to_uppercase()),
            ActionTag::Custom(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dispatch_wire_form() {
        let dispatch: Dispatch = serde_json::from_str(
            r#"{"t":"GUILD_ROLE_DELETE","d":{"guild_id":1,"role_id":2}}"#,
        )
        .unwrap();
        assert_eq!(
            dispatch,
            Dispatch::GuildRoleDelete(GuildRoleDelete {
                guild_id: 1,
                role_id: 2
            })
        );
        assert_eq!(dispatch.kind().name(), "GUILD_ROLE_DELETE");

        let invalidate: Dispatch =
            serde_json::from_str(r#"{"t":"INVALIDATE_SHARD","d":"HARD_RECONNECT"}"#).unwrap();
        assert_eq!(
            invalidate,
            Dispatch::InvalidateShard(InvalidationCause::HardReconnect)
        );
    }

    #[test]
    fn test_always_handled_kinds() {
        let unflagged: Vec<_> = GatewayKind::ALL
            .iter()
            .filter(|k| k.flag().is_none())
            .collect();
        assert_eq!(
            unflagged,
            vec![&GatewayKind::Ready, &GatewayKind::InvalidateShard]
        );
    }

    #[test]
    fn test_tags() {
        let action = Action::gateway(
            0,
            Dispatch::GuildMembersCompletion(GuildMembersCompletion { guild_id: 5 }),
        );
        assert_eq!(action.tag().to_string(), "GUILD_MEMBERS_COMPLETION");
        let read = Action::from(Query::get(EntityKind::VoiceState, 1));
        assert_eq!(read.tag().to_string(), "READ_VOICE_STATE");
        let custom = Action::from(CustomAction::new("SWEEP_SHARD", serde_json::json!({})));
        assert_eq!(custom.tag(), ActionTag::Custom("SWEEP_SHARD".to_string()));
    }
}

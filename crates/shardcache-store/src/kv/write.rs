//! Gateway updates applied to the key space.

use std::collections::HashSet;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde::Serialize;
use shardcache_model::{
    Channel, Emoji, Guild, GuildCreate, GuildEmojisUpdate, GuildMemberRemove, GuildMemberUpdate,
    GuildMembersChunk, GuildMembersCompletion, GuildRole, GuildRoleDelete, GuildStickersUpdate,
    Id, Member, Message, MessageDelete, MessageDeleteBulk, MessageReaction,
    MessageReactionRemoveAll, MessageReactionRemoveEmoji, PartialGuild, PartialMessage,
    PartialUser, Presence, Ready, Role, ScheduledEvent, ScheduledEventUser, StageInstance, Sticker,
    ThreadDelete, ThreadListSync, ThreadMember, ThreadMembersUpdate, UnavailableGuild, User,
    VoiceState,
};
use tracing::{debug, info, trace};

use super::stored::StoredMessage;
use super::{KvLayout, attach_member_user};
use crate::backend::WriteBatch;
use crate::codec::{self, Stamp};
use crate::error::Result;
use crate::key::{Key, Table, keys};
use crate::tracker::InvalidationCause;
use crate::updater::{GatewayDataUpdater, Invalidation};

fn put<T: Serialize>(batch: &mut WriteBatch, key: Key, stamp: Stamp, value: &T) -> Result<()> {
    batch.put(key, codec::encode(stamp, value)?);
    Ok(())
}

/// Presences are stored without user fields; reads attach the user record.
fn bare_presence(presence: &Presence, guild_id: Id) -> Presence {
    Presence {
        user: PartialUser {
            id: presence.user.id,
            ..PartialUser::default()
        },
        guild_id,
        ..presence.clone()
    }
}

impl KvLayout {
    /// Write a user record when users are tracked.
    async fn put_user(&self, user: &User) -> Result<Option<User>> {
        if !self.flags().user {
            return Ok(None);
        }
        self.repo()
            .upsert(&keys::user(user.id), Stamp::GLOBAL, user.clone())
            .await
    }

    /// Store a channel and index it under its guild.
    async fn put_guild_channel(
        &self,
        shard: u32,
        channel: Channel,
        index: fn(Id, Id) -> Key,
    ) -> Result<Option<Channel>> {
        let guild_id = match channel.guild_id {
            Some(guild_id) if !channel.kind.is_private() => guild_id,
            _ => {
                trace!(channel_id = channel.id, "kv: private channel ignored");
                return Ok(None);
            }
        };
        let stamp = self.stamp(shard).await?;
        let channel_id = channel.id;
        let previous = self
            .repo()
            .update(&keys::channel(channel_id), stamp, |current: Option<Channel>| {
                let mut next = channel.clone();
                if next.last_message_id.is_none() {
                    next.last_message_id = current.and_then(|c| c.last_message_id);
                }
                Some(next)
            })
            .await?;
        self.repo()
            .upsert(&index(guild_id, channel_id), stamp, channel_id)
            .await?;
        trace!(guild_id, channel_id, "kv: channel stored");
        Ok(previous)
    }

    /// Remove a channel or thread with everything keyed under it.
    async fn delete_guild_channel(
        &self,
        shard: u32,
        channel_id: Id,
        guild_id: Option<Id>,
    ) -> Result<Option<Channel>> {
        let stamp = self.stamp(shard).await?;
        let previous = self.repo().get::<Channel>(&keys::channel(channel_id)).await?;
        let mut batch = WriteBatch::new();
        self.delete_channel_subtree(&mut batch, channel_id).await?;
        if let Some(guild_id) = guild_id.or_else(|| previous.as_ref().and_then(|c| c.guild_id)) {
            batch.delete(keys::guild_channel(guild_id, channel_id));
            batch.delete(keys::guild_thread(guild_id, channel_id));
        }
        let ops = batch.len();
        self.repo().commit(batch, stamp).await?;
        debug!(channel_id, ops, "kv: channel deleted");
        Ok(previous)
    }

    /// Replace every record under `prefix` with `items`. Returns the live
    /// records that were replaced.
    async fn replace_set<T>(
        &self,
        shard: u32,
        prefix: Key,
        items: Vec<(Key, T)>,
    ) -> Result<Vec<T>>
    where
        T: Serialize + serde::de::DeserializeOwned + Send + 'static,
    {
        let stamp = self.stamp(shard).await?;
        let previous: Vec<T> = self.repo().values(prefix.clone()).try_collect().await?;
        let mut batch = WriteBatch::new();
        self.delete_prefix(&mut batch, &prefix).await?;
        for (key, item) in &items {
            put(&mut batch, key.clone(), stamp, item)?;
        }
        self.repo().commit(batch, stamp).await?;
        trace!(prefix = %prefix, replaced = previous.len(), stored = items.len(), "kv: set replaced");
        Ok(previous)
    }

    /// Queue deletes for entries of `table` under `guild_id` whose id is not
    /// in `keep`. Returns the pruned ids.
    async fn prune_missing(
        &self,
        batch: &mut WriteBatch,
        table: Table,
        guild_id: Id,
        keep: &HashSet<Id>,
    ) -> Result<Vec<Id>> {
        let mut pruned = Vec::new();
        for key in self.repo().keys_under(&keys::scoped(table, guild_id)).await? {
            match key.last_id() {
                Some(id) if !keep.contains(&id) => {
                    pruned.push(id);
                    batch.delete(key);
                }
                _ => {}
            }
        }
        if !pruned.is_empty() {
            trace!(guild_id, ?table, pruned = pruned.len(), "kv: entries missing from snapshot pruned");
        }
        Ok(pruned)
    }

    /// Count a new member in the stored guild, if the guild is known.
    async fn increment_member_count(&self, stamp: Stamp, guild_id: Id) -> Result<()> {
        self.repo()
            .modify(&keys::guild(guild_id), stamp, |mut guild: Guild| {
                guild.member_count += 1;
                guild
            })
            .await?;
        Ok(())
    }

    async fn put_member(&self, stamp: Stamp, mut member: Member, guild_id: Id) -> Result<Option<Member>> {
        member.guild_id = guild_id;
        self.put_user(&member.user).await?;
        let key = keys::member(guild_id, member.user.id);
        self.repo().upsert(&key, stamp, member).await
    }

    async fn update_message<F>(
        &self,
        shard: u32,
        channel_id: Id,
        message_id: Id,
        mut f: F,
    ) -> Result<Option<Message>>
    where
        F: FnMut(&mut StoredMessage) + Send,
    {
        let stamp = self.stamp(shard).await?;
        let previous = self
            .repo()
            .modify(&keys::message(channel_id, message_id), stamp, |mut stored: StoredMessage| {
                f(&mut stored);
                stored
            })
            .await?;
        if previous.is_none() {
            trace!(channel_id, message_id, "kv: reaction on unknown message ignored");
        }
        Ok(previous.map(|stored| stored.message))
    }
}

#[async_trait]
impl GatewayDataUpdater for KvLayout {
    async fn on_channel_create(&self, shard: u32, channel: Channel) -> Result<Option<Channel>> {
        self.tracker().mark_connected(shard);
        self.put_guild_channel(shard, channel, keys::guild_channel).await
    }

    async fn on_channel_update(&self, shard: u32, channel: Channel) -> Result<Option<Channel>> {
        self.put_guild_channel(shard, channel, keys::guild_channel).await
    }

    async fn on_channel_delete(&self, shard: u32, channel: Channel) -> Result<Option<Channel>> {
        self.delete_guild_channel(shard, channel.id, channel.guild_id)
            .await
    }

    async fn on_guild_create(&self, shard: u32, create: GuildCreate) -> Result<Option<Guild>> {
        self.tracker().mark_connected(shard);
        let stamp = self.stamp(shard).await?;
        let flags = *self.flags();
        let guild_id = create.id;

        let previous = match self.repo().get::<Guild>(&keys::guild(guild_id)).await? {
            Some(guild) => Some(self.hydrate_guild(guild).await?),
            None => None,
        };

        let mut batch = WriteBatch::new();
        batch.delete(keys::member_list(guild_id));
        put(&mut batch, keys::guild(guild_id), stamp, &create.guild())?;

        // The snapshot carries complete role, emoji, sticker and channel
        // lists; anything else under the guild is only ever upserted.
        if flags.role {
            let ids = create.roles.iter().map(|r| r.id).collect();
            self.prune_missing(&mut batch, Table::Role, guild_id, &ids).await?;
        }
        if flags.emoji {
            let ids = create.emojis.iter().map(|e| e.id).collect();
            self.prune_missing(&mut batch, Table::Emoji, guild_id, &ids).await?;
        }
        if flags.sticker {
            let ids = create.stickers.iter().map(|s| s.id).collect();
            self.prune_missing(&mut batch, Table::Sticker, guild_id, &ids).await?;
        }
        if flags.channel {
            let ids = create
                .channels
                .iter()
                .filter(|c| !c.kind.is_thread())
                .map(|c| c.id)
                .collect();
            for channel_id in self
                .prune_missing(&mut batch, Table::GuildChannel, guild_id, &ids)
                .await?
            {
                batch.delete(keys::channel(channel_id));
            }
        }

        if flags.role {
            for role in &create.roles {
                put(&mut batch, keys::role(guild_id, role.id), stamp, role)?;
            }
        }
        if flags.emoji {
            for emoji in &create.emojis {
                put(&mut batch, keys::emoji(guild_id, emoji.id), stamp, emoji)?;
            }
        }
        if flags.sticker {
            for sticker in &create.stickers {
                put(&mut batch, keys::sticker(guild_id, sticker.id), stamp, sticker)?;
            }
        }

        let mut users = Vec::new();
        if flags.member {
            for member in &create.members {
                let member = Member {
                    guild_id,
                    ..member.clone()
                };
                put(&mut batch, keys::member(guild_id, member.user_id()), stamp, &member)?;
                users.push(member.user);
            }
        }
        if flags.channel {
            for channel in &create.channels {
                let mut channel = Channel {
                    guild_id: Some(guild_id),
                    ..channel.clone()
                };
                if channel.last_message_id.is_none() {
                    channel.last_message_id = self
                        .repo()
                        .get::<Channel>(&keys::channel(channel.id))
                        .await?
                        .and_then(|c| c.last_message_id);
                }
                let index = if channel.kind.is_thread() {
                    keys::guild_thread(guild_id, channel.id)
                } else {
                    keys::guild_channel(guild_id, channel.id)
                };
                put(&mut batch, keys::channel(channel.id), stamp, &channel)?;
                put(&mut batch, index, stamp, &channel.id)?;
            }
        }
        if flags.thread {
            for thread in &create.threads {
                let thread = Channel {
                    guild_id: Some(guild_id),
                    ..thread.clone()
                };
                put(&mut batch, keys::channel(thread.id), stamp, &thread)?;
                put(&mut batch, keys::guild_thread(guild_id, thread.id), stamp, &thread.id)?;
            }
        }
        if flags.presence {
            for presence in &create.presences {
                users.extend(presence.user.clone().into_user());
                let key = keys::presence(guild_id, presence.user.id);
                put(&mut batch, key, stamp, &bare_presence(presence, guild_id))?;
            }
        }
        if flags.voice_state {
            for voice_state in create.voice_states.iter().filter(|v| v.channel_id.is_some()) {
                let voice_state = VoiceState {
                    guild_id: Some(guild_id),
                    ..voice_state.clone()
                };
                let key = keys::voice_state(guild_id, voice_state.user_id);
                put(&mut batch, key, stamp, &voice_state)?;
            }
        }
        if flags.scheduled_event {
            for event in &create.scheduled_events {
                put(&mut batch, keys::scheduled_event(guild_id, event.id), stamp, event)?;
            }
        }
        if flags.stage_instance {
            for stage in &create.stage_instances {
                put(&mut batch, keys::stage_instance(stage.channel_id), stamp, stage)?;
            }
        }
        if flags.user {
            for user in &users {
                put(&mut batch, keys::user(user.id), Stamp::GLOBAL, user)?;
            }
        }

        let ops = batch.len();
        self.repo().commit(batch, stamp).await?;
        debug!(
            guild_id,
            shard,
            ops,
            redelivered = previous.is_some(),
            "kv: guild created"
        );
        Ok(previous)
    }

    async fn on_guild_update(&self, shard: u32, guild: PartialGuild) -> Result<Option<Guild>> {
        let stamp = self.stamp(shard).await?;
        let key = keys::guild(guild.id);
        let previous = self
            .repo()
            .modify(&key, stamp, |current: Guild| guild.clone().merge_into(current))
            .await?;
        match previous {
            Some(previous) => Ok(Some(self.hydrate_guild(previous).await?)),
            None => {
                trace!(guild_id = guild.id, "kv: update for unknown guild ignored");
                Ok(None)
            }
        }
    }

    async fn on_guild_delete(&self, shard: u32, guild: UnavailableGuild) -> Result<Option<Guild>> {
        let stamp = self.stamp(shard).await?;
        let previous = match self.repo().get::<Guild>(&keys::guild(guild.id)).await? {
            Some(found) => Some(self.hydrate_guild(found).await?),
            None => None,
        };
        let mut batch = WriteBatch::new();
        batch.delete(keys::guild(guild.id));
        self.delete_guild_subtree(&mut batch, guild.id).await?;
        let ops = batch.len();
        self.repo().commit(batch, stamp).await?;
        debug!(
            guild_id = guild.id,
            unavailable = guild.unavailable,
            ops,
            "kv: guild deleted"
        );
        Ok(previous)
    }

    async fn on_guild_emojis_update(
        &self,
        shard: u32,
        update: GuildEmojisUpdate,
    ) -> Result<Vec<Emoji>> {
        let guild_id = update.guild_id;
        let items = update
            .emojis
            .into_iter()
            .map(|emoji| (keys::emoji(guild_id, emoji.id), emoji))
            .collect();
        self.replace_set(shard, keys::scoped(Table::Emoji, guild_id), items)
            .await
    }

    async fn on_guild_stickers_update(
        &self,
        shard: u32,
        update: GuildStickersUpdate,
    ) -> Result<Vec<Sticker>> {
        let guild_id = update.guild_id;
        let items = update
            .stickers
            .into_iter()
            .map(|sticker| (keys::sticker(guild_id, sticker.id), sticker))
            .collect();
        self.replace_set(shard, keys::scoped(Table::Sticker, guild_id), items)
            .await
    }

    async fn on_guild_member_add(&self, shard: u32, member: Member) -> Result<Option<Member>> {
        self.tracker().mark_connected(shard);
        let stamp = self.stamp(shard).await?;
        let guild_id = member.guild_id;
        let previous = self.put_member(stamp, member, guild_id).await?;
        if previous.is_none() {
            self.increment_member_count(stamp, guild_id).await?;
        }
        Ok(previous)
    }

    async fn on_guild_member_remove(
        &self,
        shard: u32,
        remove: GuildMemberRemove,
    ) -> Result<Option<Member>> {
        let stamp = self.stamp(shard).await?;
        let guild_id = remove.guild_id;
        let member_key = keys::member(guild_id, remove.user.id);
        let presence_key = keys::presence(guild_id, remove.user.id);
        let guild_key = keys::guild(guild_id);
        loop {
            let (member_version, previous) = self.repo().get_versioned::<Member>(&member_key).await?;
            let (presence_version, _) = self.repo().get_versioned::<Presence>(&presence_key).await?;
            let (guild_version, guild) = self.repo().get_versioned::<Guild>(&guild_key).await?;

            let mut batch = WriteBatch::new();
            batch
                .expect(member_key.clone(), member_version)
                .expect(presence_key.clone(), presence_version);
            if member_version.is_some() {
                batch.delete(member_key.clone());
            }
            if presence_version.is_some() {
                batch.delete(presence_key.clone());
            }
            if let (Some(_), Some(mut guild)) = (&previous, guild) {
                guild.member_count = guild.member_count.saturating_sub(1);
                batch.expect(guild_key.clone(), guild_version);
                put(&mut batch, guild_key.clone(), stamp, &guild)?;
            }
            if self.repo().commit_guarded(batch, stamp).await? {
                return match previous {
                    Some(member) => Ok(Some(attach_member_user(self.repo(), member).await?)),
                    None => Ok(None),
                };
            }
        }
    }

    async fn on_guild_members_chunk(&self, shard: u32, chunk: GuildMembersChunk) -> Result<()> {
        let stamp = self.stamp(shard).await?;
        let guild_id = chunk.guild_id;
        let mut batch = WriteBatch::new();
        for member in &chunk.members {
            let member = Member {
                guild_id,
                ..member.clone()
            };
            put(&mut batch, keys::member(guild_id, member.user_id()), stamp, &member)?;
            if self.flags().user {
                put(&mut batch, keys::user(member.user.id), Stamp::GLOBAL, &member.user)?;
            }
        }
        self.repo().commit(batch, stamp).await?;
        debug!(
            guild_id,
            chunk = chunk.chunk_index,
            of = chunk.chunk_count,
            members = chunk.members.len(),
            not_found = chunk.not_found.len(),
            "kv: member chunk stored"
        );
        Ok(())
    }

    async fn on_guild_member_update(
        &self,
        shard: u32,
        update: GuildMemberUpdate,
    ) -> Result<Option<Member>> {
        let stamp = self.stamp(shard).await?;
        self.put_user(&update.user).await?;
        let key = keys::member(update.guild_id, update.user.id);
        self.repo()
            .modify(&key, stamp, |member: Member| update.clone().merge_into(member))
            .await
    }

    async fn on_guild_members_completion(
        &self,
        _shard: u32,
        completion: GuildMembersCompletion,
    ) -> Result<()> {
        self.tracker()
            .complete_member_list(completion.guild_id)
            .await?;
        Ok(())
    }

    async fn on_guild_role_create(&self, shard: u32, role: GuildRole) -> Result<Option<Role>> {
        self.tracker().mark_connected(shard);
        let stamp = self.stamp(shard).await?;
        let key = keys::role(role.guild_id, role.role.id);
        self.repo().upsert(&key, stamp, role.role).await
    }

    async fn on_guild_role_update(&self, shard: u32, role: GuildRole) -> Result<Option<Role>> {
        let stamp = self.stamp(shard).await?;
        let key = keys::role(role.guild_id, role.role.id);
        self.repo().upsert(&key, stamp, role.role).await
    }

    async fn on_guild_role_delete(
        &self,
        shard: u32,
        delete: GuildRoleDelete,
    ) -> Result<Option<Role>> {
        let stamp = self.stamp(shard).await?;
        let GuildRoleDelete { guild_id, role_id } = delete;
        let role_key = keys::role(guild_id, role_id);
        loop {
            let (role_version, previous) = self.repo().get_versioned::<Role>(&role_key).await?;
            let holders: Vec<(Key, u64, Member)> = self
                .repo()
                .versioned::<Member>(&keys::scoped(Table::Member, guild_id))
                .await?
                .into_iter()
                .filter(|(_, _, member)| member.roles.contains(&role_id))
                .collect();

            let mut batch = WriteBatch::new();
            batch.expect(role_key.clone(), role_version);
            if role_version.is_some() {
                batch.delete(role_key.clone());
            }
            let stripped = holders.len();
            for (key, version, mut member) in holders {
                member.roles.retain(|r| *r != role_id);
                batch.expect(key.clone(), Some(version));
                put(&mut batch, key, stamp, &member)?;
            }
            if self.repo().commit_guarded(batch, stamp).await? {
                debug!(guild_id, role_id, stripped, "kv: role deleted");
                return Ok(previous);
            }
        }
    }

    async fn on_scheduled_event_create(
        &self,
        shard: u32,
        event: ScheduledEvent,
    ) -> Result<Option<ScheduledEvent>> {
        self.tracker().mark_connected(shard);
        let stamp = self.stamp(shard).await?;
        let key = keys::scheduled_event(event.guild_id, event.id);
        self.repo().upsert(&key, stamp, event).await
    }

    async fn on_scheduled_event_update(
        &self,
        shard: u32,
        event: ScheduledEvent,
    ) -> Result<Option<ScheduledEvent>> {
        let stamp = self.stamp(shard).await?;
        let key = keys::scheduled_event(event.guild_id, event.id);
        self.repo().upsert(&key, stamp, event).await
    }

    async fn on_scheduled_event_delete(
        &self,
        shard: u32,
        event: ScheduledEvent,
    ) -> Result<Option<ScheduledEvent>> {
        let stamp = self.stamp(shard).await?;
        let key = keys::scheduled_event(event.guild_id, event.id);
        let previous = self.repo().get::<ScheduledEvent>(&key).await?;
        let mut batch = WriteBatch::new();
        batch.delete(key);
        let users = Key::table(Table::EventUser).push(event.guild_id).push(event.id);
        self.delete_prefix(&mut batch, &users).await?;
        self.repo().commit(batch, stamp).await?;
        Ok(previous)
    }

    async fn on_scheduled_event_user_add(
        &self,
        shard: u32,
        user: ScheduledEventUser,
    ) -> Result<()> {
        let stamp = self.stamp(shard).await?;
        let key = keys::event_user(user.guild_id, user.event_id, user.user_id);
        self.repo().upsert(&key, stamp, user.user_id).await?;
        Ok(())
    }

    async fn on_scheduled_event_user_remove(
        &self,
        _shard: u32,
        user: ScheduledEventUser,
    ) -> Result<()> {
        let key = keys::event_user(user.guild_id, user.event_id, user.user_id);
        self.repo().remove::<Id>(&key).await?;
        Ok(())
    }

    async fn on_message_create(&self, shard: u32, message: Message) -> Result<Option<Message>> {
        self.tracker().mark_connected(shard);
        let stamp = self.stamp(shard).await?;
        let (channel_id, message_id) = (message.channel_id, message.id);
        self.put_user(&message.author).await?;

        let previous = self
            .repo()
            .update(
                &keys::message(channel_id, message_id),
                stamp,
                |current: Option<StoredMessage>| {
                    Some(match current {
                        Some(mut stored) => {
                            stored.replace(message.clone());
                            stored
                        }
                        None => StoredMessage::new(message.clone()),
                    })
                },
            )
            .await?;

        if self.flags().channel {
            self.repo()
                .modify(&keys::channel(channel_id), stamp, |mut channel: Channel| {
                    channel.last_message_id = Some(message_id);
                    channel
                })
                .await?;
        }
        Ok(previous.map(|stored| stored.message))
    }

    async fn on_message_update(
        &self,
        shard: u32,
        message: PartialMessage,
    ) -> Result<Option<Message>> {
        let (channel_id, message_id) = (message.channel_id, message.id);
        self.update_message(shard, channel_id, message_id, |stored| {
            stored.message = message.clone().merge_into(stored.message.clone());
        })
        .await
    }

    async fn on_message_delete(
        &self,
        _shard: u32,
        delete: MessageDelete,
    ) -> Result<Option<Message>> {
        let key = keys::message(delete.channel_id, delete.id);
        let previous = self.repo().remove::<StoredMessage>(&key).await?;
        Ok(previous.map(|stored| stored.message))
    }

    async fn on_message_delete_bulk(
        &self,
        _shard: u32,
        delete: MessageDeleteBulk,
    ) -> Result<Vec<Message>> {
        let channel_id = delete.channel_id;
        loop {
            let mut previous = Vec::new();
            let mut batch = WriteBatch::new();
            for id in &delete.ids {
                let key = keys::message(channel_id, *id);
                let (version, stored) = self.repo().get_versioned::<StoredMessage>(&key).await?;
                if version.is_some() {
                    batch.expect(key.clone(), version).delete(key);
                }
                previous.extend(stored.map(|stored| stored.message));
            }
            if self.repo().commit_guarded(batch, Stamp::GLOBAL).await? {
                debug!(
                    channel_id,
                    requested = delete.ids.len(),
                    removed = previous.len(),
                    "kv: messages bulk deleted"
                );
                return Ok(previous);
            }
        }
    }

    async fn on_message_reaction_add(
        &self,
        shard: u32,
        reaction: MessageReaction,
    ) -> Result<Option<Message>> {
        let self_user = self.tracker().self_user().await?;
        self.update_message(shard, reaction.channel_id, reaction.message_id, |stored| {
            stored.add_reaction(&reaction.emoji, reaction.user_id, self_user);
        })
        .await
    }

    async fn on_message_reaction_remove(
        &self,
        shard: u32,
        reaction: MessageReaction,
    ) -> Result<Option<Message>> {
        let self_user = self.tracker().self_user().await?;
        self.update_message(shard, reaction.channel_id, reaction.message_id, |stored| {
            stored.remove_reaction(&reaction.emoji, reaction.user_id, self_user);
        })
        .await
    }

    async fn on_message_reaction_remove_all(
        &self,
        shard: u32,
        remove: MessageReactionRemoveAll,
    ) -> Result<Option<Message>> {
        self.update_message(shard, remove.channel_id, remove.message_id, |stored| {
            stored.remove_all_reactions();
        })
        .await
    }

    async fn on_message_reaction_remove_emoji(
        &self,
        shard: u32,
        remove: MessageReactionRemoveEmoji,
    ) -> Result<Option<Message>> {
        self.update_message(shard, remove.channel_id, remove.message_id, |stored| {
            stored.remove_emoji(&remove.emoji);
        })
        .await
    }

    async fn on_presence_update(
        &self,
        shard: u32,
        presence: Presence,
    ) -> Result<(Option<Presence>, Option<User>)> {
        let stamp = self.stamp(shard).await?;
        let user_id = presence.user.id;

        let previous_user = if self.flags().user && !presence.user.is_empty() {
            self.repo()
                .modify(&keys::user(user_id), Stamp::GLOBAL, |user: User| {
                    presence.user.clone().merge_into(user)
                })
                .await?
        } else {
            None
        };

        let key = keys::presence(presence.guild_id, user_id);
        let previous = self
            .repo()
            .upsert(&key, stamp, bare_presence(&presence, presence.guild_id))
            .await?
            .map(|mut previous| {
                if let Some(user) = &previous_user {
                    previous.user = PartialUser::from(user);
                }
                previous
            });
        Ok((previous, previous_user))
    }

    async fn on_ready(&self, shard: u32, ready: Ready) -> Result<()> {
        self.tracker().mark_connected(shard);
        self.tracker().set_self_user(ready.user.id).await?;
        self.put_user(&ready.user).await?;
        info!(
            shard,
            user_id = ready.user.id,
            guilds = ready.guilds.len(),
            "kv: session ready"
        );
        Ok(())
    }

    async fn on_user_update(&self, _shard: u32, user: User) -> Result<Option<User>> {
        let previous = self
            .repo()
            .modify(&keys::user(user.id), Stamp::GLOBAL, |_: User| user.clone())
            .await?;
        if previous.is_none() {
            trace!(user_id = user.id, "kv: update for unknown user ignored");
        }
        Ok(previous)
    }

    async fn on_voice_state_update(
        &self,
        shard: u32,
        voice_state: VoiceState,
    ) -> Result<Option<VoiceState>> {
        let Some(guild_id) = voice_state.guild_id else {
            trace!(user_id = voice_state.user_id, "kv: voice state without guild ignored");
            return Ok(None);
        };
        let key = keys::voice_state(guild_id, voice_state.user_id);
        if voice_state.channel_id.is_none() {
            return self.repo().remove::<VoiceState>(&key).await;
        }
        let stamp = self.stamp(shard).await?;
        self.repo().upsert(&key, stamp, voice_state).await
    }

    async fn on_stage_instance_create(
        &self,
        shard: u32,
        stage: StageInstance,
    ) -> Result<Option<StageInstance>> {
        self.tracker().mark_connected(shard);
        let stamp = self.stamp(shard).await?;
        let key = keys::stage_instance(stage.channel_id);
        self.repo().upsert(&key, stamp, stage).await
    }

    async fn on_stage_instance_update(
        &self,
        shard: u32,
        stage: StageInstance,
    ) -> Result<Option<StageInstance>> {
        let stamp = self.stamp(shard).await?;
        let key = keys::stage_instance(stage.channel_id);
        self.repo().upsert(&key, stamp, stage).await
    }

    async fn on_stage_instance_delete(
        &self,
        _shard: u32,
        stage: StageInstance,
    ) -> Result<Option<StageInstance>> {
        self.repo()
            .remove::<StageInstance>(&keys::stage_instance(stage.channel_id))
            .await
    }

    async fn on_thread_create(&self, shard: u32, thread: Channel) -> Result<Option<Channel>> {
        self.tracker().mark_connected(shard);
        self.put_guild_channel(shard, thread, keys::guild_thread).await
    }

    async fn on_thread_update(&self, shard: u32, thread: Channel) -> Result<Option<Channel>> {
        self.put_guild_channel(shard, thread, keys::guild_thread).await
    }

    async fn on_thread_delete(&self, shard: u32, delete: ThreadDelete) -> Result<Option<Channel>> {
        self.delete_guild_channel(shard, delete.id, Some(delete.guild_id))
            .await
    }

    async fn on_thread_list_sync(&self, shard: u32, sync: ThreadListSync) -> Result<()> {
        let stamp = self.stamp(shard).await?;
        let guild_id = sync.guild_id;
        let mut batch = WriteBatch::new();
        for thread in &sync.threads {
            let thread = Channel {
                guild_id: Some(guild_id),
                ..thread.clone()
            };
            put(&mut batch, keys::channel(thread.id), stamp, &thread)?;
            put(&mut batch, keys::guild_thread(guild_id, thread.id), stamp, &thread.id)?;
        }
        for member in &sync.members {
            put(
                &mut batch,
                keys::thread_member(member.id, member.user_id),
                stamp,
                member,
            )?;
        }
        self.repo().commit(batch, stamp).await?;
        debug!(
            guild_id,
            parents = sync.channel_ids.len(),
            threads = sync.threads.len(),
            "kv: thread list synced"
        );
        Ok(())
    }

    async fn on_thread_member_update(
        &self,
        shard: u32,
        member: ThreadMember,
    ) -> Result<Option<ThreadMember>> {
        let stamp = self.stamp(shard).await?;
        let key = keys::thread_member(member.id, member.user_id);
        self.repo().upsert(&key, stamp, member).await
    }

    async fn on_thread_members_update(
        &self,
        shard: u32,
        update: ThreadMembersUpdate,
    ) -> Result<Vec<ThreadMember>> {
        let stamp = self.stamp(shard).await?;
        let thread_id = update.id;
        let previous: Vec<ThreadMember> = self
            .repo()
            .values(keys::scoped(Table::ThreadMember, thread_id))
            .try_collect()
            .await?;
        let mut batch = WriteBatch::new();
        for user_id in &update.removed_member_ids {
            batch.delete(keys::thread_member(thread_id, *user_id));
        }
        for member in &update.added_members {
            let key = keys::thread_member(thread_id, member.user_id);
            put(&mut batch, key, stamp, member)?;
        }
        self.repo().commit(batch, stamp).await?;
        trace!(
            thread_id,
            member_count = update.member_count,
            "kv: thread members updated"
        );
        Ok(previous)
    }

    async fn on_shard_invalidation(
        &self,
        shard: u32,
        cause: InvalidationCause,
    ) -> Result<Invalidation> {
        let generation = self
            .tracker()
            .invalidate(shard, cause, &self.config().invalidation_filter)
            .await?;
        if generation.is_some() {
            self.schedule_sweep(shard).await?;
        }
        Ok(Invalidation { shard, generation })
    }
}

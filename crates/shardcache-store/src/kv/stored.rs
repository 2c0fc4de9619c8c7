//! Persisted forms that carry more than the public record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shardcache_model::{EmojiKey, Id, Message, Reaction, ReactionEmoji};

/// A message with a per-emoji log of who reacted.
///
/// `true` means the user's reaction is counted, `false` that it was
/// removed. The log makes reaction notifications idempotent: a redelivered
/// add or remove for the same user finds its own entry and changes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message: Message,
    #[serde(default)]
    pub reactors: BTreeMap<EmojiKey, BTreeMap<Id, bool>>,
}

impl StoredMessage {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            reactors: BTreeMap::new(),
        }
    }

    /// Replace the message body, keeping the reaction log.
    pub fn replace(&mut self, message: Message) {
        self.message = message;
    }

    pub fn add_reaction(&mut self, emoji: &ReactionEmoji, user_id: Id, self_user: Option<Id>) {
        let key = emoji.key();
        let log = self.reactors.entry(key.clone()).or_default();
        if log.get(&user_id) == Some(&true) {
            return;
        }
        log.insert(user_id, true);

        let me = self_user == Some(user_id);
        let reactions = &mut self.message.reactions;
        match reactions.iter_mut().find(|r| r.emoji.key() == key) {
            Some(reaction) => {
                reaction.count += 1;
                reaction.me |= me;
            }
            None => reactions.push(Reaction {
                emoji: emoji.clone(),
                count: 1,
                me,
            }),
        }
    }

    pub fn remove_reaction(&mut self, emoji: &ReactionEmoji, user_id: Id, self_user: Option<Id>) {
        let key = emoji.key();
        let log = self.reactors.entry(key.clone()).or_default();
        if log.get(&user_id) == Some(&false) {
            return;
        }
        log.insert(user_id, false);

        let me = self_user == Some(user_id);
        for reaction in self.message.reactions.iter_mut() {
            if reaction.emoji.key() == key {
                reaction.count = reaction.count.saturating_sub(1);
                if me {
                    reaction.me = false;
                }
            }
        }
        self.message.reactions.retain(|r| r.count > 0);
    }

    pub fn remove_all_reactions(&mut self) {
        self.message.reactions.clear();
        self.reactors.clear();
    }

    pub fn remove_emoji(&mut self, emoji: &ReactionEmoji) {
        let key = emoji.key();
        self.message.reactions.retain(|r| r.emoji.key() != key);
        self.reactors.remove(&key);
    }
}

//! End-to-end scenarios through the store router and the key-value layout.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use shardcache_model::{Id, Member, Message};
use shardcache_store::key::Key;
use shardcache_store::{
    Backend, BackendError, CustomAction, Dispatch, EntityKind, KvLayout, MemberListState,
    MemoryBackend, Outcome, Query, Scope, Snapshot, Store, StoreConfig, StoreError, StoreFlag,
    StoreFlags, Versioned, WriteBatch,
};

fn dispatch(t: &str, d: Value) -> Dispatch {
    serde_json::from_value(json!({ "t": t, "d": d })).unwrap()
}

fn user(id: Id) -> Value {
    json!({ "id": id, "username": format!("user{}", id) })
}

fn member(id: Id) -> Value {
    json!({ "user": user(id), "roles": [] })
}

fn guild_create(id: Id, members: &[Id]) -> Dispatch {
    dispatch(
        "GUILD_CREATE",
        json!({
            "id": id,
            "name": format!("guild{}", id),
            "owner_id": 1,
            "member_count": 50,
            "roles": [{ "id": id * 100 + 1, "name": "mod" }],
            "members": members.iter().map(|m| member(*m)).collect::<Vec<_>>(),
            "channels": [{ "id": id * 10 + 1, "type": "text", "name": "general" }],
        }),
    )
}

fn message_create(channel_id: Id, id: Id, author: Id) -> Dispatch {
    dispatch(
        "MESSAGE_CREATE",
        json!({
            "id": id,
            "channel_id": channel_id,
            "author": user(author),
            "content": "hello",
            "timestamp": "2024-01-01T00:00:00Z",
        }),
    )
}

fn inline_config() -> StoreConfig {
    StoreConfig::default().with_background_sweep(false)
}

fn kv_store(config: StoreConfig) -> (Store, KvLayout) {
    let layout = KvLayout::in_memory(config);
    let store = Store::from_layout(&layout).unwrap();
    (store, layout)
}

async fn count(store: &Store, entity: EntityKind, scope: Scope) -> u64 {
    store
        .execute(Query::count(entity, scope))
        .await
        .unwrap()
        .count()
        .unwrap()
}

async fn list(store: &Store, entity: EntityKind, scope: Scope) -> Vec<Snapshot> {
    store
        .execute(Query::list(entity, scope))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap()
        .unwrap()
}

fn member_ids(snapshots: &[Snapshot]) -> BTreeSet<Id> {
    snapshots
        .iter()
        .filter_map(|s| match s {
            Snapshot::Member(m) => Some(m.user.id),
            _ => None,
        })
        .collect()
}

async fn get_message(store: &Store, channel_id: Id, id: Id) -> Option<Message> {
    match store
        .execute(Query::get_in(EntityKind::Message, channel_id, id))
        .await
        .unwrap()
        .into_entity()
    {
        Some(Snapshot::Message(message)) => Some(message),
        _ => None,
    }
}

#[tokio::test]
async fn test_exact_members_need_completion() {
    let (store, _) = kv_store(inline_config());
    store.submit(0, guild_create(1, &[10, 11])).await.unwrap();

    let early = store.execute(Query::ListExactMembers { guild_id: 1 }).await;
    assert!(matches!(
        early,
        Err(StoreError::ExactResultNotAvailable { guild_id: 1 })
    ));
    let early_count = store.execute(Query::CountExactMembers { guild_id: 1 }).await;
    assert!(early_count.is_err());

    store
        .submit(0, dispatch("GUILD_MEMBERS_COMPLETION", json!({ "guild_id": 1 })))
        .await
        .unwrap();

    let exact = store
        .execute(Query::ListExactMembers { guild_id: 1 })
        .await
        .unwrap()
        .collect()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(member_ids(&exact), BTreeSet::from([10, 11]));

    let guild = store
        .execute(Query::get(EntityKind::Guild, 1))
        .await
        .unwrap()
        .into_entity();
    match guild {
        Some(Snapshot::Guild(guild)) => {
            assert_eq!(guild.member_count, 50);
            assert_eq!(guild.members, vec![10, 11]);
            assert!(guild.member_list_complete);
        }
        other => panic!("expected guild, got {:?}", other),
    }
}

#[tokio::test]
async fn test_completion_for_unknown_guild_is_ignored() {
    let (store, layout) = kv_store(inline_config());
    store
        .submit(0, dispatch("GUILD_MEMBERS_COMPLETION", json!({ "guild_id": 9 })))
        .await
        .unwrap();
    assert_eq!(
        layout.member_list_state(9).await.unwrap(),
        MemberListState::Absent
    );

    store.submit(0, guild_create(9, &[1])).await.unwrap();
    assert_eq!(
        layout.member_list_state(9).await.unwrap(),
        MemberListState::Incomplete
    );
}

#[tokio::test]
async fn test_recreate_resets_completion() {
    let (store, layout) = kv_store(inline_config());
    store.submit(0, guild_create(1, &[10])).await.unwrap();
    store
        .submit(0, dispatch("GUILD_MEMBERS_COMPLETION", json!({ "guild_id": 1 })))
        .await
        .unwrap();
    assert_eq!(
        layout.member_list_state(1).await.unwrap(),
        MemberListState::Complete
    );

    let previous = store.submit(0, guild_create(1, &[12])).await.unwrap();
    match previous.into_previous() {
        Some(Snapshot::Guild(guild)) => assert_eq!(guild.members, vec![10]),
        other => panic!("expected previous guild, got {:?}", other),
    }
    assert_eq!(
        layout.member_list_state(1).await.unwrap(),
        MemberListState::Incomplete
    );
    // A snapshot's member list may be partial; earlier members are kept.
    let members = list(&store, EntityKind::Member, Scope::Guild { guild_id: 1 }).await;
    assert_eq!(member_ids(&members), BTreeSet::from([10, 12]));
}

#[tokio::test]
async fn test_redelivered_guild_create_keeps_unlisted_records() {
    let (store, _) = kv_store(inline_config());
    store.submit(0, guild_create(1, &[10])).await.unwrap();
    store.submit(0, message_create(11, 100, 10)).await.unwrap();
    store
        .submit(
            0,
            dispatch(
                "GUILD_ROLE_CREATE",
                json!({ "guild_id": 1, "role": { "id": 555, "name": "gone" } }),
            ),
        )
        .await
        .unwrap();
    assert_eq!(count(&store, EntityKind::Role, Scope::Guild { guild_id: 1 }).await, 2);

    store.submit(0, guild_create(1, &[10])).await.unwrap();

    assert!(get_message(&store, 11, 100).await.is_some());
    assert_eq!(
        count(&store, EntityKind::Message, Scope::Channel { channel_id: 11 }).await,
        1
    );
    let channel = store
        .execute(Query::get(EntityKind::Channel, 11))
        .await
        .unwrap()
        .into_entity();
    assert!(matches!(channel, Some(Snapshot::Channel(c)) if c.last_message_id == Some(100)));

    // Roles are listed in full, so one missing from the snapshot is gone.
    let roles = store
        .execute(Query::get_in(EntityKind::Role, 1, 555))
        .await
        .unwrap()
        .into_entity();
    assert!(roles.is_none());
    assert_eq!(count(&store, EntityKind::Role, Scope::Guild { guild_id: 1 }).await, 1);
}

#[tokio::test]
async fn test_redelivered_reaction_counts_once() {
    let (store, _) = kv_store(inline_config());
    store.submit(0, guild_create(1, &[7])).await.unwrap();
    store.submit(0, message_create(11, 100, 7)).await.unwrap();

    let reaction = json!({
        "user_id": 7,
        "channel_id": 11,
        "message_id": 100,
        "guild_id": 1,
        "emoji": { "name": "👍" },
    });
    store
        .submit(0, dispatch("MESSAGE_REACTION_ADD", reaction.clone()))
        .await
        .unwrap();
    store
        .submit(0, dispatch("MESSAGE_REACTION_ADD", reaction.clone()))
        .await
        .unwrap();

    let message = get_message(&store, 11, 100).await.unwrap();
    assert_eq!(message.reactions.len(), 1);
    assert_eq!(message.reactions[0].count, 1);

    store
        .submit(0, dispatch("MESSAGE_REACTION_REMOVE", reaction))
        .await
        .unwrap();
    let message = get_message(&store, 11, 100).await.unwrap();
    assert!(message.reactions.is_empty());
}

#[tokio::test]
async fn test_guild_delete_cascades() {
    let (store, _) = kv_store(inline_config());
    store.submit(0, guild_create(1, &[10, 11])).await.unwrap();
    store.submit(0, message_create(11, 100, 10)).await.unwrap();
    assert_eq!(count(&store, EntityKind::Channel, Scope::Guild { guild_id: 1 }).await, 1);

    let previous = store
        .submit(0, dispatch("GUILD_DELETE", json!({ "id": 1 })))
        .await
        .unwrap();
    assert!(matches!(previous.into_previous(), Some(Snapshot::Guild(_))));

    assert!(list(&store, EntityKind::Channel, Scope::Guild { guild_id: 1 }).await.is_empty());
    assert_eq!(count(&store, EntityKind::Channel, Scope::Guild { guild_id: 1 }).await, 0);
    assert_eq!(count(&store, EntityKind::Channel, Scope::All).await, 0);
    assert_eq!(count(&store, EntityKind::Member, Scope::All).await, 0);
    assert_eq!(count(&store, EntityKind::Role, Scope::All).await, 0);
    assert_eq!(count(&store, EntityKind::Message, Scope::All).await, 0);
    assert_eq!(count(&store, EntityKind::Guild, Scope::All).await, 0);
    // Users are global and outlive the guild.
    assert_eq!(count(&store, EntityKind::User, Scope::All).await, 2);
}

#[tokio::test]
async fn test_channel_delete_removes_messages() {
    let (store, _) = kv_store(inline_config());
    store.submit(0, guild_create(1, &[10])).await.unwrap();
    store.submit(0, message_create(11, 100, 10)).await.unwrap();
    store.submit(0, message_create(11, 101, 10)).await.unwrap();
    assert_eq!(
        count(&store, EntityKind::Message, Scope::Channel { channel_id: 11 }).await,
        2
    );

    store
        .submit(
            0,
            dispatch("CHANNEL_DELETE", json!({ "id": 11, "type": "text", "guild_id": 1 })),
        )
        .await
        .unwrap();
    assert_eq!(
        count(&store, EntityKind::Message, Scope::Channel { channel_id: 11 }).await,
        0
    );
    assert!(get_message(&store, 11, 100).await.is_none());
}

#[tokio::test]
async fn test_idempotent_replay() {
    let (store, _) = kv_store(inline_config());
    let events = vec![
        guild_create(1, &[10, 11]),
        dispatch("GUILD_MEMBER_ADD", json!({ "guild_id": 1, "user": user(12) })),
        message_create(11, 100, 10),
    ];
    for event in &events {
        store.submit(0, event.clone()).await.unwrap();
    }
    let first = list(&store, EntityKind::Member, Scope::Guild { guild_id: 1 }).await;
    let first_guild = store
        .execute(Query::get(EntityKind::Guild, 1))
        .await
        .unwrap()
        .into_entity();

    for event in &events {
        store.submit(0, event.clone()).await.unwrap();
    }
    let second = list(&store, EntityKind::Member, Scope::Guild { guild_id: 1 }).await;
    let second_guild = store
        .execute(Query::get(EntityKind::Guild, 1))
        .await
        .unwrap()
        .into_entity();

    assert_eq!(first, second);
    assert_eq!(first_guild, second_guild);
    assert_eq!(count(&store, EntityKind::Message, Scope::All).await, 1);
}

#[tokio::test]
async fn test_member_add_and_remove_adjust_member_count() {
    let (store, _) = kv_store(inline_config());
    store.submit(0, guild_create(1, &[10])).await.unwrap();
    let add = dispatch("GUILD_MEMBER_ADD", json!({ "guild_id": 1, "user": user(12) }));
    store.submit(0, add.clone()).await.unwrap();
    store.submit(0, add).await.unwrap();

    let member_count = |outcome: Outcome| match outcome.into_entity() {
        Some(Snapshot::Guild(guild)) => guild.member_count,
        other => panic!("expected guild, got {:?}", other),
    };
    let guild = store.execute(Query::get(EntityKind::Guild, 1)).await.unwrap();
    assert_eq!(member_count(guild), 51);

    let removed = store
        .submit(
            0,
            dispatch("GUILD_MEMBER_REMOVE", json!({ "guild_id": 1, "user": user(12) })),
        )
        .await
        .unwrap();
    assert!(matches!(removed.into_previous(), Some(Snapshot::Member(_))));
    let guild = store.execute(Query::get(EntityKind::Guild, 1)).await.unwrap();
    assert_eq!(member_count(guild), 50);
}

#[tokio::test]
async fn test_children_before_guild_are_hidden_then_adopted() {
    let (store, _) = kv_store(inline_config());
    store
        .submit(0, dispatch("GUILD_MEMBER_ADD", json!({ "guild_id": 1, "user": user(20) })))
        .await
        .unwrap();
    assert!(list(&store, EntityKind::Member, Scope::Guild { guild_id: 1 }).await.is_empty());
    assert_eq!(count(&store, EntityKind::Member, Scope::Guild { guild_id: 1 }).await, 0);

    store.submit(0, guild_create(1, &[10])).await.unwrap();
    let members = list(&store, EntityKind::Member, Scope::Guild { guild_id: 1 }).await;
    assert_eq!(member_ids(&members), BTreeSet::from([10, 20]));
}

#[tokio::test]
async fn test_invalidation_only_hides_the_invalidated_shard() {
    let (store, layout) = kv_store(inline_config());
    store.submit(0, guild_create(1, &[10])).await.unwrap();
    store.submit(1, guild_create(2, &[20])).await.unwrap();

    let outcome = store
        .submit(0, dispatch("INVALIDATE_SHARD", json!("SESSION_EXPIRED")))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        Outcome::Invalidated {
            shard: 0,
            generation: Some(1)
        }
    ));

    assert_eq!(count(&store, EntityKind::Guild, Scope::All).await, 1);
    assert!(list(&store, EntityKind::Member, Scope::Guild { guild_id: 1 }).await.is_empty());
    let members = list(&store, EntityKind::Member, Scope::Guild { guild_id: 2 }).await;
    assert_eq!(member_ids(&members), BTreeSet::from([20]));
    // Users are shared between shards.
    assert_eq!(count(&store, EntityKind::User, Scope::All).await, 2);

    // The inline sweep already ran.
    assert!(!layout.tracker().has_pending_sweeps());
    let report = layout.sweep_shard(0).await.unwrap();
    assert_eq!(report.removed, 0);

    store.submit(0, guild_create(1, &[11])).await.unwrap();
    let members = list(&store, EntityKind::Member, Scope::Guild { guild_id: 1 }).await;
    assert_eq!(member_ids(&members), BTreeSet::from([11]));
}

#[tokio::test]
async fn test_filtered_cause_keeps_state() {
    let config = inline_config().with_invalidation_filter([shardcache_store::InvalidationCause::Logout]);
    let (store, _) = kv_store(config);
    store.submit(0, guild_create(1, &[10])).await.unwrap();

    let outcome = store
        .submit(0, dispatch("INVALIDATE_SHARD", json!("RESUMED_WITH_GAP")))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        Outcome::Invalidated {
            generation: None,
            ..
        }
    ));
    assert_eq!(count(&store, EntityKind::Member, Scope::Guild { guild_id: 1 }).await, 1);
}

#[tokio::test]
async fn test_disabled_categories() {
    let flags = StoreFlags::all()
        .with(StoreFlag::Member, false)
        .with(StoreFlag::Message, false);
    let (store, _) = kv_store(inline_config().with_flags(flags));

    store.submit(0, guild_create(1, &[10, 11])).await.unwrap();
    let skipped = store.submit(0, message_create(11, 100, 10)).await.unwrap();
    assert!(skipped.is_skipped());
    let skipped = store
        .submit(0, dispatch("GUILD_MEMBER_ADD", json!({ "guild_id": 1, "user": user(12) })))
        .await
        .unwrap();
    assert!(skipped.is_skipped());

    assert_eq!(count(&store, EntityKind::Member, Scope::Guild { guild_id: 1 }).await, 0);
    assert!(list(&store, EntityKind::Member, Scope::All).await.is_empty());
    assert!(get_message(&store, 11, 100).await.is_none());
    assert!(matches!(
        store.execute(Query::ListExactMembers { guild_id: 1 }).await,
        Err(StoreError::ExactResultNotAvailable { .. })
    ));

    // Other categories inside the guild payload are still stored.
    assert_eq!(count(&store, EntityKind::Role, Scope::Guild { guild_id: 1 }).await, 1);
    assert_eq!(count(&store, EntityKind::Channel, Scope::Guild { guild_id: 1 }).await, 1);
}

#[tokio::test]
async fn test_custom_actions() {
    let (store, _) = kv_store(StoreConfig::default());
    let missing = store
        .execute(CustomAction::new("REBUILD_INDEX", json!({})))
        .await;
    assert!(matches!(missing, Err(StoreError::UnhandledAction(name)) if name == "REBUILD_INDEX"));

    store.submit(0, guild_create(1, &[10])).await.unwrap();
    let state = store
        .execute(CustomAction::new("MEMBER_LIST_STATE", json!({ "guild_id": 1 })))
        .await
        .unwrap()
        .into_custom();
    assert_eq!(state, Some(json!("incomplete")));

    let invalid = store
        .execute(CustomAction::new("MEMBER_LIST_STATE", json!({ "guild": "x" })))
        .await;
    assert!(matches!(invalid, Err(StoreError::InvalidPayload { .. })));

    let shard = store
        .execute(CustomAction::new("SHARD_STATE", json!({})).on_shard(0))
        .await
        .unwrap()
        .into_custom()
        .unwrap();
    assert_eq!(shard["state"], json!("connected"));

    let sweep = store
        .execute(CustomAction::new("SWEEP_SHARD", json!({ "shard": 0 })))
        .await
        .unwrap()
        .into_custom()
        .unwrap();
    assert_eq!(sweep[0]["removed"], json!(0));
}

#[tokio::test]
async fn test_read_after_write_and_updates() {
    let (store, _) = kv_store(inline_config());
    store.submit(0, guild_create(1, &[10])).await.unwrap();

    store
        .submit(
            0,
            dispatch(
                "GUILD_MEMBER_UPDATE",
                json!({ "guild_id": 1, "user": user(10), "roles": [101], "nick": "neo" }),
            ),
        )
        .await
        .unwrap();
    let member = store
        .execute(Query::get_in(EntityKind::Member, 1, 10))
        .await
        .unwrap()
        .into_entity();
    match member {
        Some(Snapshot::Member(Member { nick, roles, .. })) => {
            assert_eq!(nick.as_deref(), Some("neo"));
            assert_eq!(roles, vec![101]);
        }
        other => panic!("expected member, got {:?}", other),
    }

    store
        .submit(0, dispatch("GUILD_ROLE_DELETE", json!({ "guild_id": 1, "role_id": 101 })))
        .await
        .unwrap();
    let member = store
        .execute(Query::get_in(EntityKind::Member, 1, 10))
        .await
        .unwrap()
        .into_entity();
    assert!(matches!(member, Some(Snapshot::Member(m)) if m.roles.is_empty()));

    store.submit(0, message_create(11, 100, 10)).await.unwrap();
    let channel = store
        .execute(Query::get(EntityKind::Channel, 11))
        .await
        .unwrap()
        .into_entity();
    assert!(matches!(channel, Some(Snapshot::Channel(c)) if c.last_message_id == Some(100)));

    store
        .submit(
            0,
            dispatch(
                "MESSAGE_UPDATE",
                json!({ "id": 100, "channel_id": 11, "content": "edited" }),
            ),
        )
        .await
        .unwrap();
    let message = get_message(&store, 11, 100).await.unwrap();
    assert_eq!(message.content, "edited");
}

#[tokio::test]
async fn test_presence_update_reports_previous_user() {
    let (store, _) = kv_store(inline_config());
    store.submit(0, guild_create(1, &[10])).await.unwrap();
    let presence = |name: &str| {
        dispatch(
            "PRESENCE_UPDATE",
            json!({
                "guild_id": 1,
                "user": { "id": 10, "username": name },
                "status": "online",
            }),
        )
    };

    store.submit(0, presence("first")).await.unwrap();
    let outcome = store.submit(0, presence("second")).await.unwrap();
    match outcome {
        Outcome::PresenceAndUser { presence, user } => {
            assert!(presence.is_some());
            assert_eq!(user.unwrap().username, "first");
        }
        other => panic!("expected presence outcome, got {:?}", other),
    }
}

#[tokio::test]
async fn test_user_update_only_touches_known_users() {
    let (store, _) = kv_store(inline_config());
    let unknown = store
        .submit(0, dispatch("USER_UPDATE", json!({ "id": 99, "username": "ghost" })))
        .await
        .unwrap();
    assert!(unknown.into_previous().is_none());
    assert_eq!(count(&store, EntityKind::User, Scope::All).await, 0);

    store.submit(0, guild_create(1, &[10])).await.unwrap();
    let known = store
        .submit(0, dispatch("USER_UPDATE", json!({ "id": 10, "username": "renamed" })))
        .await
        .unwrap();
    assert!(matches!(known.into_previous(), Some(Snapshot::User(u)) if u.username == "user10"));
    let user = store
        .execute(Query::get(EntityKind::User, 10))
        .await
        .unwrap()
        .into_entity();
    assert!(matches!(user, Some(Snapshot::User(u)) if u.username == "renamed"));
}

#[tokio::test]
async fn test_voice_state_leave_removes() {
    let (store, _) = kv_store(inline_config());
    store.submit(0, guild_create(1, &[10])).await.unwrap();
    store
        .submit(
            0,
            dispatch(
                "VOICE_STATE_UPDATE",
                json!({ "guild_id": 1, "channel_id": 12, "user_id": 10 }),
            ),
        )
        .await
        .unwrap();
    assert_eq!(
        count(
            &store,
            EntityKind::VoiceState,
            Scope::GuildChannel {
                guild_id: 1,
                channel_id: 12
            }
        )
        .await,
        1
    );

    store
        .submit(
            0,
            dispatch("VOICE_STATE_UPDATE", json!({ "guild_id": 1, "user_id": 10 })),
        )
        .await
        .unwrap();
    assert_eq!(count(&store, EntityKind::VoiceState, Scope::All).await, 0);
}

#[tokio::test]
async fn test_no_op_store_keeps_nothing() {
    let store = Store::no_op();
    let outcome = store.submit(0, guild_create(1, &[10])).await.unwrap();
    assert!(outcome.is_skipped());
    assert_eq!(count(&store, EntityKind::Guild, Scope::All).await, 0);
}

/// Memory backend that starts failing writes once its budget is spent.
struct FlakyBackend {
    inner: MemoryBackend,
    writes_left: AtomicUsize,
}

impl FlakyBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(),
            writes_left: AtomicUsize::new(usize::MAX),
        })
    }

    fn fail_after(&self, writes: usize) {
        self.writes_left.store(writes, Ordering::SeqCst);
    }

    fn heal(&self) {
        self.fail_after(usize::MAX);
    }

    fn check(&self) -> Result<(), BackendError> {
        self.writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .map(|_| ())
            .map_err(|_| BackendError::Unavailable("disk on fire".to_string()))
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    async fn get(&self, key: &Key) -> Result<Option<Versioned>, BackendError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: Key, value: Vec<u8>) -> Result<u64, BackendError> {
        self.check()?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &Key) -> Result<bool, BackendError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn scan_prefix(
        &self,
        prefix: &Key,
        start_after: Option<&Key>,
        limit: usize,
    ) -> Result<Vec<(Key, Versioned)>, BackendError> {
        self.inner.scan_prefix(prefix, start_after, limit).await
    }

    async fn count(&self, prefix: &Key) -> Result<u64, BackendError> {
        self.inner.count(prefix).await
    }

    async fn compare_and_swap(
        &self,
        key: &Key,
        expected: Option<u64>,
        value: Option<Vec<u8>>,
    ) -> Result<bool, BackendError> {
        self.check()?;
        self.inner.compare_and_swap(key, expected, value).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), BackendError> {
        self.check()?;
        self.inner.commit(batch).await
    }
}

#[tokio::test]
async fn test_backend_failure_propagates_unchanged() {
    let backend = FlakyBackend::new();
    let layout = KvLayout::new(backend.clone(), inline_config());
    let store = Store::from_layout(&layout).unwrap();
    store.submit(0, guild_create(1, &[10])).await.unwrap();

    backend.fail_after(0);
    let failed = store.submit(0, guild_create(2, &[20])).await;
    assert!(matches!(
        failed,
        Err(StoreError::Backend(BackendError::Unavailable(_)))
    ));
    let failed = store.submit(0, message_create(11, 100, 10)).await;
    assert!(matches!(failed, Err(StoreError::Backend(_))));

    // Reads still work and the failed writes left nothing behind.
    assert_eq!(count(&store, EntityKind::Guild, Scope::All).await, 1);
    backend.heal();
    assert!(get_message(&store, 11, 100).await.is_none());
}

async fn member_snapshot(store: &Store, guild_id: Id, user_id: Id) -> Option<Member> {
    match store
        .execute(Query::get_in(EntityKind::Member, guild_id, user_id))
        .await
        .unwrap()
        .into_entity()
    {
        Some(Snapshot::Member(member)) => Some(member),
        _ => None,
    }
}

async fn guild_member_count(store: &Store, guild_id: Id) -> u64 {
    match store
        .execute(Query::get(EntityKind::Guild, guild_id))
        .await
        .unwrap()
        .into_entity()
    {
        Some(Snapshot::Guild(guild)) => guild.member_count,
        other => panic!("expected guild, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_cascades_leave_state_untouched() {
    let backend = FlakyBackend::new();
    let layout = KvLayout::new(backend.clone(), inline_config());
    let store = Store::from_layout(&layout).unwrap();
    store.submit(0, guild_create(1, &[10, 11])).await.unwrap();
    store
        .submit(
            0,
            dispatch("GUILD_MEMBER_UPDATE", json!({ "guild_id": 1, "user": user(10), "roles": [101] })),
        )
        .await
        .unwrap();
    store
        .submit(
            0,
            dispatch(
                "PRESENCE_UPDATE",
                json!({ "guild_id": 1, "user": { "id": 11 }, "status": "online" }),
            ),
        )
        .await
        .unwrap();
    store.submit(0, message_create(11, 100, 10)).await.unwrap();
    store.submit(0, message_create(11, 101, 10)).await.unwrap();

    let role_delete = dispatch("GUILD_ROLE_DELETE", json!({ "guild_id": 1, "role_id": 101 }));
    let member_remove = dispatch("GUILD_MEMBER_REMOVE", json!({ "guild_id": 1, "user": user(11) }));
    let bulk_delete = dispatch(
        "MESSAGE_DELETE_BULK",
        json!({ "ids": [100, 101], "channel_id": 11, "guild_id": 1 }),
    );

    backend.fail_after(0);
    assert!(store.submit(0, role_delete.clone()).await.is_err());
    assert!(store.submit(0, member_remove.clone()).await.is_err());
    assert!(store.submit(0, bulk_delete.clone()).await.is_err());
    backend.heal();

    assert_eq!(count(&store, EntityKind::Role, Scope::Guild { guild_id: 1 }).await, 1);
    assert_eq!(member_snapshot(&store, 1, 10).await.unwrap().roles, vec![101]);
    assert!(member_snapshot(&store, 1, 11).await.is_some());
    assert_eq!(count(&store, EntityKind::Presence, Scope::Guild { guild_id: 1 }).await, 1);
    assert_eq!(guild_member_count(&store, 1).await, 50);
    assert_eq!(
        count(&store, EntityKind::Message, Scope::Channel { channel_id: 11 }).await,
        2
    );

    // Each delete is a single write: a budget of one is enough.
    backend.fail_after(1);
    store.submit(0, role_delete).await.unwrap();
    assert_eq!(count(&store, EntityKind::Role, Scope::Guild { guild_id: 1 }).await, 0);
    assert!(member_snapshot(&store, 1, 10).await.unwrap().roles.is_empty());

    backend.fail_after(1);
    store.submit(0, member_remove).await.unwrap();
    assert!(member_snapshot(&store, 1, 11).await.is_none());
    assert_eq!(count(&store, EntityKind::Presence, Scope::Guild { guild_id: 1 }).await, 0);
    assert_eq!(guild_member_count(&store, 1).await, 49);

    backend.fail_after(1);
    store.submit(0, bulk_delete).await.unwrap();
    assert_eq!(count(&store, EntityKind::Message, Scope::All).await, 0);
}

//! Stateful property testing for guild lifecycle and shard invalidation.
//!
//! Random sequences of guild creates, member changes, guild deletes and
//! shard invalidations run against a `KvLayout` store and a plain model.
//! After every step the store's listings and counts must match the model:
//!
//! - Invalidating a shard drops exactly the state that shard wrote
//! - Members written before their guild stay hidden, then are adopted
//! - Re-creating a live guild keeps members its snapshot leaves out

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest, prop_state_machine};
use serde_json::json;
use tokio::runtime::Runtime;

use shardcache_model::Id;
use shardcache_store::{
    Dispatch, EntityKind, KvLayout, Query, Scope, Snapshot, Store, StoreConfig,
};

const GUILDS: [Id; 4] = [1, 2, 3, 4];
const SHARDS: u32 = 2;

fn owner(guild_id: Id) -> u32 {
    (guild_id % u64::from(SHARDS)) as u32
}

#[derive(Debug, Clone)]
pub enum Step {
    CreateGuild { guild_id: Id, members: BTreeSet<Id> },
    AddMember { guild_id: Id, user_id: Id },
    RemoveMember { guild_id: Id, user_id: Id },
    DeleteGuild { guild_id: Id },
    Invalidate { shard: u32 },
}

/// Members per live guild, and members stored for guilds not created yet.
#[derive(Clone, Debug, Default)]
pub struct StoreModel {
    pub guilds: BTreeMap<Id, BTreeSet<Id>>,
    pub pending: BTreeMap<Id, BTreeSet<Id>>,
}

fn guild_id() -> impl Strategy<Value = Id> {
    prop::sample::select(GUILDS.to_vec())
}

fn user_id() -> impl Strategy<Value = Id> {
    10u64..20
}

impl ReferenceStateMachine for StoreModel {
    type State = Self;
    type Transition = Step;

    fn init_state() -> BoxedStrategy<Self::State> {
        Just(Self::default()).boxed()
    }

    fn transitions(_state: &Self::State) -> BoxedStrategy<Self::Transition> {
        prop_oneof![
            3 => (guild_id(), prop::collection::btree_set(user_id(), 0..4))
                .prop_map(|(guild_id, members)| Step::CreateGuild { guild_id, members }),
            3 => (guild_id(), user_id())
                .prop_map(|(guild_id, user_id)| Step::AddMember { guild_id, user_id }),
            2 => (guild_id(), user_id())
                .prop_map(|(guild_id, user_id)| Step::RemoveMember { guild_id, user_id }),
            1 => guild_id().prop_map(|guild_id| Step::DeleteGuild { guild_id }),
            1 => (0..SHARDS).prop_map(|shard| Step::Invalidate { shard }),
        ]
        .boxed()
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            Step::CreateGuild { guild_id, members } => {
                let mut next = match state.guilds.remove(guild_id) {
                    Some(live) => live,
                    None => state.pending.remove(guild_id).unwrap_or_default(),
                };
                next.extend(members.iter().copied());
                state.guilds.insert(*guild_id, next);
            }
            Step::AddMember { guild_id, user_id } => match state.guilds.get_mut(guild_id) {
                Some(members) => {
                    members.insert(*user_id);
                }
                None => {
                    state.pending.entry(*guild_id).or_default().insert(*user_id);
                }
            },
            Step::RemoveMember { guild_id, user_id } => {
                if let Some(members) = state.guilds.get_mut(guild_id) {
                    members.remove(user_id);
                }
                if let Some(members) = state.pending.get_mut(guild_id) {
                    members.remove(user_id);
                }
            }
            Step::DeleteGuild { guild_id } => {
                state.guilds.remove(guild_id);
                state.pending.remove(guild_id);
            }
            Step::Invalidate { shard } => {
                state.guilds.retain(|g, _| owner(*g) != *shard);
                state.pending.retain(|g, _| owner(*g) != *shard);
            }
        }
        state
    }
}

pub struct StoreHarness {
    runtime: Runtime,
    store: Store,
}

fn dispatch(t: &str, d: serde_json::Value) -> Dispatch {
    serde_json::from_value(json!({ "t": t, "d": d })).unwrap()
}

fn member(guild_id: Id, user_id: Id) -> serde_json::Value {
    json!({
        "guild_id": guild_id,
        "user": { "id": user_id, "username": format!("user{}", user_id) },
    })
}

impl StoreHarness {
    fn new() -> Self {
        let runtime = Runtime::new().expect("Failed to create tokio runtime");
        let layout = KvLayout::in_memory(StoreConfig::default().with_background_sweep(false));
        let store = Store::from_layout(&layout).expect("Failed to build store");
        Self { runtime, store }
    }

    fn apply_step(&self, step: &Step) {
        let (shard, event) = match step {
            Step::CreateGuild { guild_id, members } => (
                owner(*guild_id),
                dispatch(
                    "GUILD_CREATE",
                    json!({
                        "id": guild_id,
                        "name": format!("guild{}", guild_id),
                        "owner_id": 1,
                        "members": members.iter().map(|u| member(*guild_id, *u)).collect::<Vec<_>>(),
                    }),
                ),
            ),
            Step::AddMember { guild_id, user_id } => (
                owner(*guild_id),
                dispatch("GUILD_MEMBER_ADD", member(*guild_id, *user_id)),
            ),
            Step::RemoveMember { guild_id, user_id } => (
                owner(*guild_id),
                dispatch("GUILD_MEMBER_REMOVE", member(*guild_id, *user_id)),
            ),
            Step::DeleteGuild { guild_id } => (
                owner(*guild_id),
                dispatch("GUILD_DELETE", json!({ "id": guild_id })),
            ),
            Step::Invalidate { shard } => {
                (*shard, dispatch("INVALIDATE_SHARD", json!("SESSION_EXPIRED")))
            }
        };
        self.runtime
            .block_on(self.store.submit(shard, event))
            .expect("submit failed");
    }

    fn verify_invariants(&self, model: &StoreModel) {
        self.runtime.block_on(async {
            let guilds = self
                .store
                .execute(Query::count(EntityKind::Guild, Scope::All))
                .await
                .unwrap()
                .count()
                .unwrap();
            assert_eq!(guilds, model.guilds.len() as u64, "guild count");

            for guild_id in GUILDS {
                let scope = Scope::Guild { guild_id };
                let listed: BTreeSet<Id> = self
                    .store
                    .execute(Query::list(EntityKind::Member, scope))
                    .await
                    .unwrap()
                    .collect()
                    .await
                    .unwrap()
                    .unwrap()
                    .into_iter()
                    .filter_map(|s| match s {
                        Snapshot::Member(m) => Some(m.user.id),
                        _ => None,
                    })
                    .collect();
                let expected = model.guilds.get(&guild_id).cloned().unwrap_or_default();
                assert_eq!(listed, expected, "members of guild {}", guild_id);

                let counted = self
                    .store
                    .execute(Query::count(EntityKind::Member, scope))
                    .await
                    .unwrap()
                    .count()
                    .unwrap();
                assert_eq!(counted, expected.len() as u64, "member count of guild {}", guild_id);
            }
        });
    }
}

impl StateMachineTest for StoreHarness {
    type SystemUnderTest = Self;
    type Reference = StoreModel;

    fn init_test(
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        Self::new()
    }

    fn apply(
        state: Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        state.apply_step(&transition);
        state.verify_invariants(ref_state);
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        state.verify_invariants(ref_state);
    }
}

prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 4096,
        ..ProptestConfig::default()
    })]

    #[test]
    fn invalidation_state_machine_test(sequential 1..40 => StoreHarness);
}

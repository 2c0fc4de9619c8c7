//! Event-sourced store for sharded gateway state.
//!
//! The store consumes gateway notifications and answers queries about the
//! current state of guilds, channels, members, messages and the rest. Every
//! request is an [`Action`]; a [`Store`] routes it through an
//! [`ActionMapper`] to the handler registered for its tag.
//!
//! ## Features
//!
//! - **Layouts**: a [`StoreLayout`] contributes a [`DataAccessor`], a
//!   [`GatewayDataUpdater`] and optional custom actions
//! - **KvLayout**: the bundled layout over an ordered key-value [`Backend`]
//! - **Invalidation**: per-shard generations hide a shard's state at once;
//!   sweeps remove it later
//! - **Completeness**: exact member reads only once a guild's member list
//!   is known to be complete
//! - **Flags**: whole categories can be switched off per store

mod accessor;
pub mod action;
pub mod backend;
pub mod codec;
mod config;
mod error;
pub mod key;
pub mod kv;
pub mod layout;
mod outcome;
mod query;
mod repo;
mod store;
mod sweep;
mod tracker;
mod updater;

pub use accessor::DataAccessor;
pub use action::{
    Action, ActionTag, CustomAction, Dispatch, GatewayAction, GatewayKind, apply_dispatch,
};
pub use backend::{Backend, MemoryBackend, Versioned, WriteBatch, WriteOp};
pub use config::{StoreConfig, StoreFlag, StoreFlags};
pub use error::{BackendError, Result, StoreError};
pub use kv::{KvLayout, StoredMessage};
pub use layout::{ActionMapper, ActionMapperBuilder, Handler, StoreLayout, handler};
pub use outcome::{IntoOutcome, Outcome, Snapshot};
pub use query::{EntityKind, Query, Scope};
pub use repo::{EntityStream, Repo};
pub use store::Store;
pub use sweep::SweepReport;
pub use tracker::{InvalidationCause, MemberListState, ShardState, Tracker};
pub use updater::{GatewayDataUpdater, Invalidation};

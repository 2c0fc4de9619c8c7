//! Error types for the store.

use shardcache_model::Id;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Backend cannot serve requests right now.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A guarded batch found a key at another version than expected.
    #[error("write conflict on {0}")]
    Conflict(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Other(String),
}

/// Errors that can occur when executing store actions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An authoritative member list was requested before the guild's member
    /// list was known to be complete.
    #[error("exact result not available: member list of guild {guild_id} is incomplete")]
    ExactResultNotAvailable { guild_id: Id },

    /// No handler is registered for the action tag.
    #[error("no handler registered for action {0}")]
    UnhandledAction(String),

    /// Two mappers declared a handler for the same tag.
    #[error("duplicate handler for action {0}")]
    DuplicateHandler(String),

    /// A handler received an action of another kind.
    #[error("handler received mismatched action {0}")]
    MismatchedAction(String),

    /// The entity cannot be queried with the given scope.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// A custom action payload could not be decoded.
    #[error("invalid payload for action {action}: {reason}")]
    InvalidPayload { action: String, reason: String },

    /// Storage backend failure, propagated unchanged.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Stored value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

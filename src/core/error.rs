//! Structured error types.
//!
//! Every failure path either completes a state transition or leaves state
//! untouched for retry; the variants below classify which collaborator
//! failed so the agent loop can decide between retrying, aborting, and
//! refusing to start.

use crate::core::hook::HookKind;
use crate::core::names::RelationId;
use std::path::PathBuf;

/// Errors surfaced by the relation engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Sentinel returned by a resolver with nothing to do.
    #[error("no operations pending")]
    NoOperation,

    /// The abort signal fired before a controller call.
    #[error("operation aborted")]
    Aborted,

    /// IO error from the state store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// State record failed to serialize.
    #[error("state encoding failed: {0}")]
    Encode(#[from] serde_yaml::Error),

    /// A persisted state file or directory could not be parsed. Fatal at
    /// startup; the store is trusted afterwards.
    #[error("corrupt relation state at {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    /// Transient controller RPC failure; the agent retries next tick.
    #[error("controller request {method} failed: {reason}")]
    Rpc { method: &'static str, reason: String },

    /// The controller no longer knows the entity.
    #[error("{entity} not found")]
    NotFound { entity: String },

    /// A hook was routed to a relation the tracker does not hold.
    #[error("relation {relation_id} is not tracked")]
    UnknownRelation { relation_id: RelationId },

    /// A hook does not match the relation's current state.
    #[error("cannot run {kind} for relation {relation_id}: {reason}")]
    InvalidHook {
        kind: HookKind,
        relation_id: RelationId,
        reason: String,
    },

    /// A unit or application name failed validation.
    #[error("invalid {kind} name {name:?}")]
    InvalidName { kind: &'static str, name: String },

    /// The charm metadata could not be read or parsed.
    #[error("charm metadata error: {0}")]
    Metadata(String),
}

impl Error {
    /// Builds a not-found error for a named entity.
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    /// True for the resolver's nothing-to-do sentinel.
    #[must_use]
    pub const fn is_no_operation(&self) -> bool {
        matches!(self, Self::NoOperation)
    }

    /// True when the controller reported the entity gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for relation engine operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Persistence layer: the per-relation member state store.

pub mod state_store;

pub use state_store::{MemberState, RelationState, StateStore};

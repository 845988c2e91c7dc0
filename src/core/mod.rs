//! Core domain types: names, lifecycles, endpoints, hooks, snapshots.

pub mod charm;
pub mod endpoint;
pub mod error;
pub mod hook;
pub mod life;
pub mod names;
pub mod snapshot;

//! Remote state snapshots delivered by the watcher, and the slice of
//! agent-local state the resolvers consult.

use crate::core::life::Life;
use crate::core::names::{ApplicationName, RelationId, UnitName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The controller's view of one relation at a given tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSnapshot {
    pub life: Life,
    #[serde(default)]
    pub suspended: bool,
    /// Change version last broadcast by each remote unit.
    #[serde(default)]
    pub members: BTreeMap<UnitName, i64>,
    /// Per-application change versions.
    #[serde(default)]
    pub application_members: BTreeMap<ApplicationName, i64>,
}

/// The controller's view of this unit and all its relations at one tick.
///
/// Snapshots are observed whole; intermediate ones may be coalesced by the
/// watcher, so only the most recent matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// The unit's own life.
    pub life: Life,
    #[serde(default)]
    pub relations: BTreeMap<RelationId, RelationSnapshot>,
}

/// Agent-local facts the resolvers need.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalState {
    /// True once the charm's install hook has committed;
    /// `relation-created` may only fire afterwards.
    pub installed: bool,
}

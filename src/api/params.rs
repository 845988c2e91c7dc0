//! Wire records exchanged with the controller.

use crate::core::endpoint::Endpoint;
use crate::core::life::Life;
use crate::core::names::{ApplicationName, RelationId};
use serde::{Deserialize, Serialize};

/// Identifier of an established watcher; the watcher plumbing itself lives
/// outside the engine.
pub type WatcherId = String;

/// How a previously failed hook was resolved by the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvedMode {
    #[default]
    None,
    RetryHooks,
    NoHooks,
}

/// Result of `Refresh`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRefresh {
    pub life: Life,
    #[serde(default)]
    pub resolved: ResolvedMode,
}

/// One entry of `RelationsStatus`: the controller's belief about this
/// unit's participation in a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationUnitStatus {
    /// Relation key, e.g. `wordpress:db mysql:db`.
    pub key: String,
    pub in_scope: bool,
    #[serde(default)]
    pub suspended: bool,
}

/// Full relation record from `Relation` / `RelationById`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub id: RelationId,
    pub key: String,
    pub life: Life,
    #[serde(default)]
    pub suspended: bool,
    /// The application on the other side of the relation.
    pub other_application: ApplicationName,
    /// This unit's endpoint.
    pub endpoint: Endpoint,
}

/// Relation status values a leader may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationStatus {
    Joined,
    Suspended,
    Broken,
}

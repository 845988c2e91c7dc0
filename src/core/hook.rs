//! Relation hook descriptions handed to the executor.

use crate::core::names::{unit_application, ApplicationName, RelationId, UnitName};
use serde::{Deserialize, Serialize};

/// The relation hook kinds, in canonical firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    RelationCreated,
    RelationJoined,
    RelationChanged,
    RelationDeparted,
    RelationBroken,
}

impl HookKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RelationCreated => "relation-created",
            Self::RelationJoined => "relation-joined",
            Self::RelationChanged => "relation-changed",
            Self::RelationDeparted => "relation-departed",
            Self::RelationBroken => "relation-broken",
        }
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selected hook: the kind discriminant plus the fields relevant to that
/// kind. Unused fields stay empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookInfo {
    pub kind: HookKind,
    pub relation_id: RelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_unit: Option<UnitName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_application: Option<ApplicationName>,
    #[serde(default)]
    pub change_version: i64,
}

impl HookInfo {
    /// `relation-created` for the remote application.
    #[must_use]
    pub fn created(relation_id: RelationId, remote_application: impl Into<String>) -> Self {
        Self {
            kind: HookKind::RelationCreated,
            relation_id,
            remote_unit: None,
            remote_application: Some(remote_application.into()),
            change_version: 0,
        }
    }

    /// `relation-joined` for a remote unit at the given change version.
    #[must_use]
    pub fn joined(relation_id: RelationId, remote_unit: impl Into<String>, version: i64) -> Self {
        Self::unit_hook(HookKind::RelationJoined, relation_id, remote_unit, version)
    }

    /// `relation-changed` for a remote unit.
    #[must_use]
    pub fn changed(relation_id: RelationId, remote_unit: impl Into<String>, version: i64) -> Self {
        Self::unit_hook(HookKind::RelationChanged, relation_id, remote_unit, version)
    }

    /// Application-level `relation-changed`.
    #[must_use]
    pub fn changed_application(
        relation_id: RelationId,
        remote_application: impl Into<String>,
        version: i64,
    ) -> Self {
        Self {
            kind: HookKind::RelationChanged,
            relation_id,
            remote_unit: None,
            remote_application: Some(remote_application.into()),
            change_version: version,
        }
    }

    /// `relation-departed` for a remote unit.
    #[must_use]
    pub fn departed(relation_id: RelationId, remote_unit: impl Into<String>, version: i64) -> Self {
        Self::unit_hook(HookKind::RelationDeparted, relation_id, remote_unit, version)
    }

    /// `relation-broken`; terminal for the relation.
    #[must_use]
    pub fn broken(relation_id: RelationId) -> Self {
        Self {
            kind: HookKind::RelationBroken,
            relation_id,
            remote_unit: None,
            remote_application: None,
            change_version: 0,
        }
    }

    fn unit_hook(
        kind: HookKind,
        relation_id: RelationId,
        remote_unit: impl Into<String>,
        version: i64,
    ) -> Self {
        let remote_unit = remote_unit.into();
        let remote_application = unit_application(&remote_unit).ok().map(ToOwned::to_owned);
        Self {
            kind,
            relation_id,
            remote_unit: Some(remote_unit),
            remote_application,
            change_version: version,
        }
    }
}

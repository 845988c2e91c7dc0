//! The slice of charm metadata the relation engine consumes: which
//! relation endpoints the charm declares, under which role.

use crate::core::endpoint::{EndpointScope, Role, IMPLICIT_RELATION_NAME};
use crate::core::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A relation declared in `metadata.yaml`. The short form names only the
/// interface; the long form adds scope and limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RelationDefinition {
    Interface(String),
    Detailed {
        interface: String,
        #[serde(default)]
        scope: Option<EndpointScope>,
        #[serde(default)]
        limit: Option<u32>,
        #[serde(default)]
        optional: bool,
    },
}

impl RelationDefinition {
    #[must_use]
    pub fn interface(&self) -> &str {
        match self {
            Self::Interface(interface) => interface,
            Self::Detailed { interface, .. } => interface,
        }
    }

    #[must_use]
    pub fn scope(&self) -> EndpointScope {
        match self {
            Self::Interface(_) => EndpointScope::Global,
            Self::Detailed { scope, .. } => scope.unwrap_or_default(),
        }
    }
}

/// Parsed charm metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct CharmMetadata {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub provides: BTreeMap<String, RelationDefinition>,
    #[serde(default)]
    pub requires: BTreeMap<String, RelationDefinition>,
    #[serde(default)]
    pub peers: BTreeMap<String, RelationDefinition>,
}

impl CharmMetadata {
    /// Reads `metadata.yaml` from the charm directory.
    ///
    /// # Errors
    /// Returns `Error::Metadata` if the file is missing or malformed.
    pub fn load(charm_dir: &Path) -> Result<Self> {
        let path = charm_dir.join("metadata.yaml");
        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::Metadata(format!("{}: {e}", path.display())))?;
        serde_yaml::from_str(&raw).map_err(|e| Error::Metadata(format!("{}: {e}", path.display())))
    }

    /// Looks up a declared relation by name, with the role implied by its
    /// section.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<(Role, &RelationDefinition)> {
        if let Some(def) = self.provides.get(name) {
            return Some((Role::Provider, def));
        }
        if let Some(def) = self.requires.get(name) {
            return Some((Role::Requirer, def));
        }
        if let Some(def) = self.peers.get(name) {
            return Some((Role::Peer, def));
        }
        None
    }

    /// Whether the charm can participate in a relation under this name.
    /// Every charm implicitly provides the reserved `juju-info` endpoint.
    #[must_use]
    pub fn implements(&self, name: &str) -> bool {
        name == IMPLICIT_RELATION_NAME || self.relation(name).is_some()
    }
}

//! Relation endpoints as declared by charm metadata.

use crate::core::names::ApplicationName;
use serde::{Deserialize, Serialize};

/// The reserved interface name whose relations never generate hooks.
pub const IMPLICIT_RELATION_NAME: &str = "juju-info";

/// Which side of a relation an endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Provider,
    Requirer,
    Peer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider => write!(f, "provider"),
            Self::Requirer => write!(f, "requirer"),
            Self::Peer => write!(f, "peer"),
        }
    }
}

/// Visibility scope of an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointScope {
    #[default]
    Global,
    /// Restricted to units co-located on one machine; how subordinates are
    /// bound to their principal.
    Container,
}

/// One side of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// The application this endpoint belongs to.
    pub application: ApplicationName,
    /// The relation name declared in charm metadata.
    pub name: String,
    pub role: Role,
    pub interface: String,
    #[serde(default)]
    pub scope: EndpointScope,
}

impl Endpoint {
    /// Implicit relations are carried over the reserved `juju-info` name
    /// and never generate hooks.
    #[must_use]
    pub fn is_implicit(&self) -> bool {
        self.name == IMPLICIT_RELATION_NAME
    }

    #[must_use]
    pub fn is_container_scoped(&self) -> bool {
        self.scope == EndpointScope::Container
    }
}

//! The controller surface the relation engine calls, as injected
//! capabilities.
//!
//! The engine depends only on operation signatures; the agent wires in the
//! real RPC client, leadership tracker, and subordinate destroyer, which
//! makes every decision path testable with recorded call scripts.

pub mod params;

use crate::core::error::{Error, Result};
use crate::core::names::{RelationId, UnitName};
use params::{RelationRecord, RelationStatus, RelationUnitStatus, UnitRefresh, WatcherId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Client for the controller's per-unit RPC surface.
pub trait ControllerClient: Send + Sync {
    /// Refreshes the unit's own life and resolved mode.
    fn refresh(&self, unit: &str) -> Result<UnitRefresh>;

    /// Returns the principal unit if `unit` is a subordinate.
    fn principal(&self, unit: &str) -> Result<Option<UnitName>>;

    /// The controller's current (relation, in-scope) view for the unit.
    fn relations_status(&self, unit: &str) -> Result<Vec<RelationUnitStatus>>;

    /// Fetches a relation record by controller-assigned id.
    fn relation_by_id(&self, id: RelationId) -> Result<RelationRecord>;

    /// Fetches the relation record for a relation key, scoped to the unit.
    fn relation(&self, key: &str, unit: &str) -> Result<RelationRecord>;

    /// Establishes a watcher for the unit's relation events.
    fn watch(&self, unit: &str) -> Result<WatcherId>;

    fn enter_scope(&self, key: &str, unit: &str) -> Result<()>;

    fn leave_scope(&self, key: &str, unit: &str) -> Result<()>;

    /// Reports relation status; only the application leader may call this.
    fn set_relation_status(
        &self,
        unit: &str,
        id: RelationId,
        status: RelationStatus,
    ) -> Result<()>;

    /// Asks the controller to destroy a unit.
    fn destroy(&self, unit: &str) -> Result<()>;
}

/// Leadership facts for this unit's application.
pub trait LeadershipContext: Send {
    /// Whether this unit is currently the application leader.
    fn is_leader(&self) -> Result<bool>;
}

/// Capability to queue every subordinate of a principal for destruction.
pub trait SubordinateDestroyer: Send {
    fn destroy_all_subordinates(&self) -> Result<()>;
}

/// Shared abort signal, checked before every controller call. Triggering
/// it unwinds the current resolve with no persistence mutations.
#[derive(Debug, Clone, Default)]
pub struct Abort(Arc<AtomicBool>);

impl Abort {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// # Errors
    /// Returns `Error::Aborted` once the signal has been triggered.
    pub fn check(&self) -> Result<()> {
        if self.is_triggered() {
            return Err(Error::Aborted);
        }
        Ok(())
    }
}

//! Per-relation facade: scope membership, hook validation, and the commit
//! rules that keep the persistent member state in step with hook history.

use crate::api::params::RelationRecord;
use crate::api::ControllerClient;
use crate::core::endpoint::Endpoint;
use crate::core::error::{Error, Result};
use crate::core::hook::{HookInfo, HookKind};
use crate::core::life::Life;
use crate::core::names::{ApplicationName, RelationId, UnitName};
use crate::storage::{MemberState, RelationState, StateStore};
use std::sync::Arc;
use tracing::debug;

/// Manages this unit's presence in one relation.
pub struct Relationer {
    client: Arc<dyn ControllerClient>,
    unit: UnitName,
    record: RelationRecord,
    state: RelationState,
    store: Arc<StateStore>,
    in_scope: bool,
    dying: bool,
}

impl Relationer {
    pub fn new(
        client: Arc<dyn ControllerClient>,
        store: Arc<StateStore>,
        unit: UnitName,
        record: RelationRecord,
        state: RelationState,
    ) -> Self {
        let dying = !record.life.is_alive();
        Self {
            client,
            unit,
            record,
            state,
            store,
            in_scope: false,
            dying,
        }
    }

    #[must_use]
    pub fn id(&self) -> RelationId {
        self.record.id
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.record.key
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.record.endpoint
    }

    #[must_use]
    pub fn remote_application(&self) -> &ApplicationName {
        &self.record.other_application
    }

    #[must_use]
    pub fn state(&self) -> &RelationState {
        &self.state
    }

    #[must_use]
    pub fn life(&self) -> Life {
        self.record.life
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.record.suspended
    }

    #[must_use]
    pub fn is_dying(&self) -> bool {
        self.dying
    }

    #[must_use]
    pub fn is_in_scope(&self) -> bool {
        self.in_scope
    }

    /// Implicit relations never generate hooks.
    #[must_use]
    pub fn is_implicit(&self) -> bool {
        self.record.endpoint.is_implicit()
    }

    pub fn update_suspended(&mut self, suspended: bool) {
        self.record.suspended = suspended;
    }

    /// Enters the relation scope. Idempotent.
    ///
    /// # Errors
    /// Surfaces the `EnterScope` RPC failure; scope state is unchanged.
    pub fn join(&mut self) -> Result<()> {
        if self.in_scope {
            return Ok(());
        }
        self.client.enter_scope(&self.record.key, &self.unit)?;
        self.in_scope = true;
        debug!(relation_id = self.record.id, "entered scope");
        Ok(())
    }

    /// Marks the relation Dying. Does not leave scope, except for implicit
    /// relations, which have no broken hook to wait for.
    ///
    /// # Errors
    /// Surfaces the `LeaveScope` RPC failure for implicit relations.
    pub fn set_dying(&mut self) -> Result<()> {
        if self.is_implicit() && !self.dying {
            self.leave_scope()?;
        }
        self.dying = true;
        if self.record.life.can_become(Life::Dying) {
            self.record.life = Life::Dying;
        }
        Ok(())
    }

    /// Leaves the relation scope. Idempotent.
    ///
    /// # Errors
    /// Surfaces the `LeaveScope` RPC failure; scope state is unchanged.
    pub fn leave_scope(&mut self) -> Result<()> {
        if !self.in_scope {
            return Ok(());
        }
        self.client.leave_scope(&self.record.key, &self.unit)?;
        self.in_scope = false;
        debug!(relation_id = self.record.id, "left scope");
        Ok(())
    }

    /// Validates a hook against the relation's current state and returns a
    /// short description for logging. Persists nothing.
    ///
    /// # Errors
    /// Returns `Error::InvalidHook` when the hook cannot run now.
    pub fn prepare_hook(&self, info: &HookInfo) -> Result<String> {
        self.validate(info)?;
        Ok(format!("{}:{}", self.record.endpoint.name, info.kind))
    }

    /// Applies a committed hook to the store and the in-memory mirror. The
    /// store is written first; on failure the mirror is untouched and the
    /// hook stays uncommitted.
    ///
    /// # Errors
    /// Surfaces store IO failures; the caller retries the same hook.
    pub fn commit_hook(&mut self, info: &HookInfo) -> Result<()> {
        self.validate(info)?;
        let relation_id = self.record.id;
        match info.kind {
            HookKind::RelationCreated => {}
            HookKind::RelationJoined => {
                let member = required_unit(info)?;
                self.store
                    .write(relation_id, member, info.change_version, true)?;
                self.state.members.insert(
                    member.to_string(),
                    MemberState {
                        change_version: info.change_version,
                        changed_pending: true,
                    },
                );
            }
            HookKind::RelationChanged => {
                let member = match (&info.remote_unit, &info.remote_application) {
                    (Some(unit), _) => unit.as_str(),
                    (None, Some(app)) => app.as_str(),
                    (None, None) => return Err(self.invalid(info, "no member named")),
                };
                self.store
                    .write(relation_id, member, info.change_version, false)?;
                let entry = MemberState {
                    change_version: info.change_version,
                    changed_pending: false,
                };
                if info.remote_unit.is_some() {
                    self.state.members.insert(member.to_string(), entry);
                } else {
                    self.state
                        .application_members
                        .insert(member.to_string(), entry);
                }
            }
            HookKind::RelationDeparted => {
                let member = required_unit(info)?;
                self.store.remove(relation_id, member)?;
                self.state.members.remove(member);
            }
            HookKind::RelationBroken => {
                self.store.remove_all(relation_id)?;
                self.leave_scope()?;
                self.state.members.clear();
                self.state.application_members.clear();
            }
        }
        debug!(relation_id, kind = %info.kind, "committed hook");
        Ok(())
    }

    fn validate(&self, info: &HookInfo) -> Result<()> {
        if info.relation_id != self.record.id {
            return Err(self.invalid(info, "routed to the wrong relation"));
        }
        if self.is_implicit() {
            return Err(self.invalid(info, "implicit relations never run hooks"));
        }
        match info.kind {
            HookKind::RelationCreated => Ok(()),
            HookKind::RelationJoined => {
                let member = required_unit(info)?;
                if self.state.members.contains_key(member) {
                    return Err(self.invalid(info, "unit already joined"));
                }
                Ok(())
            }
            HookKind::RelationChanged => {
                if let Some(member) = &info.remote_unit {
                    if !self.state.members.contains_key(member) {
                        return Err(self.invalid(info, "unit has not joined"));
                    }
                }
                Ok(())
            }
            HookKind::RelationDeparted => {
                let member = required_unit(info)?;
                if !self.state.members.contains_key(member) {
                    return Err(self.invalid(info, "unit has not joined"));
                }
                Ok(())
            }
            HookKind::RelationBroken => {
                if !self.state.members.is_empty() {
                    return Err(self.invalid(info, "members are still present"));
                }
                Ok(())
            }
        }
    }

    fn invalid(&self, info: &HookInfo, reason: &str) -> Error {
        Error::InvalidHook {
            kind: info.kind,
            relation_id: self.record.id,
            reason: reason.to_string(),
        }
    }
}

fn required_unit(info: &HookInfo) -> Result<&str> {
    info.remote_unit.as_deref().ok_or(Error::InvalidHook {
        kind: info.kind,
        relation_id: info.relation_id,
        reason: "no remote unit named".to_string(),
    })
}

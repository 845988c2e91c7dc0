//! The unit-wide relation state tracker: owns every Relationer, keeps
//! their scopes synchronized with remote snapshots, and routes hook
//! prepare/commit to the owning relation.

use crate::api::params::{RelationRecord, RelationStatus, ResolvedMode, WatcherId};
use crate::api::{Abort, ControllerClient, LeadershipContext, SubordinateDestroyer};
use crate::core::charm::CharmMetadata;
use crate::core::endpoint::Endpoint;
use crate::core::error::{Error, Result};
use crate::core::hook::{HookInfo, HookKind};
use crate::core::life::Life;
use crate::core::names::{unit_application, ApplicationName, RelationId, UnitName};
use crate::core::snapshot::RemoteSnapshot;
use crate::relation::relationer::Relationer;
use crate::storage::{RelationState, StateStore};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Construction inputs for [`RelationStateTracker`].
pub struct RelationStateTrackerConfig {
    pub client: Arc<dyn ControllerClient>,
    pub unit: UnitName,
    /// Charm directory; `metadata.yaml` decides which endpoints exist.
    pub charm_dir: PathBuf,
    /// Root of the persistent relation state (`relations/`).
    pub relations_dir: PathBuf,
    pub leadership: Box<dyn LeadershipContext>,
    pub abort: Abort,
}

/// A snapshot of one relation's tracked view, for hook contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    pub endpoint: Endpoint,
    pub remote_application: ApplicationName,
    pub life: Life,
    pub suspended: bool,
    pub in_scope: bool,
    /// Members last seen, with the change version last processed.
    pub members: BTreeMap<UnitName, i64>,
    pub application_members: BTreeMap<ApplicationName, i64>,
    /// Members whose follow-up `relation-changed` is still owed.
    pub changed_pending: BTreeSet<UnitName>,
}

/// Aggregates all Relationers for the unit.
pub struct RelationStateTracker {
    client: Arc<dyn ControllerClient>,
    unit: UnitName,
    charm: CharmMetadata,
    store: Arc<StateStore>,
    leadership: Box<dyn LeadershipContext>,
    abort: Abort,
    life: Life,
    resolved: ResolvedMode,
    principal: Option<UnitName>,
    relationers: BTreeMap<RelationId, Relationer>,
    watchers: BTreeMap<RelationId, WatcherId>,
    /// Relations whose `relation-created` has committed (or which were
    /// already in scope when the tracker started).
    created: BTreeSet<RelationId>,
    /// Relations whose `relation-broken` has committed; nothing may fire
    /// for them again.
    broken: BTreeSet<RelationId>,
    destroy_requested: bool,
    subordinates_destroyed: bool,
}

impl RelationStateTracker {
    /// Builds the tracker from the controller's current view and the
    /// persisted state on disk. Persisted relations the controller no
    /// longer lists are dangling remnants of broken relations and are
    /// deleted.
    ///
    /// # Errors
    /// Fails on RPC errors, abort, or corrupt persisted state (fatal).
    pub fn new(config: RelationStateTrackerConfig) -> Result<Self> {
        let charm = CharmMetadata::load(&config.charm_dir)?;

        config.abort.check()?;
        let refresh = config.client.refresh(&config.unit)?;
        config.abort.check()?;
        let principal = config.client.principal(&config.unit)?;
        config.abort.check()?;
        let statuses = config.client.relations_status(&config.unit)?;

        let store = Arc::new(StateStore::open(&config.relations_dir)?);
        let mut states = store.load()?;

        let mut records = Vec::with_capacity(statuses.len());
        for status in &statuses {
            config.abort.check()?;
            match config.client.relation(&status.key, &config.unit) {
                // Already broken controller-side; any state it left behind
                // is collected with the dangling directories below.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
                Ok(record) => records.push((record, status.in_scope)),
            }
        }

        let live: BTreeSet<RelationId> = records.iter().map(|(r, _)| r.id).collect();
        let dangling: Vec<RelationId> =
            states.keys().copied().filter(|id| !live.contains(id)).collect();
        for id in dangling {
            warn!(relation_id = id, "removing dangling state for unknown relation");
            store.remove_all(id)?;
            states.remove(&id);
        }

        let mut tracker = Self {
            client: config.client,
            unit: config.unit,
            charm,
            store,
            leadership: config.leadership,
            abort: config.abort,
            life: refresh.life,
            resolved: refresh.resolved,
            principal,
            relationers: BTreeMap::new(),
            watchers: BTreeMap::new(),
            created: BTreeSet::new(),
            broken: BTreeSet::new(),
            destroy_requested: false,
            subordinates_destroyed: false,
        };

        for (record, in_scope) in records {
            if !in_scope {
                continue;
            }
            let id = record.id;
            let state = states.remove(&id).unwrap_or_else(|| RelationState::new(id));
            // Already in scope means relation-created fired in a previous
            // incarnation of this agent.
            if tracker.add_relation(record, state, true)? {
                tracker.created.insert(id);
            }
        }
        Ok(tracker)
    }

    /// Reconciles the tracked relations against a remote snapshot: starts
    /// tracking new relations, marks vanished or dying ones, and
    /// propagates destruction between principals and subordinates.
    ///
    /// Idempotent for a fixed snapshot.
    ///
    /// # Errors
    /// Fails on RPC errors or abort; no persistence is mutated on failure
    /// paths other than dropping state of already-dead relations.
    pub fn synchronize_scopes(
        &mut self,
        remote: &RemoteSnapshot,
        destroyer: Option<&dyn SubordinateDestroyer>,
    ) -> Result<()> {
        if self.life.can_become(remote.life) {
            self.life = remote.life;
        }

        for (&id, snap) in &remote.relations {
            if self.broken.contains(&id) {
                continue;
            }
            if let Some(rel) = self.relationers.get_mut(&id) {
                rel.update_suspended(snap.suspended);
                if !snap.life.is_alive() || remote.life == Life::Dying {
                    if !rel.is_dying() {
                        debug!(relation_id = id, "relation is dying");
                        rel.set_dying()?;
                    }
                } else if self.created.contains(&id) && !rel.is_in_scope() {
                    // Scope entry failed after the created-commit; repair.
                    self.abort.check()?;
                    rel.join()?;
                }
                continue;
            }
            // A new relation id. Dying or suspended strangers owe no
            // hooks and are never tracked.
            if !snap.life.is_alive() || snap.suspended {
                continue;
            }
            self.abort.check()?;
            let record = match self.client.relation_by_id(id) {
                Ok(record) => record,
                Err(e) if e.is_not_found() => {
                    self.store.remove_all(id)?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.abort.check()?;
            let record = match self.client.relation(&record.key, &self.unit) {
                Ok(record) => record,
                Err(e) if e.is_not_found() => {
                    self.store.remove_all(id)?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            // Implicit relations never hook, so they enter scope at once;
            // everything else waits for its relation-created commit.
            let join = record.endpoint.is_implicit() || self.created.contains(&id);
            self.add_relation(record, RelationState::new(id), join)?;
        }

        // Tracked relations absent from the snapshot are Dying. Ones that
        // never fired relation-created owe no hooks at all and are dropped.
        let absent: Vec<RelationId> = self
            .relationers
            .keys()
            .copied()
            .filter(|id| !remote.relations.contains_key(id))
            .collect();
        for id in absent {
            if self.created.contains(&id) {
                let rel = self.relationers.get_mut(&id).expect("tracked relation");
                if !rel.is_dying() {
                    debug!(relation_id = id, "relation vanished from snapshot");
                    rel.set_dying()?;
                }
            } else {
                debug!(relation_id = id, "relation gone before relation-created");
                self.relationers.remove(&id);
                self.watchers.remove(&id);
                self.store.remove_all(id)?;
            }
        }

        if remote.life == Life::Dying && !self.is_subordinate() && !self.subordinates_destroyed {
            if let Some(destroyer) = destroyer {
                info!(unit = %self.unit, "unit is dying; destroying all subordinates");
                destroyer.destroy_all_subordinates()?;
                self.subordinates_destroyed = true;
            }
        }
        if self.is_subordinate() {
            self.maybe_destroy_self(remote)?;
        }
        Ok(())
    }

    /// Validates a hook with the owning relation and returns its
    /// description.
    ///
    /// # Errors
    /// `Error::UnknownRelation` for untracked ids, `Error::InvalidHook`
    /// from the relation itself.
    pub fn prepare_hook(&self, info: &HookInfo) -> Result<String> {
        self.relationer_for(info.relation_id)?.prepare_hook(info)
    }

    /// Commits a hook that the executor has finished running.
    ///
    /// Committing `relation-created` enters the relation scope (and
    /// reports Joined status if this unit leads the application);
    /// committing `relation-broken` removes the relation from the tracker
    /// for good.
    ///
    /// # Errors
    /// Surfaces store and RPC failures; the hook stays uncommitted.
    pub fn commit_hook(&mut self, info: &HookInfo) -> Result<()> {
        let id = info.relation_id;
        match info.kind {
            HookKind::RelationCreated => {
                let rel = self
                    .relationers
                    .get_mut(&id)
                    .ok_or(Error::UnknownRelation { relation_id: id })?;
                rel.commit_hook(info)?;
                self.created.insert(id);
                self.abort.check()?;
                let rel = self.relationers.get_mut(&id).expect("tracked relation");
                rel.join()?;
                if self.leadership.is_leader()? {
                    self.abort.check()?;
                    self.client
                        .set_relation_status(&self.unit, id, RelationStatus::Joined)?;
                }
            }
            HookKind::RelationBroken => {
                let rel = self
                    .relationers
                    .get_mut(&id)
                    .ok_or(Error::UnknownRelation { relation_id: id })?;
                rel.commit_hook(info)?;
                self.relationers.remove(&id);
                self.watchers.remove(&id);
                self.broken.insert(id);
                info!(relation_id = id, "relation is broken");
            }
            _ => {
                self.relationers
                    .get_mut(&id)
                    .ok_or(Error::UnknownRelation { relation_id: id })?
                    .commit_hook(info)?;
            }
        }
        Ok(())
    }

    /// Snapshot of the current per-relation view.
    #[must_use]
    pub fn get_info(&self) -> BTreeMap<RelationId, RelationInfo> {
        self.relationers
            .iter()
            .map(|(&id, rel)| {
                let state = rel.state();
                (
                    id,
                    RelationInfo {
                        endpoint: rel.endpoint().clone(),
                        remote_application: rel.remote_application().clone(),
                        life: rel.life(),
                        suspended: rel.is_suspended(),
                        in_scope: rel.is_in_scope(),
                        members: state
                            .members
                            .iter()
                            .map(|(m, s)| (m.clone(), s.change_version))
                            .collect(),
                        application_members: state
                            .application_members
                            .iter()
                            .map(|(m, s)| (m.clone(), s.change_version))
                            .collect(),
                        changed_pending: state
                            .members
                            .iter()
                            .filter(|(_, s)| s.changed_pending)
                            .map(|(m, _)| m.clone())
                            .collect(),
                    },
                )
            })
            .collect()
    }

    /// Whether the tracker holds a live Relationer for this id.
    #[must_use]
    pub fn is_known(&self, id: RelationId) -> bool {
        self.relationers.contains_key(&id)
    }

    /// # Errors
    /// `Error::UnknownRelation` for untracked ids.
    pub fn is_implicit(&self, id: RelationId) -> Result<bool> {
        Ok(self.relationer_for(id)?.is_implicit())
    }

    /// Whether `relation-created` has fired (or the relation predates this
    /// agent incarnation, which implies it).
    #[must_use]
    pub fn relation_created(&self, id: RelationId) -> bool {
        self.created.contains(&id)
    }

    /// Whether `relation-broken` has been committed for this id.
    #[must_use]
    pub fn broken_emitted(&self, id: RelationId) -> bool {
        self.broken.contains(&id)
    }

    /// The application on the other side of a tracked relation.
    #[must_use]
    pub fn remote_application(&self, id: RelationId) -> Option<&ApplicationName> {
        self.relationers.get(&id).map(Relationer::remote_application)
    }

    /// The persisted member state mirror for a tracked relation.
    #[must_use]
    pub fn local_state(&self, id: RelationId) -> Option<&RelationState> {
        self.relationers.get(&id).map(Relationer::state)
    }

    /// Read access to one tracked relation.
    #[must_use]
    pub fn relationer(&self, id: RelationId) -> Option<&Relationer> {
        self.relationers.get(&id)
    }

    /// Ids of all tracked relations, ascending.
    #[must_use]
    pub fn tracked_ids(&self) -> Vec<RelationId> {
        self.relationers.keys().copied().collect()
    }

    #[must_use]
    pub fn is_subordinate(&self) -> bool {
        self.principal.is_some()
    }

    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    #[must_use]
    pub fn life(&self) -> Life {
        self.life
    }

    #[must_use]
    pub fn resolved(&self) -> ResolvedMode {
        self.resolved
    }

    fn relationer_for(&self, id: RelationId) -> Result<&Relationer> {
        self.relationers
            .get(&id)
            .ok_or(Error::UnknownRelation { relation_id: id })
    }

    /// Starts tracking a relation. Returns false if the charm does not
    /// implement the endpoint.
    fn add_relation(
        &mut self,
        record: RelationRecord,
        state: RelationState,
        join: bool,
    ) -> Result<bool> {
        let id = record.id;
        if !self.charm.implements(&record.endpoint.name) {
            warn!(
                relation_id = id,
                endpoint = %record.endpoint.name,
                "charm does not implement endpoint; ignoring relation"
            );
            return Ok(false);
        }
        self.abort.check()?;
        let watcher = self.client.watch(&self.unit)?;
        let implicit = record.endpoint.is_implicit();
        let mut relationer = Relationer::new(
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            self.unit.clone(),
            record,
            state,
        );
        if join {
            self.abort.check()?;
            relationer.join()?;
            if self.leadership.is_leader()? {
                self.abort.check()?;
                self.client
                    .set_relation_status(&self.unit, id, RelationStatus::Joined)?;
            }
        }
        if implicit {
            self.created.insert(id);
        }
        self.watchers.insert(id, watcher);
        self.relationers.insert(id, relationer);
        debug!(relation_id = id, joined = join, "tracking relation");
        Ok(true)
    }

    /// A subordinate is lifecycle-bound to its principal: when the
    /// container-scoped relation to the principal's application dies, the
    /// subordinate asks the controller to destroy it. Relations between
    /// subordinates never keep a unit alive.
    fn maybe_destroy_self(&mut self, remote: &RemoteSnapshot) -> Result<()> {
        if self.destroy_requested {
            return Ok(());
        }
        let Some(principal) = &self.principal else {
            return Ok(());
        };
        let principal_app = unit_application(principal)?;
        let mut principal_relation_dying = None;
        for (&id, rel) in &self.relationers {
            let dying = remote.life == Life::Dying
                || match remote.relations.get(&id) {
                    Some(snap) => !snap.life.is_alive(),
                    None => true,
                };
            if !dying {
                continue;
            }
            if rel.endpoint().is_container_scoped() && rel.remote_application() == principal_app {
                principal_relation_dying = Some(id);
                break;
            }
        }
        if let Some(id) = principal_relation_dying {
            info!(
                unit = %self.unit,
                relation_id = id,
                "relation to principal is dying; destroying self"
            );
            self.abort.check()?;
            self.client.destroy(&self.unit)?;
            self.destroy_requested = true;
        }
        Ok(())
    }
}

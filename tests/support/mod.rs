//! Shared test fixtures: an in-process controller fake with call
//! recording, a recording operation factory, and charm fixtures.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use weaver::api::params::{
    RelationRecord, RelationStatus, RelationUnitStatus, ResolvedMode, UnitRefresh, WatcherId,
};
use weaver::api::{Abort, ControllerClient, LeadershipContext, SubordinateDestroyer};
use weaver::core::endpoint::{Endpoint, EndpointScope, Role};
use weaver::core::error::{Error, Result};
use weaver::core::hook::HookInfo;
use weaver::core::life::Life;
use weaver::core::names::{RelationId, UnitName};
use weaver::core::snapshot::{RelationSnapshot, RemoteSnapshot};
use weaver::relation::{
    Operation, OperationFactory, RelationStateTracker, RelationStateTrackerConfig,
};

pub const WORDPRESS_METADATA: &str = "\
name: wordpress
summary: test
description: test
requires:
  db: mysql
";

pub const NRPE_METADATA: &str = "\
name: nrpe
summary: test
description: test
requires:
  general-info:
    interface: juju-info
    scope: container
  external-master:
    interface: nrpe-external-master
    scope: container
";

/// Controller fake: canned records plus a recorded call log, so tests can
/// assert exactly which RPCs a decision made.
#[derive(Default)]
pub struct FakeController {
    pub unit_life: Mutex<Life>,
    pub principal: Mutex<Option<UnitName>>,
    pub statuses: Mutex<Vec<RelationUnitStatus>>,
    pub relations: Mutex<BTreeMap<RelationId, RelationRecord>>,
    calls: Mutex<Vec<String>>,
}

impl FakeController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_relation(&self, record: RelationRecord) {
        self.relations.lock().unwrap().insert(record.id, record);
    }

    pub fn set_principal(&self, principal: &str) {
        *self.principal.lock().unwrap() = Some(principal.to_string());
    }

    pub fn add_status(&self, key: &str, in_scope: bool) {
        self.statuses.lock().unwrap().push(RelationUnitStatus {
            key: key.to_string(),
            in_scope,
            suspended: false,
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ControllerClient for FakeController {
    fn refresh(&self, unit: &str) -> Result<UnitRefresh> {
        self.record(format!("refresh {unit}"));
        Ok(UnitRefresh {
            life: *self.unit_life.lock().unwrap(),
            resolved: ResolvedMode::None,
        })
    }

    fn principal(&self, unit: &str) -> Result<Option<UnitName>> {
        self.record(format!("principal {unit}"));
        Ok(self.principal.lock().unwrap().clone())
    }

    fn relations_status(&self, unit: &str) -> Result<Vec<RelationUnitStatus>> {
        self.record(format!("relations-status {unit}"));
        Ok(self.statuses.lock().unwrap().clone())
    }

    fn relation_by_id(&self, id: RelationId) -> Result<RelationRecord> {
        self.record(format!("relation-by-id {id}"));
        self.relations
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("relation {id}")))
    }

    fn relation(&self, key: &str, unit: &str) -> Result<RelationRecord> {
        self.record(format!("relation {key} {unit}"));
        self.relations
            .lock()
            .unwrap()
            .values()
            .find(|r| r.key == key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("relation {key}")))
    }

    fn watch(&self, unit: &str) -> Result<WatcherId> {
        self.record(format!("watch {unit}"));
        Ok("watcher-1".to_string())
    }

    fn enter_scope(&self, key: &str, unit: &str) -> Result<()> {
        self.record(format!("enter-scope {key} {unit}"));
        Ok(())
    }

    fn leave_scope(&self, key: &str, unit: &str) -> Result<()> {
        self.record(format!("leave-scope {key} {unit}"));
        Ok(())
    }

    fn set_relation_status(
        &self,
        _unit: &str,
        id: RelationId,
        status: RelationStatus,
    ) -> Result<()> {
        self.record(format!("set-relation-status {id} {status:?}"));
        Ok(())
    }

    fn destroy(&self, unit: &str) -> Result<()> {
        self.record(format!("destroy {unit}"));
        Ok(())
    }
}

pub struct StubLeadership(pub bool);

impl LeadershipContext for StubLeadership {
    fn is_leader(&self) -> Result<bool> {
        Ok(self.0)
    }
}

#[derive(Default)]
pub struct DestroyerSpy {
    calls: AtomicU32,
}

impl DestroyerSpy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

pub struct SharedDestroyer(pub Arc<DestroyerSpy>);

impl SubordinateDestroyer for SharedDestroyer {
    fn destroy_all_subordinates(&self) -> Result<()> {
        self.0.calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Operation stand-in that renders the way the executor describes hooks.
pub struct MockOperation(pub HookInfo);

impl fmt::Display for MockOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = &self.0;
        if let Some(unit) = &info.remote_unit {
            write!(
                f,
                "run hook {} on unit {unit} with relation {}",
                info.kind, info.relation_id
            )
        } else if let Some(app) = &info.remote_application {
            write!(
                f,
                "run hook {} on app {app} with relation {}",
                info.kind, info.relation_id
            )
        } else {
            write!(f, "run hook {} with relation {}", info.kind, info.relation_id)
        }
    }
}

impl Operation for MockOperation {
    fn hook(&self) -> &HookInfo {
        &self.0
    }
}

pub struct MockOperations;

impl OperationFactory for MockOperations {
    fn run_hook(&self, info: HookInfo) -> Result<Box<dyn Operation>> {
        Ok(Box::new(MockOperation(info)))
    }
}

/// Relation record fixture with this unit's endpoint.
pub fn record(
    id: RelationId,
    key: &str,
    application: &str,
    name: &str,
    interface: &str,
    scope: EndpointScope,
    other_application: &str,
) -> RelationRecord {
    RelationRecord {
        id,
        key: key.to_string(),
        life: Life::Alive,
        suspended: false,
        other_application: other_application.to_string(),
        endpoint: Endpoint {
            application: application.to_string(),
            name: name.to_string(),
            role: Role::Requirer,
            interface: interface.to_string(),
            scope,
        },
    }
}

/// The standard wordpress:db relation used by most tests.
pub fn db_relation(id: RelationId) -> RelationRecord {
    record(
        id,
        "wordpress:db mysql:db",
        "wordpress",
        "db",
        "mysql",
        EndpointScope::Global,
        "mysql",
    )
}

pub fn write_charm_dir(dir: &TempDir, metadata: &str) -> PathBuf {
    let charm = dir.path().join("charm");
    std::fs::create_dir_all(&charm).unwrap();
    std::fs::write(charm.join("metadata.yaml"), metadata).unwrap();
    charm
}

pub fn new_tracker(
    dir: &TempDir,
    client: Arc<FakeController>,
    unit: &str,
    metadata: &str,
) -> Arc<Mutex<RelationStateTracker>> {
    new_tracker_with_abort(dir, client, unit, metadata, Abort::new()).unwrap()
}

pub fn new_tracker_with_abort(
    dir: &TempDir,
    client: Arc<FakeController>,
    unit: &str,
    metadata: &str,
    abort: Abort,
) -> Result<Arc<Mutex<RelationStateTracker>>> {
    let charm_dir = write_charm_dir(dir, metadata);
    let tracker = RelationStateTracker::new(RelationStateTrackerConfig {
        client,
        unit: unit.to_string(),
        charm_dir,
        relations_dir: dir.path().join("relations"),
        leadership: Box::new(StubLeadership(true)),
        abort,
    })?;
    Ok(Arc::new(Mutex::new(tracker)))
}

pub fn rel_snapshot(
    life: Life,
    suspended: bool,
    members: &[(&str, i64)],
    applications: &[(&str, i64)],
) -> RelationSnapshot {
    RelationSnapshot {
        life,
        suspended,
        members: members
            .iter()
            .map(|(m, v)| ((*m).to_string(), *v))
            .collect(),
        application_members: applications
            .iter()
            .map(|(a, v)| ((*a).to_string(), *v))
            .collect(),
    }
}

pub fn remote(life: Life, relations: Vec<(RelationId, RelationSnapshot)>) -> RemoteSnapshot {
    RemoteSnapshot {
        life,
        relations: relations.into_iter().collect(),
    }
}

//! The next-operation resolver: a pure decision from (local state, remote
//! snapshot, tracker view) to the single next relation hook.

use crate::api::SubordinateDestroyer;
use crate::core::error::{Error, Result};
use crate::core::hook::HookInfo;
use crate::core::names::RelationId;
use crate::core::snapshot::{LocalState, RelationSnapshot, RemoteSnapshot};
use crate::relation::tracker::RelationStateTracker;
use crate::storage::RelationState;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// An operation selected for the executor. The engine only selects;
/// running the hook and the retry policy around it belong to the caller.
pub trait Operation: fmt::Display {
    fn hook(&self) -> &HookInfo;
}

/// Builds executor operations from hook descriptions.
pub trait OperationFactory {
    /// # Errors
    /// Implementations may refuse a hook they cannot represent.
    fn run_hook(&self, info: HookInfo) -> Result<Box<dyn Operation>>;
}

/// A stage of the agent's resolver chain. Implementations return
/// `Error::NoOperation` when they have nothing to schedule, letting the
/// chain fall through to the next stage.
pub trait Resolver {
    /// # Errors
    /// `Error::NoOperation` when idle; RPC, abort, and store errors
    /// otherwise.
    fn next_op(
        &mut self,
        local: &LocalState,
        remote: &RemoteSnapshot,
        ops: &dyn OperationFactory,
    ) -> Result<Box<dyn Operation>>;
}

/// Resolver for the full relation hook ladder: broken, departed, joined,
/// unit-level changed, then application-level changed across all
/// relations, always in ascending relation id order.
pub struct RelationResolver {
    tracker: Arc<Mutex<RelationStateTracker>>,
    destroyer: Option<Box<dyn SubordinateDestroyer>>,
}

impl RelationResolver {
    /// The destroyer is wired in only for principal units; pass `None` for
    /// subordinates.
    #[must_use]
    pub fn new(
        tracker: Arc<Mutex<RelationStateTracker>>,
        destroyer: Option<Box<dyn SubordinateDestroyer>>,
    ) -> Self {
        Self { tracker, destroyer }
    }
}

impl Resolver for RelationResolver {
    fn next_op(
        &mut self,
        _local: &LocalState,
        remote: &RemoteSnapshot,
        ops: &dyn OperationFactory,
    ) -> Result<Box<dyn Operation>> {
        let mut tracker = self.tracker.lock().expect("lock poisoned");
        tracker.synchronize_scopes(remote, self.destroyer.as_deref())?;

        let mut candidates: BTreeSet<RelationId> = tracker.tracked_ids().into_iter().collect();
        candidates.extend(remote.relations.keys().copied());

        for &id in &candidates {
            let Some(rel) = tracker.relationer(id) else {
                continue;
            };
            if rel.is_implicit() {
                continue;
            }
            if !tracker.relation_created(id) {
                // relation-created has not fired; the created resolver
                // owns the first move.
                continue;
            }
            if let Some(hook) =
                next_relation_hook(id, rel.state(), remote.relations.get(&id), rel.is_dying())
            {
                debug!(relation_id = id, kind = %hook.kind, "next relation hook");
                return ops.run_hook(hook);
            }
        }

        // Application-level changed is the lowest priority of all: it runs
        // only once every unit-level candidate across relations is spent.
        for &id in &candidates {
            let Some(rel) = tracker.relationer(id) else {
                continue;
            };
            if rel.is_implicit() || !tracker.relation_created(id) {
                continue;
            }
            if let Some(hook) =
                next_application_hook(id, rel.state(), remote.relations.get(&id), rel.is_dying())
            {
                debug!(relation_id = id, kind = %hook.kind, "next application hook");
                return ops.run_hook(hook);
            }
        }

        Err(Error::NoOperation)
    }
}

/// The per-relation hook ladder, first match wins:
///
/// 1. broken - the relation is gone, Dying, or suspended and every local
///    member has already departed.
/// 2. departed - a local member is gone from the remote view, or any local
///    member while the relation is Dying, suspended, or gone.
/// 3. joined - a remote member not yet seen locally.
/// 4. changed - a member still owing its post-joined changed, then any
///    member whose remote version differs from the local one (any
///    inequality: the controller may delete and recreate settings,
///    resetting versions backwards).
///
/// Ties break in lexicographic member order throughout.
fn next_relation_hook(
    id: RelationId,
    state: &RelationState,
    snap: Option<&RelationSnapshot>,
    relation_dying: bool,
) -> Option<HookInfo> {
    let gone = snap.is_none();
    let dying = relation_dying || snap.map_or(true, |s| !s.life.is_alive());
    let suspended = snap.is_some_and(|s| s.suspended);
    let empty = RelationSnapshot::default();
    let remote_members = &snap.unwrap_or(&empty).members;

    if (gone || dying || suspended) && state.members.is_empty() {
        return Some(HookInfo::broken(id));
    }

    if let Some((member, member_state)) = state
        .members
        .iter()
        .find(|(member, _)| dying || suspended || !remote_members.contains_key(*member))
    {
        let version = remote_members
            .get(member)
            .copied()
            .unwrap_or(member_state.change_version);
        return Some(HookInfo::departed(id, member, version));
    }

    if let Some((member, version)) = remote_members
        .iter()
        .find(|(member, _)| !state.members.contains_key(*member))
    {
        return Some(HookInfo::joined(id, member, *version));
    }

    if let Some((member, member_state)) = state
        .members
        .iter()
        .find(|(_, member_state)| member_state.changed_pending)
    {
        let version = remote_members
            .get(member)
            .copied()
            .unwrap_or(member_state.change_version);
        return Some(HookInfo::changed(id, member, version));
    }

    if let Some((member, version)) = state.members.iter().find_map(|(member, member_state)| {
        remote_members
            .get(member)
            .filter(|v| **v != member_state.change_version)
            .map(|v| (member, *v))
    }) {
        return Some(HookInfo::changed(id, member, version));
    }

    None
}

/// Application-level changed: remote applications unknown locally or at a
/// different version. Dying, suspended, and vanished relations are owned
/// by the departed/broken ladder instead.
fn next_application_hook(
    id: RelationId,
    state: &RelationState,
    snap: Option<&RelationSnapshot>,
    relation_dying: bool,
) -> Option<HookInfo> {
    let snap = snap?;
    if relation_dying || !snap.life.is_alive() || snap.suspended {
        return None;
    }
    for (application, version) in &snap.application_members {
        match state.application_members.get(application) {
            None => return Some(HookInfo::changed_application(id, application, *version)),
            Some(member_state)
                if member_state.changed_pending || member_state.change_version != *version =>
            {
                return Some(HookInfo::changed_application(id, application, *version))
            }
            Some(_) => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::life::Life;
    use crate::storage::MemberState;
    use std::collections::BTreeMap;

    fn state(members: &[(&str, i64, bool)]) -> RelationState {
        let mut state = RelationState::new(1);
        for (member, version, pending) in members {
            state.members.insert(
                (*member).to_string(),
                MemberState {
                    change_version: *version,
                    changed_pending: *pending,
                },
            );
        }
        state
    }

    fn snapshot(life: Life, suspended: bool, members: &[(&str, i64)]) -> RelationSnapshot {
        RelationSnapshot {
            life,
            suspended,
            members: members
                .iter()
                .map(|(m, v)| ((*m).to_string(), *v))
                .collect(),
            application_members: BTreeMap::new(),
        }
    }

    #[test]
    fn empty_alive_relation_yields_nothing() {
        let snap = snapshot(Life::Alive, false, &[]);
        assert_eq!(next_relation_hook(1, &state(&[]), Some(&snap), false), None);
    }

    #[test]
    fn new_remote_member_joins_first() {
        let snap = snapshot(Life::Alive, false, &[("wordpress/0", 1)]);
        let hook = next_relation_hook(1, &state(&[]), Some(&snap), false).unwrap();
        assert_eq!(hook, HookInfo::joined(1, "wordpress/0", 1));
    }

    #[test]
    fn pending_member_gets_its_changed() {
        let snap = snapshot(Life::Alive, false, &[("wordpress/0", 1)]);
        let local = state(&[("wordpress/0", 1, true)]);
        let hook = next_relation_hook(1, &local, Some(&snap), false).unwrap();
        assert_eq!(hook, HookInfo::changed(1, "wordpress/0", 1));
    }

    #[test]
    fn version_skew_fires_changed_in_both_directions() {
        let local = state(&[("wordpress/0", 1, false)]);
        for remote_version in [0, 2] {
            let snap = snapshot(Life::Alive, false, &[("wordpress/0", remote_version)]);
            let hook = next_relation_hook(1, &local, Some(&snap), false).unwrap();
            assert_eq!(hook, HookInfo::changed(1, "wordpress/0", remote_version));
        }
    }

    #[test]
    fn equal_versions_are_quiescent() {
        let local = state(&[("wordpress/0", 1, false)]);
        let snap = snapshot(Life::Alive, false, &[("wordpress/0", 1)]);
        assert_eq!(next_relation_hook(1, &local, Some(&snap), false), None);
    }

    #[test]
    fn departed_outranks_joined_and_changed() {
        // a/0 is gone remotely, b/0 is new, c/0 changed; departed wins.
        let local = state(&[("a/0", 1, false), ("c/0", 1, false)]);
        let snap = snapshot(Life::Alive, false, &[("b/0", 1), ("c/0", 2)]);
        let hook = next_relation_hook(1, &local, Some(&snap), false).unwrap();
        assert_eq!(hook, HookInfo::departed(1, "a/0", 1));
    }

    #[test]
    fn departed_outranks_pending_changed() {
        // The member vanished remotely while still owing its changed hook;
        // the ladder departs it.
        let local = state(&[("wordpress/0", 1, true)]);
        let snap = snapshot(Life::Alive, false, &[]);
        let hook = next_relation_hook(1, &local, Some(&snap), false).unwrap();
        assert_eq!(hook, HookInfo::departed(1, "wordpress/0", 1));
    }

    #[test]
    fn dying_relation_departs_members_then_breaks() {
        let snap = snapshot(Life::Dying, false, &[("wordpress/0", 1)]);
        let local = state(&[("wordpress/0", 1, false)]);
        let hook = next_relation_hook(1, &local, Some(&snap), false).unwrap();
        assert_eq!(hook, HookInfo::departed(1, "wordpress/0", 1));

        let hook = next_relation_hook(1, &state(&[]), Some(&snap), false);
        assert_eq!(hook, Some(HookInfo::broken(1)));
    }

    #[test]
    fn suspension_with_members_departs_before_breaking() {
        let snap = snapshot(Life::Alive, true, &[("wordpress/0", 1)]);
        let local = state(&[("wordpress/0", 1, false)]);
        let hook = next_relation_hook(1, &local, Some(&snap), false).unwrap();
        assert_eq!(hook, HookInfo::departed(1, "wordpress/0", 1));

        let hook = next_relation_hook(1, &state(&[]), Some(&snap), false);
        assert_eq!(hook, Some(HookInfo::broken(1)));
    }

    #[test]
    fn vanished_relation_is_broken_once_members_are_gone() {
        let local = state(&[("wordpress/0", 1, false)]);
        let hook = next_relation_hook(1, &local, None, true).unwrap();
        assert_eq!(hook, HookInfo::departed(1, "wordpress/0", 1));
        assert_eq!(
            next_relation_hook(1, &state(&[]), None, true),
            Some(HookInfo::broken(1))
        );
    }

    #[test]
    fn members_tie_break_lexicographically() {
        let snap = snapshot(Life::Alive, false, &[("b/0", 1), ("a/0", 1)]);
        let hook = next_relation_hook(1, &state(&[]), Some(&snap), false).unwrap();
        assert_eq!(hook, HookInfo::joined(1, "a/0", 1));
    }

    #[test]
    fn application_changed_fires_on_new_or_skewed_versions() {
        let mut snap = snapshot(Life::Alive, false, &[]);
        snap.application_members.insert("wordpress".to_string(), 1);

        let local = RelationState::new(1);
        let hook = next_application_hook(1, &local, Some(&snap), false).unwrap();
        assert_eq!(hook, HookInfo::changed_application(1, "wordpress", 1));

        let mut local = RelationState::new(1);
        local.application_members.insert(
            "wordpress".to_string(),
            MemberState {
                change_version: 1,
                changed_pending: false,
            },
        );
        assert_eq!(next_application_hook(1, &local, Some(&snap), false), None);
    }

    #[test]
    fn application_changed_is_suppressed_while_dying_or_suspended() {
        let mut snap = snapshot(Life::Dying, false, &[]);
        snap.application_members.insert("wordpress".to_string(), 1);
        assert_eq!(
            next_application_hook(1, &RelationState::new(1), Some(&snap), false),
            None
        );

        let mut snap = snapshot(Life::Alive, true, &[]);
        snap.application_members.insert("wordpress".to_string(), 1);
        assert_eq!(
            next_application_hook(1, &RelationState::new(1), Some(&snap), false),
            None
        );
    }
}

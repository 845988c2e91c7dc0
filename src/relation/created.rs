//! Pre-resolver for `relation-created`: fires once per relation, before
//! the tracker is permitted to enter its scope.

use crate::core::error::{Error, Result};
use crate::core::hook::HookInfo;
use crate::core::snapshot::{LocalState, RemoteSnapshot};
use crate::relation::resolver::{Operation, OperationFactory, Resolver};
use crate::relation::tracker::RelationStateTracker;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Emits `relation-created` for relations observed remotely whose created
/// hook has not committed yet. Consulted before [`RelationResolver`] in
/// the agent's resolver chain; only once it reports no operation does the
/// main ladder run.
///
/// [`RelationResolver`]: crate::relation::resolver::RelationResolver
pub struct CreatedRelationResolver {
    tracker: Arc<Mutex<RelationStateTracker>>,
}

impl CreatedRelationResolver {
    #[must_use]
    pub fn new(tracker: Arc<Mutex<RelationStateTracker>>) -> Self {
        Self { tracker }
    }
}

impl Resolver for CreatedRelationResolver {
    fn next_op(
        &mut self,
        local: &LocalState,
        remote: &RemoteSnapshot,
        ops: &dyn OperationFactory,
    ) -> Result<Box<dyn Operation>> {
        if !local.installed {
            // relation-created may only fire once the charm is installed.
            return Err(Error::NoOperation);
        }
        let mut tracker = self.tracker.lock().expect("lock poisoned");
        tracker.synchronize_scopes(remote, None)?;

        for &id in remote.relations.keys() {
            if !tracker.is_known(id) {
                continue;
            }
            if tracker.is_implicit(id)? {
                continue;
            }
            if tracker.relation_created(id) {
                continue;
            }
            let Some(application) = tracker.remote_application(id) else {
                continue;
            };
            debug!(relation_id = id, application = %application, "emitting relation-created");
            return ops.run_hook(HookInfo::created(id, application.clone()));
        }
        Err(Error::NoOperation)
    }
}

//! On-disk relation state: one directory per relation, one YAML record per
//! member, recording the last processed change version and whether a
//! `relation-changed` is still owed after a `relation-joined`.
//!
//! The store is the single crash-safety mechanism of the engine: records
//! are written via temp-file-and-rename, so a crash between two hook
//! commits loses nothing and duplicates nothing.

use crate::core::error::{Error, Result};
use crate::core::names::{
    is_unit_name, member_file_name, member_from_file_name, ApplicationName, RelationId, UnitName,
};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = ".lock";

/// Per-member state as recorded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberState {
    /// Version of the last change processed for this member.
    pub change_version: i64,
    /// Set on `relation-joined`, cleared by the follow-up
    /// `relation-changed`.
    pub changed_pending: bool,
}

/// In-memory mirror of one relation's member files. Authoritative after
/// load; reads outside `load` are unnecessary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationState {
    pub relation_id: RelationId,
    pub members: BTreeMap<UnitName, MemberState>,
    pub application_members: BTreeMap<ApplicationName, MemberState>,
}

impl RelationState {
    #[must_use]
    pub fn new(relation_id: RelationId) -> Self {
        Self {
            relation_id,
            ..Self::default()
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The two-key record format. Unknown keys are ignored on read; the
/// pending flag is written only when set.
#[derive(Debug, Serialize, Deserialize)]
struct MemberRecord {
    #[serde(rename = "change-version")]
    change_version: i64,
    #[serde(rename = "changed-pending", default, skip_serializing_if = "is_false")]
    changed_pending: bool,
}

/// Store rooted at the agent's `relations/` directory. Holds an exclusive
/// advisory lock on the root for its lifetime; the directory has exactly
/// one writer.
#[derive(Debug)]
pub struct StateStore {
    root: PathBuf,
    _lock: File,
}

impl StateStore {
    /// Creates the root directory if needed and takes the exclusive lock.
    ///
    /// # Errors
    /// Fails if the directory cannot be created or another agent holds the
    /// lock.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(root.join(LOCK_FILE))?;
        lock.try_lock_exclusive()?;
        Ok(Self { root, _lock: lock })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parses every relation directory. Malformed content is fatal: the
    /// store must not start from state it cannot trust.
    ///
    /// # Errors
    /// Returns `Error::CorruptState` for unparseable files or stray
    /// entries, `Error::Io` on read failures.
    pub fn load(&self) -> Result<BTreeMap<RelationId, RelationState>> {
        let mut all = BTreeMap::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type()?.is_dir() {
                if name.starts_with('.') {
                    continue;
                }
                return Err(Error::CorruptState {
                    path: entry.path(),
                    reason: "unexpected file in relations root".to_string(),
                });
            }
            let relation_id = parse_relation_dir_name(&name, &entry.path())?;
            all.insert(relation_id, self.load_relation(relation_id, &entry.path())?);
        }
        Ok(all)
    }

    fn load_relation(&self, relation_id: RelationId, dir: &Path) -> Result<RelationState> {
        let mut state = RelationState::new(relation_id);
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                // In-flight temp files from an interrupted write.
                continue;
            }
            if !entry.file_type()?.is_file() {
                return Err(Error::CorruptState {
                    path: entry.path(),
                    reason: "unexpected directory entry".to_string(),
                });
            }
            let raw = fs::read_to_string(entry.path())?;
            let record: MemberRecord =
                serde_yaml::from_str(&raw).map_err(|e| Error::CorruptState {
                    path: entry.path(),
                    reason: e.to_string(),
                })?;
            let member = member_from_file_name(&name);
            let member_state = MemberState {
                change_version: record.change_version,
                changed_pending: record.changed_pending,
            };
            if is_unit_name(&member) {
                state.members.insert(member, member_state);
            } else {
                state.application_members.insert(member, member_state);
            }
        }
        Ok(state)
    }

    /// Writes one member record atomically: serialize to a temp file in the
    /// relation directory, then rename over the target. A crash before the
    /// rename leaves the previous record intact.
    ///
    /// # Errors
    /// Fails only on IO.
    pub fn write(
        &self,
        relation_id: RelationId,
        member: &str,
        change_version: i64,
        changed_pending: bool,
    ) -> Result<()> {
        let dir = self.relation_dir(relation_id);
        fs::create_dir_all(&dir)?;
        let doc = serde_yaml::to_string(&MemberRecord {
            change_version,
            changed_pending,
        })?;
        let mut tmp = tempfile::Builder::new().prefix(".").tempfile_in(&dir)?;
        tmp.write_all(doc.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(member_file_name(member)))
            .map_err(|e| Error::Io(e.error))?;
        debug!(relation_id, member, change_version, changed_pending, "wrote member state");
        Ok(())
    }

    /// Removes one member record; an absent file is not an error.
    ///
    /// # Errors
    /// Fails on IO other than not-found.
    pub fn remove(&self, relation_id: RelationId, member: &str) -> Result<()> {
        let path = self.relation_dir(relation_id).join(member_file_name(member));
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Removes a relation's whole directory; absent is not an error.
    ///
    /// # Errors
    /// Fails on IO other than not-found.
    pub fn remove_all(&self, relation_id: RelationId) -> Result<()> {
        match fs::remove_dir_all(self.relation_dir(relation_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn relation_dir(&self, relation_id: RelationId) -> PathBuf {
        self.root.join(relation_id.to_string())
    }
}

fn parse_relation_dir_name(name: &str, path: &Path) -> Result<RelationId> {
    let relation_id: RelationId = name.parse().map_err(|_| Error::CorruptState {
        path: path.to_path_buf(),
        reason: "directory name is not a relation id".to_string(),
    })?;
    if relation_id <= 0 {
        return Err(Error::CorruptState {
            path: path.to_path_buf(),
            reason: "relation ids are positive".to_string(),
        });
    }
    Ok(relation_id)
}

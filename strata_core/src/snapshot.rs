//! Snapshot records and the deltas they carry.

use crate::hash::Digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Snapshot identifier. Allocated as the current maximum plus one, never reused.
pub type SnapshotId = u64;

/// The full path → digest view of one snapshot. Paths are relative and `/`-separated.
pub type FlatState = BTreeMap<String, Digest>;

/// The difference between a snapshot and its parent.
///
/// A path appears in at most one of the three sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changes {
    /// Paths absent from the parent.
    #[serde(default)]
    pub added: BTreeMap<String, Digest>,
    /// Paths present in the parent with a different digest.
    #[serde(default)]
    pub modified: BTreeMap<String, Digest>,
    /// Paths present in the parent and gone here.
    #[serde(default)]
    pub deleted: BTreeSet<String>,
}

impl Changes {
    /// Compute the delta that turns `base` into `target`.
    pub fn between(base: &FlatState, target: &FlatState) -> Self {
        let mut changes = Changes::default();

        for (path, digest) in target {
            match base.get(path) {
                None => {
                    changes.added.insert(path.clone(), *digest);
                }
                Some(previous) if previous != digest => {
                    changes.modified.insert(path.clone(), *digest);
                }
                Some(_) => {}
            }
        }

        for path in base.keys() {
            if !target.contains_key(path) {
                changes.deleted.insert(path.clone());
            }
        }

        changes
    }

    /// Replay this delta on top of `state`.
    pub fn apply(&self, state: &mut FlatState) {
        for (path, digest) in self.added.iter().chain(self.modified.iter()) {
            state.insert(path.clone(), *digest);
        }
        for path in &self.deleted {
            state.remove(path);
        }
    }

    /// Digests this delta introduces or rewrites (added and modified entries).
    pub fn referenced(&self) -> impl Iterator<Item = &Digest> {
        self.added.values().chain(self.modified.values())
    }

    /// Total number of changed paths.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// True when nothing changed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that no path appears in more than one set.
    ///
    /// Returns the first offending path.
    pub fn find_overlap(&self) -> Option<&str> {
        self.added
            .keys()
            .find(|p| self.modified.contains_key(*p) || self.deleted.contains(*p))
            .or_else(|| self.modified.keys().find(|p| self.deleted.contains(*p)))
            .map(String::as_str)
    }
}

/// One immutable entry of the snapshot chain.
///
/// Only `parent` (and the delta re-based onto it) changes after creation, when the
/// predecessor is pruned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub date: DateTime<Utc>,
    pub parent: Option<SnapshotId>,
    pub changes: Changes,
}

impl Snapshot {
    /// Create a snapshot stamped with the current time.
    pub fn new(id: SnapshotId, parent: Option<SnapshotId>, changes: Changes) -> Self {
        Self {
            id,
            date: Utc::now(),
            parent,
            changes,
        }
    }

    /// True for the first link of the chain.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

//! Pruning snapshots and reclaiming unreferenced blobs.

use crate::error::Result;
use crate::hash::Digest;
use crate::snapshot::{Changes, FlatState, Snapshot, SnapshotId};
use crate::store::Store;
use std::collections::HashSet;
use tracing::{debug, info};

/// Outcome of pruning one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneStats {
    /// The snapshot that was removed.
    pub snapshot_id: SnapshotId,
    /// The successor that was re-linked to the pruned snapshot's parent, if any.
    pub relinked: Option<SnapshotId>,
    /// Number of blobs deleted.
    pub blobs_deleted: usize,
    /// Bytes freed.
    pub bytes_freed: u64,
}

/// Statistics from a blob sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of blobs deleted (or that would be, on a dry run).
    pub blobs_deleted: usize,
    /// Bytes freed.
    pub bytes_freed: u64,
}

impl Store {
    /// Remove snapshot `id` from history and reclaim blobs nothing references any more.
    ///
    /// The successor (the snapshot whose parent is `id`) is re-based onto `id`'s parent: its
    /// delta is recomputed against the parent's state so that it and every descendant still
    /// reconstruct to exactly what they did before. The re-based successor is written before
    /// `id`'s record is deleted; if the process stops in between, pruning `id` again finishes
    /// the job.
    pub fn prune(&self, id: SnapshotId) -> Result<PruneStats> {
        let target = self.load_snapshot(id)?;
        let successor = self.successor_of(id)?;

        let relinked = match successor {
            Some(successor) => {
                let base = match target.parent {
                    Some(parent) => self.reconstruct(parent)?,
                    None => FlatState::new(),
                };
                let state = self.reconstruct(successor.id)?;

                let rebased = Snapshot {
                    parent: target.parent,
                    changes: Changes::between(&base, &state),
                    ..successor
                };
                self.rewrite_snapshot(&rebased)?;

                debug!(
                    successor = rebased.id,
                    parent = ?rebased.parent,
                    changes = rebased.changes.len(),
                    "re-linked successor"
                );
                Some(rebased.id)
            }
            None => None,
        };

        self.delete_snapshot_record(id)?;
        self.invalidate_cache();

        let referenced = self.referenced_digests()?;
        let swept = self.sweep(&referenced, false)?;

        info!(
            id,
            relinked = ?relinked,
            blobs_deleted = swept.blobs_deleted,
            bytes_freed = swept.bytes_freed,
            "pruned snapshot"
        );

        Ok(PruneStats {
            snapshot_id: id,
            relinked,
            blobs_deleted: swept.blobs_deleted,
            bytes_freed: swept.bytes_freed,
        })
    }

    /// Delete blobs that no snapshot references, without touching the chain.
    ///
    /// Reclaims blobs left behind by an interrupted snapshot. If `dry_run` is true, reports
    /// what would be deleted without actually deleting.
    pub fn gc(&self, dry_run: bool) -> Result<GcStats> {
        let referenced = self.referenced_digests()?;
        let stats = self.sweep(&referenced, dry_run)?;

        info!(
            dry_run,
            blobs_deleted = stats.blobs_deleted,
            bytes_freed = stats.bytes_freed,
            "garbage collection finished"
        );

        Ok(stats)
    }

    /// Mark phase: every digest named by any snapshot's added or modified entries.
    pub fn referenced_digests(&self) -> Result<HashSet<Digest>> {
        let mut referenced = HashSet::new();
        for snapshot in self.list_snapshots()? {
            referenced.extend(snapshot.changes.referenced().copied());
        }
        Ok(referenced)
    }

    /// Sweep phase: delete stored blobs outside `referenced`.
    fn sweep(&self, referenced: &HashSet<Digest>, dry_run: bool) -> Result<GcStats> {
        let mut stats = GcStats::default();

        for digest in self.list_blobs()? {
            if referenced.contains(&digest) {
                continue;
            }

            let freed = if dry_run {
                self.blob_size(&digest)
            } else {
                self.remove_blob(&digest)?
            };

            stats.blobs_deleted += 1;
            stats.bytes_freed += freed;
        }

        Ok(stats)
    }
}

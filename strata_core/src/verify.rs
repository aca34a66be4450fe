//! Consistency checks over the whole database.

use crate::error::{Error, Result};
use crate::hash::Digest;
use crate::snapshot::SnapshotId;
use crate::store::Store;
use std::collections::{BTreeSet, HashSet};
use tracing::{info, warn};

/// Findings of [`Store::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub snapshots_checked: usize,
    pub blobs_checked: usize,
    /// Snapshots that cannot be loaded or reconstructed, with the reason.
    pub broken_snapshots: Vec<(SnapshotId, String)>,
    /// Digests referenced by some delta with no stored blob.
    pub missing_blobs: Vec<Digest>,
    /// Stored blobs whose content no longer matches their digest.
    pub corrupted_blobs: Vec<Digest>,
    /// Stored blobs no snapshot references. Harmless; `gc` reclaims them.
    pub unreferenced_blobs: usize,
}

impl VerifyReport {
    /// True when every snapshot can be restored.
    pub fn is_ok(&self) -> bool {
        self.broken_snapshots.is_empty()
            && self.missing_blobs.is_empty()
            && self.corrupted_blobs.is_empty()
    }
}

impl Store {
    /// Check every snapshot and every blob.
    ///
    /// Problems with individual records and blobs are collected into the report; only failures
    /// to list the database itself are returned as errors.
    pub fn verify(&self) -> Result<VerifyReport> {
        self.invalidate_cache();

        let mut report = VerifyReport::default();
        let mut referenced = HashSet::new();

        for id in self.snapshot_ids()? {
            report.snapshots_checked += 1;

            let loaded = self
                .load_snapshot(id)
                .and_then(|snapshot| self.reconstruct(id).map(|_| snapshot));

            match loaded {
                Ok(snapshot) => referenced.extend(snapshot.changes.referenced().copied()),
                Err(e) => {
                    warn!(id, error = %e, "snapshot failed verification");
                    report.broken_snapshots.push((id, e.to_string()));
                }
            }
        }

        let stored: BTreeSet<Digest> = self.list_blobs()?.into_iter().collect();

        let mut missing: Vec<Digest> = referenced
            .iter()
            .filter(|digest| !stored.contains(*digest))
            .copied()
            .collect();
        missing.sort();
        report.missing_blobs = missing;

        for digest in &stored {
            report.blobs_checked += 1;

            match self.load_blob(digest) {
                Ok(_) => {}
                Err(Error::CorruptedBlob { .. }) => {
                    warn!(digest = %digest, "blob content does not match its digest");
                    report.corrupted_blobs.push(*digest);
                }
                Err(e) => return Err(e),
            }

            if !referenced.contains(digest) {
                report.unreferenced_blobs += 1;
            }
        }

        info!(
            snapshots = report.snapshots_checked,
            blobs = report.blobs_checked,
            ok = report.is_ok(),
            "verification finished"
        );

        Ok(report)
    }
}

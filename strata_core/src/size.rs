//! Logical, physical and whole-database size accounting.
//!
//! Size queries go through [`Store::blob_size`], so a missing blob counts as 0 bytes
//! instead of failing the report.

use crate::error::Result;
use crate::hash::Digest;
use crate::snapshot::SnapshotId;
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// One row of the snapshot listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub date: DateTime<Utc>,
    pub parent: Option<SnapshotId>,
    /// Number of files visible in the snapshot.
    pub file_count: usize,
    /// Bytes visible to a user restoring the snapshot.
    pub logical_size: u64,
    /// Bytes first introduced by this snapshot.
    pub physical_size: u64,
}

impl Store {
    /// Total bytes of every stored blob.
    pub fn db_size(&self) -> Result<u64> {
        Ok(self
            .list_blobs()?
            .iter()
            .map(|digest| self.blob_size(digest))
            .sum())
    }

    /// Sum of file sizes in the reconstructed snapshot.
    ///
    /// Content shared between paths is counted once per path.
    pub fn logical_size(&self, id: SnapshotId) -> Result<u64> {
        Ok(self
            .reconstruct(id)?
            .values()
            .map(|digest| self.blob_size(digest))
            .sum())
    }

    /// Bytes of content this snapshot adds that no ancestor's delta already references.
    pub fn physical_size(&self, id: SnapshotId) -> Result<u64> {
        let mut chain = self.ancestry(id)?;
        let Some(snapshot) = chain.pop() else {
            return Ok(0);
        };

        let seen: HashSet<&Digest> = chain.iter().flat_map(|s| s.changes.referenced()).collect();

        let introduced: HashSet<&Digest> = snapshot
            .changes
            .referenced()
            .filter(|digest| !seen.contains(digest))
            .collect();

        Ok(introduced
            .into_iter()
            .map(|digest| self.blob_size(digest))
            .sum())
    }

    /// Size summary for every snapshot, ordered by id.
    pub fn summaries(&self) -> Result<Vec<SnapshotSummary>> {
        self.list_snapshots()?
            .into_iter()
            .map(|snapshot| {
                let state = self.reconstruct(snapshot.id)?;
                Ok(SnapshotSummary {
                    id: snapshot.id,
                    date: snapshot.date,
                    parent: snapshot.parent,
                    file_count: state.len(),
                    logical_size: state.values().map(|d| self.blob_size(d)).sum(),
                    physical_size: self.physical_size(snapshot.id)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Algorithm;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Store, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path().join("db"), Algorithm::Blake3).unwrap();
        let source = temp_dir.path().join("source");
        fs::create_dir(&source).unwrap();
        (temp_dir, store, source)
    }

    #[test]
    fn test_sizes_of_incremental_snapshot() {
        let (_temp, store, source) = setup();
        fs::write(source.join("a.txt"), b"alpha").unwrap();
        fs::write(source.join("b.txt"), b"beta").unwrap();
        store.create_snapshot(&source).unwrap();

        fs::write(source.join("c.txt"), b"gamma").unwrap();
        store.create_snapshot(&source).unwrap();

        assert_eq!(store.logical_size(1).unwrap(), 9);
        assert_eq!(store.physical_size(1).unwrap(), 9);
        assert_eq!(store.logical_size(2).unwrap(), 14);
        assert_eq!(store.physical_size(2).unwrap(), 5);
    }

    #[test]
    fn test_db_size_counts_unique_bytes() {
        let (_temp, store, source) = setup();
        fs::write(source.join("five.txt"), b"12345").unwrap();
        fs::write(source.join("five-copy.txt"), b"12345").unwrap();
        fs::write(source.join("ten.txt"), b"1234567890").unwrap();
        store.create_snapshot(&source).unwrap();

        assert_eq!(store.db_size().unwrap(), 15);
        assert_eq!(store.logical_size(1).unwrap(), 20);
        assert_eq!(store.physical_size(1).unwrap(), 15);
    }

    #[test]
    fn test_physical_size_zero_for_seen_content() {
        let (_temp, store, source) = setup();
        fs::write(source.join("original.txt"), b"same bytes").unwrap();
        store.create_snapshot(&source).unwrap();

        fs::rename(source.join("original.txt"), source.join("renamed.txt")).unwrap();
        let second = store.create_snapshot(&source).unwrap();

        assert_eq!(second.changes.added.len(), 1);
        assert_eq!(store.physical_size(2).unwrap(), 0);
        assert_eq!(store.logical_size(2).unwrap(), 10);
    }

    #[test]
    fn test_physical_size_sees_content_from_distant_ancestor() {
        let (_temp, store, source) = setup();
        fs::write(source.join("x.txt"), b"version one").unwrap();
        store.create_snapshot(&source).unwrap();

        fs::write(source.join("x.txt"), b"version two").unwrap();
        store.create_snapshot(&source).unwrap();

        // Revert to content first seen two snapshots ago
        fs::write(source.join("x.txt"), b"version one").unwrap();
        let third = store.create_snapshot(&source).unwrap();

        assert_eq!(third.changes.modified.len(), 1);
        assert_eq!(store.physical_size(3).unwrap(), 0);
    }

    #[test]
    fn test_sizes_treat_missing_blob_as_zero() {
        let (_temp, store, source) = setup();
        fs::write(source.join("a.txt"), b"alpha").unwrap();
        fs::write(source.join("b.txt"), b"beta").unwrap();
        store.create_snapshot(&source).unwrap();

        store.remove_blob(&Digest::of(b"alpha")).unwrap();

        assert_eq!(store.logical_size(1).unwrap(), 4);
        assert_eq!(store.physical_size(1).unwrap(), 4);
        assert_eq!(store.db_size().unwrap(), 4);
    }

    #[test]
    fn test_size_of_unknown_snapshot_fails() {
        let (_temp, store, _source) = setup();
        assert!(store.logical_size(9).is_err());
        assert!(store.physical_size(9).is_err());
    }

    #[test]
    fn test_summaries() {
        let (_temp, store, source) = setup();
        fs::write(source.join("a.txt"), b"alpha").unwrap();
        store.create_snapshot(&source).unwrap();
        fs::write(source.join("b.txt"), b"beta").unwrap();
        store.create_snapshot(&source).unwrap();

        let summaries = store.summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, 1);
        assert_eq!(summaries[0].file_count, 1);
        assert_eq!(summaries[0].physical_size, 5);
        assert_eq!(summaries[1].parent, Some(1));
        assert_eq!(summaries[1].file_count, 2);
        assert_eq!(summaries[1].logical_size, 9);
        assert_eq!(summaries[1].physical_size, 4);

        let total: u64 = summaries.iter().map(|s| s.physical_size).sum();
        assert_eq!(total, store.db_size().unwrap());
    }
}

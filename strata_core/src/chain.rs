//! Snapshot chain persistence and reconstruction.
//!
//! Records live in `snapshots/<id>.json`. Each one stores a delta against its parent, so the
//! full view of a snapshot is obtained by replaying the chain from the root. Records and
//! replayed states are cached on the [`Store`] handle; anything that rewrites or removes a
//! record must clear the cache.

use crate::error::{Error, Result};
use crate::snapshot::{Changes, FlatState, Snapshot, SnapshotId};
use crate::store::Store;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-handle memo of loaded records and reconstructed states.
#[derive(Debug, Default)]
pub(crate) struct ChainCache {
    records: HashMap<SnapshotId, Snapshot>,
    flats: HashMap<SnapshotId, FlatState>,
}

impl ChainCache {
    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.flats.clear();
    }
}

impl Store {
    /// Path of the record for `id`.
    pub fn snapshot_path(&self, id: SnapshotId) -> PathBuf {
        self.snapshots_dir().join(format!("{}.json", id))
    }

    /// All persisted snapshot ids in ascending order.
    ///
    /// Files in `snapshots/` that are not named `<id>.json` are skipped.
    pub fn snapshot_ids(&self) -> Result<Vec<SnapshotId>> {
        let mut ids = Vec::new();

        for entry in fs::read_dir(self.snapshots_dir())? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            match parse_record_name(&path) {
                Some(id) => ids.push(id),
                None => warn!(path = %path.display(), "skipping stray file in snapshots directory"),
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }

    /// The highest persisted snapshot id, if any snapshot exists.
    pub fn last_id(&self) -> Result<Option<SnapshotId>> {
        Ok(self.snapshot_ids()?.last().copied())
    }

    /// Load a record, reporting absence as `None`.
    ///
    /// Only a missing record maps to `None`; unreadable or corrupt records are still errors.
    pub fn try_load_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        if let Some(snapshot) = self.cache.lock().records.get(&id) {
            return Ok(Some(snapshot.clone()));
        }

        let path = self.snapshot_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot = decode_record(&path, id, &bytes)?;
        self.cache.lock().records.insert(id, snapshot.clone());

        Ok(Some(snapshot))
    }

    /// Load a record, failing with `SnapshotNotFound` when it is absent.
    pub fn load_snapshot(&self, id: SnapshotId) -> Result<Snapshot> {
        self.try_load_snapshot(id)?
            .ok_or_else(|| Error::snapshot_not_found(id))
    }

    /// Every persisted snapshot, ordered by id.
    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        self.snapshot_ids()?
            .into_iter()
            .map(|id| self.load_snapshot(id))
            .collect()
    }

    /// Persist a new record. Fails with `SnapshotExists` rather than overwrite one.
    pub fn append_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.write_record(snapshot, false)
    }

    /// Replace an existing record in place (used when splicing the chain).
    pub(crate) fn rewrite_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.write_record(snapshot, true)
    }

    fn write_record(&self, snapshot: &Snapshot, overwrite: bool) -> Result<()> {
        let path = self.snapshot_path(snapshot.id);
        if !overwrite && path.exists() {
            return Err(Error::snapshot_exists(snapshot.id));
        }

        let encoded = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| Error::corrupt_record(&path, format!("cannot encode record: {}", e)))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(self.snapshots_dir())?;
        temp_file.write_all(&encoded)?;
        temp_file.flush()?;

        if overwrite {
            temp_file.persist(&path)?;
        } else {
            match temp_file.persist_noclobber(&path) {
                Ok(_) => {}
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(Error::snapshot_exists(snapshot.id));
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.cache
            .lock()
            .records
            .insert(snapshot.id, snapshot.clone());

        Ok(())
    }

    /// Remove a record from disk. Callers are responsible for cache invalidation.
    pub(crate) fn delete_snapshot_record(&self, id: SnapshotId) -> Result<()> {
        fs::remove_file(self.snapshot_path(id))?;
        Ok(())
    }

    /// Drop every cached record and reconstructed state.
    pub fn invalidate_cache(&self) {
        self.cache.lock().clear();
    }

    /// The snapshot whose parent is `id`, found by scanning every record.
    pub fn successor_of(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        let mut successors = self
            .list_snapshots()?
            .into_iter()
            .filter(|s| s.parent == Some(id));

        let successor = successors.next();
        if let Some(extra) = successors.next() {
            return Err(Error::corrupt_record(
                self.snapshot_path(extra.id),
                format!("snapshot {} has more than one successor", id),
            ));
        }

        Ok(successor)
    }

    /// The chain from the root down to `id`, root first.
    pub fn ancestry(&self, id: SnapshotId) -> Result<Vec<Snapshot>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id);

        while let Some(current) = next {
            if !seen.insert(current) {
                return Err(self.cycle_error(current));
            }
            let snapshot = self.load_snapshot(current)?;
            next = snapshot.parent;
            chain.push(snapshot);
        }

        chain.reverse();
        Ok(chain)
    }

    /// Rebuild the full path → digest view of snapshot `id`.
    ///
    /// Walks parent pointers back to the root, or to the nearest snapshot whose state is already
    /// cached, then replays deltas oldest to newest. Each intermediate state is cached.
    pub fn reconstruct(&self, id: SnapshotId) -> Result<FlatState> {
        let mut pending = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id);
        let mut state = FlatState::new();

        while let Some(current) = next {
            if let Some(cached) = self.cache.lock().flats.get(&current) {
                debug!(id = current, "flat state cache hit");
                state = cached.clone();
                break;
            }
            if !seen.insert(current) {
                return Err(self.cycle_error(current));
            }
            let snapshot = self.load_snapshot(current)?;
            next = snapshot.parent;
            pending.push(snapshot);
        }

        for snapshot in pending.iter().rev() {
            snapshot.changes.apply(&mut state);
            self.cache.lock().flats.insert(snapshot.id, state.clone());
        }

        Ok(state)
    }

    fn cycle_error(&self, id: SnapshotId) -> Error {
        Error::corrupt_record(
            self.snapshot_path(id),
            format!("parent chain loops back to snapshot {}", id),
        )
    }

    /// Capture the current contents of `dir` as a new snapshot on top of the chain.
    ///
    /// All blobs are written before the record that references them.
    pub fn create_snapshot(&self, dir: &Path) -> Result<Snapshot> {
        let scanned = self.scan(dir)?;

        let parent = self.last_id()?;
        let base = match parent {
            Some(parent_id) => self.reconstruct(parent_id)?,
            None => FlatState::new(),
        };

        for file in scanned.files.values() {
            self.store_blob(&file.content)?;
        }

        let current = scanned.flat();
        let changes = Changes::between(&base, &current);
        let id = parent.map_or(1, |p| p + 1);

        let snapshot = Snapshot::new(id, parent, changes);
        self.append_snapshot(&snapshot)?;
        self.cache.lock().flats.insert(id, current);

        info!(
            id,
            parent = ?parent,
            added = snapshot.changes.added.len(),
            modified = snapshot.changes.modified.len(),
            deleted = snapshot.changes.deleted.len(),
            "created snapshot"
        );

        Ok(snapshot)
    }
}

/// Parse `<id>.json` into an id. Ids start at 1.
fn parse_record_name(path: &Path) -> Option<SnapshotId> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(".json")?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok().filter(|id| *id > 0)
}

/// Decode and sanity-check a record read from `path`.
fn decode_record(path: &Path, id: SnapshotId, bytes: &[u8]) -> Result<Snapshot> {
    let snapshot: Snapshot =
        serde_json::from_slice(bytes).map_err(|e| Error::corrupt_record(path, e.to_string()))?;

    if snapshot.id != id {
        return Err(Error::corrupt_record(
            path,
            format!("record carries id {}", snapshot.id),
        ));
    }
    if snapshot.parent == Some(id) {
        return Err(Error::corrupt_record(path, "snapshot is its own parent"));
    }
    if let Some(overlap) = snapshot.changes.find_overlap() {
        return Err(Error::corrupt_record(
            path,
            format!("path {} appears in more than one change set", overlap),
        ));
    }

    Ok(snapshot)
}

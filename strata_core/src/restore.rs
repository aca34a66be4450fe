//! Materializing snapshots onto the filesystem.

use crate::error::{Error, Result};
use crate::snapshot::SnapshotId;
use crate::store::Store;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Statistics from a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub files_written: usize,
    pub bytes_written: u64,
}

impl Store {
    /// Write every file of snapshot `id` under `target`.
    ///
    /// Intermediate directories are created and existing files are overwritten. Files in
    /// `target` that the snapshot does not contain are left alone. Paths and blob presence are
    /// checked before the first write, so a bad record or a missing blob fails without
    /// touching `target`.
    pub fn restore(&self, id: SnapshotId, target: &Path) -> Result<RestoreStats> {
        let state = self.reconstruct(id)?;

        let mut plan = Vec::with_capacity(state.len());
        for (key, digest) in &state {
            if !self.blob_exists(digest) {
                return Err(Error::blob_not_found(digest.to_hex()));
            }
            plan.push((destination(target, key)?, digest));
        }

        fs::create_dir_all(target)?;

        let mut stats = RestoreStats::default();
        for (dest, digest) in plan {
            let content = self.load_blob(digest)?;

            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, &content)?;

            debug!(path = %dest.display(), digest = %digest, "restored file");
            stats.files_written += 1;
            stats.bytes_written += content.len() as u64;
        }

        info!(
            id,
            target = %target.display(),
            files = stats.files_written,
            bytes = stats.bytes_written,
            "restored snapshot"
        );

        Ok(stats)
    }
}

/// Resolve a record key under `target`, refusing anything that could escape it.
fn destination(target: &Path, key: &str) -> Result<PathBuf> {
    let mut dest = target.to_path_buf();

    for part in key.split('/') {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == part => dest.push(name),
            _ => {
                return Err(Error::invalid_path(
                    key,
                    format!("unsafe path component {:?}", part),
                ));
            }
        }
    }

    Ok(dest)
}

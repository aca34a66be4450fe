//! # Strata Core
//!
//! An incremental, content-addressed snapshot store for directory trees.
//!
//! File contents are stored once as blobs named by their BLAKE3 digest. Each snapshot records
//! only what changed since its parent, forming a singly linked chain that can be replayed to
//! reconstruct any point in history. Old snapshots can be pruned without breaking the ones
//! that remain.
//!
//! ## Layout
//!
//! ```text
//! <db-root>/
//!   config                              version and hash algorithm
//!   blobs/<digest[0:2]>/<digest[2:]>    raw file contents
//!   snapshots/<id>.json                 one delta record per snapshot
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use strata_core::Store;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open_or_init("./strata-db")?;
//!
//! // Capture the current state of a directory
//! let snapshot = store.create_snapshot(Path::new("./my-data"))?;
//! println!("snapshot {} uses {} new bytes", snapshot.id, store.physical_size(snapshot.id)?);
//!
//! // Bring it back somewhere else
//! store.restore(snapshot.id, Path::new("./restored"))?;
//!
//! // Drop it from history and reclaim its unique blobs
//! let stats = store.prune(snapshot.id)?;
//! println!("freed {} bytes", stats.bytes_freed);
//! # Ok(())
//! # }
//! ```
//!
//! A store handle assumes it is the only writer of its directory.

mod chain;
mod error;
mod hash;
mod prune;
mod restore;
mod size;
mod snapshot;
mod store;
mod verify;
mod walk;

pub use error::{Error, Result};
pub use hash::{Algorithm, DIGEST_SIZE, Digest};
pub use prune::{GcStats, PruneStats};
pub use restore::RestoreStats;
pub use size::SnapshotSummary;
pub use snapshot::{Changes, FlatState, Snapshot, SnapshotId};
pub use store::Store;
pub use verify::VerifyReport;
pub use walk::{ScannedFile, ScannedTree, scan_tree};

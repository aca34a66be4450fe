mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use output::{
    BrokenSnapshot, GcOutput, ListOutput, OutputWriter, PruneOutput, RestoreOutput,
    SnapshotOutput, SnapshotRow, VerifyOutput,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use strata_core::{SnapshotId, Store};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const ROOT_ENV: &str = "STRATA_ROOT";
const DEFAULT_ROOT: &str = "./strata-db";

/// Result code for a failed command.
const EXIT_ERROR: u8 = 1;
/// Result code for `verify` finding problems.
const EXIT_VERIFY_FAILED: u8 = 2;

/// Strata - incremental snapshots of directory trees
#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Incremental, content-addressed snapshots of directory trees", long_about = None)]
#[command(version)]
struct Cli {
    /// Database root directory (defaults to STRATA_ROOT env var or ./strata-db)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log debug detail to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the current state of a directory as a new snapshot
    Snapshot {
        /// Directory to capture
        dir: PathBuf,
    },

    /// List snapshots with their logical and physical sizes
    List,

    /// Write a snapshot's files into a directory
    Restore {
        /// Snapshot to restore
        id: SnapshotId,

        /// Destination directory (created if missing)
        target: PathBuf,
    },

    /// Remove a snapshot from history and reclaim its unique blobs
    Prune {
        /// Snapshot to remove
        id: SnapshotId,
    },

    /// Delete blobs that no snapshot references
    Gc {
        /// Dry run - show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Check that every snapshot can be restored
    Verify,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let writer = OutputWriter::new(cli.json);
    let root = resolve_root(cli.root, std::env::var_os(ROOT_ENV).map(PathBuf::from));
    debug!(root = %root.display(), "using database");

    let result = match cli.command {
        Commands::Snapshot { dir } => cmd_snapshot(&writer, &root, &dir),
        Commands::List => cmd_list(&writer, &root),
        Commands::Restore { id, target } => cmd_restore(&writer, &root, id, &target),
        Commands::Prune { id } => cmd_prune(&writer, &root, id),
        Commands::Gc { dry_run } => cmd_gc(&writer, &root, dry_run),
        Commands::Verify => cmd_verify(&writer, &root),
    };

    match result {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            writer.write_error(&e, EXIT_ERROR);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Stderr subscriber filtered by RUST_LOG, falling back to `warn` (or `debug` when verbose).
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Database root: CLI arg > STRATA_ROOT env var > ./strata-db default
fn resolve_root(flag: Option<PathBuf>, env: Option<PathBuf>) -> PathBuf {
    flag.or(env).unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
}

fn open_store(root: &Path) -> Result<Store> {
    Store::open_or_init(root).with_context(|| format!("Failed to open database at {}", root.display()))
}

fn cmd_snapshot(writer: &OutputWriter, root: &Path, dir: &Path) -> Result<u8> {
    let store = open_store(root)?;

    let snapshot = store
        .create_snapshot(dir)
        .with_context(|| format!("Failed to snapshot {}", dir.display()))?;
    let physical_size = store
        .physical_size(snapshot.id)
        .with_context(|| format!("Failed to size snapshot {}", snapshot.id))?;

    let output = SnapshotOutput {
        success: true,
        result_code: 0,
        id: snapshot.id,
        parent: snapshot.parent,
        date: snapshot.date,
        added: snapshot.changes.added.len(),
        modified: snapshot.changes.modified.len(),
        deleted: snapshot.changes.deleted.len(),
        physical_size,
    };

    writer.write(&output, || {
        format!(
            "Created snapshot {} ({} added, {} modified, {} deleted, {} new bytes)\n",
            output.id, output.added, output.modified, output.deleted, output.physical_size
        )
    })?;

    Ok(0)
}

fn cmd_list(writer: &OutputWriter, root: &Path) -> Result<u8> {
    let store = open_store(root)?;

    let snapshots: Vec<SnapshotRow> = store
        .summaries()
        .with_context(|| "Failed to list snapshots")?
        .into_iter()
        .map(SnapshotRow::from)
        .collect();
    let db_size = store
        .db_size()
        .with_context(|| "Failed to compute database size")?;

    let output = ListOutput {
        success: true,
        result_code: 0,
        total_physical_size: snapshots.iter().map(|row| row.physical_size).sum(),
        snapshots,
        db_size,
    };

    writer.write(&output, || output.to_text())?;

    Ok(0)
}

fn cmd_restore(writer: &OutputWriter, root: &Path, id: SnapshotId, target: &Path) -> Result<u8> {
    let store = open_store(root)?;

    let stats = store
        .restore(id, target)
        .with_context(|| format!("Failed to restore snapshot {} to {}", id, target.display()))?;

    let output = RestoreOutput {
        success: true,
        result_code: 0,
        id,
        target: target.display().to_string(),
        files_written: stats.files_written,
        bytes_written: stats.bytes_written,
    };

    writer.write(&output, || {
        format!(
            "Restored snapshot {} to {} ({} files, {} bytes)\n",
            output.id, output.target, output.files_written, output.bytes_written
        )
    })?;

    Ok(0)
}

fn cmd_prune(writer: &OutputWriter, root: &Path, id: SnapshotId) -> Result<u8> {
    let store = open_store(root)?;

    let stats = store
        .prune(id)
        .with_context(|| format!("Failed to prune snapshot {}", id))?;

    let output = PruneOutput {
        success: true,
        result_code: 0,
        id: stats.snapshot_id,
        relinked: stats.relinked,
        blobs_deleted: stats.blobs_deleted,
        bytes_freed: stats.bytes_freed,
    };

    writer.write(&output, || {
        let mut text = format!("Pruned snapshot {}\n", output.id);
        if let Some(successor) = output.relinked {
            text.push_str(&format!("Re-linked snapshot {}\n", successor));
        }
        text.push_str(&format!(
            "Deleted {} blobs, freed {} bytes\n",
            output.blobs_deleted, output.bytes_freed
        ));
        text
    })?;

    Ok(0)
}

fn cmd_gc(writer: &OutputWriter, root: &Path, dry_run: bool) -> Result<u8> {
    let store = open_store(root)?;

    let stats = store
        .gc(dry_run)
        .with_context(|| "Failed to run garbage collection")?;

    let output = GcOutput {
        success: true,
        result_code: 0,
        dry_run,
        blobs_deleted: stats.blobs_deleted,
        bytes_freed: stats.bytes_freed,
    };

    writer.write(&output, || {
        if dry_run {
            format!(
                "Dry run - no blobs deleted\nWould delete {} blobs\nWould free {} bytes\n",
                output.blobs_deleted, output.bytes_freed
            )
        } else {
            format!(
                "Deleted {} blobs\nFreed {} bytes\n",
                output.blobs_deleted, output.bytes_freed
            )
        }
    })?;

    Ok(0)
}

fn cmd_verify(writer: &OutputWriter, root: &Path) -> Result<u8> {
    let store = open_store(root)?;

    let report = store
        .verify()
        .with_context(|| "Failed to verify database")?;

    let ok = report.is_ok();
    let result_code = if ok { 0 } else { EXIT_VERIFY_FAILED };
    let output = VerifyOutput {
        success: ok,
        result_code,
        snapshots_checked: report.snapshots_checked,
        blobs_checked: report.blobs_checked,
        broken_snapshots: report
            .broken_snapshots
            .into_iter()
            .map(|(id, reason)| BrokenSnapshot { id, reason })
            .collect(),
        missing_blobs: report.missing_blobs,
        corrupted_blobs: report.corrupted_blobs,
        unreferenced_blobs: report.unreferenced_blobs,
    };

    writer.write(&output, || output.to_text())?;

    Ok(result_code)
}

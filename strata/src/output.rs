//! Output formatting for CLI commands.
//!
//! Every command builds one serializable DTO. In JSON mode the DTO is printed as is; in text
//! mode a closure renders the human-readable form.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Write};
use strata_core::{Digest, SnapshotId, SnapshotSummary};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write `data` as JSON, or the result of `text_fn` in text mode.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        let mut out = self.stdout.lock();
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(out, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(out, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error to stderr, including its context chain.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `snapshot` command.
#[derive(Debug, Serialize)]
pub struct SnapshotOutput {
    pub success: bool,
    pub result_code: u8,
    pub id: SnapshotId,
    pub parent: Option<SnapshotId>,
    pub date: DateTime<Utc>,
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub physical_size: u64,
}

/// One row of the `list` table.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotRow {
    pub id: SnapshotId,
    pub date: DateTime<Utc>,
    pub parent: Option<SnapshotId>,
    pub files: usize,
    pub logical_size: u64,
    pub physical_size: u64,
}

impl From<SnapshotSummary> for SnapshotRow {
    fn from(summary: SnapshotSummary) -> Self {
        Self {
            id: summary.id,
            date: summary.date,
            parent: summary.parent,
            files: summary.file_count,
            logical_size: summary.logical_size,
            physical_size: summary.physical_size,
        }
    }
}

/// Output for `list` command.
#[derive(Debug, Serialize)]
pub struct ListOutput {
    pub success: bool,
    pub result_code: u8,
    pub snapshots: Vec<SnapshotRow>,
    /// Sum of the physical column.
    pub total_physical_size: u64,
    /// Bytes actually stored in the database.
    pub db_size: u64,
}

impl ListOutput {
    /// Fixed-width table with a totals line.
    pub fn to_text(&self) -> String {
        if self.snapshots.is_empty() {
            return "No snapshots\n".to_string();
        }

        let mut text = format!(
            "{:>6}  {:<19}  {:>14}  {:>14}\n",
            "ID", "DATE", "LOGICAL", "PHYSICAL"
        );
        for row in &self.snapshots {
            text.push_str(&format!(
                "{:>6}  {:<19}  {:>14}  {:>14}\n",
                row.id,
                row.date.format("%Y-%m-%d %H:%M:%S"),
                row.logical_size,
                row.physical_size
            ));
        }
        text.push_str(&format!(
            "{:>6}  {:<19}  {:>14}  {:>14}\n",
            "", "total", "", self.total_physical_size
        ));
        text.push_str(&format!("Database size: {} bytes\n", self.db_size));
        text
    }
}

/// Output for `restore` command.
#[derive(Debug, Serialize)]
pub struct RestoreOutput {
    pub success: bool,
    pub result_code: u8,
    pub id: SnapshotId,
    pub target: String,
    pub files_written: usize,
    pub bytes_written: u64,
}

/// Output for `prune` command.
#[derive(Debug, Serialize)]
pub struct PruneOutput {
    pub success: bool,
    pub result_code: u8,
    pub id: SnapshotId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relinked: Option<SnapshotId>,
    pub blobs_deleted: usize,
    pub bytes_freed: u64,
}

/// Output for `gc` command.
#[derive(Debug, Serialize)]
pub struct GcOutput {
    pub success: bool,
    pub result_code: u8,
    pub dry_run: bool,
    pub blobs_deleted: usize,
    pub bytes_freed: u64,
}

/// A snapshot that failed verification.
#[derive(Debug, Clone, Serialize)]
pub struct BrokenSnapshot {
    pub id: SnapshotId,
    pub reason: String,
}

/// Output for `verify` command.
#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub success: bool,
    pub result_code: u8,
    pub snapshots_checked: usize,
    pub blobs_checked: usize,
    pub broken_snapshots: Vec<BrokenSnapshot>,
    pub missing_blobs: Vec<Digest>,
    pub corrupted_blobs: Vec<Digest>,
    pub unreferenced_blobs: usize,
}

impl VerifyOutput {
    pub fn to_text(&self) -> String {
        let mut text = format!(
            "Checked {} snapshots and {} blobs\n",
            self.snapshots_checked, self.blobs_checked
        );
        for broken in &self.broken_snapshots {
            text.push_str(&format!("broken snapshot {}: {}\n", broken.id, broken.reason));
        }
        for digest in &self.missing_blobs {
            text.push_str(&format!("missing blob {}\n", digest));
        }
        for digest in &self.corrupted_blobs {
            text.push_str(&format!("corrupted blob {}\n", digest));
        }
        if self.unreferenced_blobs > 0 {
            text.push_str(&format!(
                "{} unreferenced blobs (run `strata gc` to reclaim)\n",
                self.unreferenced_blobs
            ));
        }
        text.push_str(if self.success { "OK\n" } else { "FAILED\n" });
        text
    }
}

//! Error types for strata_core.

use crate::snapshot::SnapshotId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using strata_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// No record exists for the requested snapshot.
    #[error("Snapshot not found: {id}")]
    SnapshotNotFound { id: SnapshotId },

    /// A record with this id is already persisted.
    #[error("Snapshot already exists: {id}")]
    SnapshotExists { id: SnapshotId },

    /// Snapshot record exists but cannot be used.
    #[error("Corrupt snapshot record at {path}: {reason}")]
    CorruptRecord { path: PathBuf, reason: String },

    /// A digest is referenced but no blob is stored for it.
    #[error("Blob not found: {digest}")]
    BlobNotFound { digest: String },

    /// Blob content does not hash to its name.
    #[error("Corrupted blob at {path}: {reason}")]
    CorruptedBlob { path: PathBuf, reason: String },

    /// Invalid digest format or encoding.
    #[error("Invalid digest: {reason}")]
    InvalidDigest { reason: String },

    /// Store is invalid or not initialized.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// A path cannot be scanned or restored.
    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },
}

impl Error {
    /// Create a SnapshotNotFound error.
    pub fn snapshot_not_found(id: SnapshotId) -> Self {
        Error::SnapshotNotFound { id }
    }

    /// Create a SnapshotExists error.
    pub fn snapshot_exists(id: SnapshotId) -> Self {
        Error::SnapshotExists { id }
    }

    /// Create a CorruptRecord error.
    pub fn corrupt_record(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a BlobNotFound error.
    pub fn blob_not_found(digest: impl Into<String>) -> Self {
        Error::BlobNotFound {
            digest: digest.into(),
        }
    }

    /// Create a CorruptedBlob error.
    pub fn corrupted_blob(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptedBlob {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidDigest error.
    pub fn invalid_digest(reason: impl Into<String>) -> Self {
        Error::InvalidDigest {
            reason: reason.into(),
        }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// True when the error means "nothing stored under that name".
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::SnapshotNotFound { .. } | Error::BlobNotFound { .. } => true,
            Error::Io { source } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}

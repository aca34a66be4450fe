//! Store management and blob I/O.

use crate::chain::ChainCache;
use crate::error::{Error, Result};
use crate::hash::{Algorithm, Digest};
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory holding sharded blobs.
pub(crate) const BLOBS_DIR: &str = "blobs";

/// Directory holding one JSON record per snapshot.
pub(crate) const SNAPSHOTS_DIR: &str = "snapshots";

/// Store configuration file.
const CONFIG_FILE: &str = "config";

/// A snapshot database rooted at a directory.
///
/// The handle owns the record and flat-state caches; two handles on the same
/// directory do not share them.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    algorithm: Algorithm,
    pub(crate) cache: Mutex<ChainCache>,
}

impl Store {
    /// Initialize a new store at the given path.
    ///
    /// Creates the directory structure:
    /// - `blobs/` for content-addressed file data
    /// - `snapshots/` for snapshot records
    /// - `config` file with version and algorithm
    pub fn init<P: AsRef<Path>>(root: P, algorithm: Algorithm) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join(BLOBS_DIR))?;
        fs::create_dir_all(root.join(SNAPSHOTS_DIR))?;

        let config_content = format!("version=1\nalgo={}\n", algorithm.as_str());
        fs::write(root.join(CONFIG_FILE), config_content)?;

        info!(root = %root.display(), algorithm = algorithm.as_str(), "initialized store");

        Ok(Self::with_parts(root, algorithm))
    }

    /// Open an existing store at the given path.
    ///
    /// Validates the store structure and reads the configuration.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(Error::invalid_store(&root, "directory does not exist"));
        }

        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }

        let config_content = fs::read_to_string(&config_path)?;
        let algorithm = Self::parse_config(&root, &config_content)?;

        for dir in [BLOBS_DIR, SNAPSHOTS_DIR] {
            if !root.join(dir).is_dir() {
                return Err(Error::invalid_store(
                    &root,
                    format!("{} directory missing", dir),
                ));
            }
        }

        debug!(root = %root.display(), "opened store");

        Ok(Self::with_parts(root, algorithm))
    }

    /// Open the store at `root`, initializing it first if it has no config yet.
    pub fn open_or_init<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if root.join(CONFIG_FILE).exists() {
            Self::open(root)
        } else {
            Self::init(root, Algorithm::Blake3)
        }
    }

    fn with_parts(root: PathBuf, algorithm: Algorithm) -> Self {
        Self {
            root,
            algorithm,
            cache: Mutex::new(ChainCache::default()),
        }
    }

    /// Parse the config file to extract the algorithm.
    fn parse_config(root: &Path, content: &str) -> Result<Algorithm> {
        let mut version = None;
        let mut algo = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "version" => version = Some(value.trim()),
                    "algo" => algo = Some(value.trim()),
                    _ => {}
                }
            }
        }

        if version != Some("1") {
            return Err(Error::invalid_store(
                root,
                format!("unsupported config version: {:?}", version),
            ));
        }

        let algo_str = algo.ok_or_else(|| Error::invalid_store(root, "missing algo in config"))?;
        Algorithm::parse(algo_str)
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the algorithm used by this store.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn blobs_dir(&self) -> PathBuf {
        self.root.join(BLOBS_DIR)
    }

    pub(crate) fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    /// Get the path to a blob file given its digest.
    ///
    /// Returns: `blobs/{prefix}/{suffix}`
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.blobs_dir().join(digest.prefix()).join(digest.suffix())
    }

    /// Store content and return its digest.
    ///
    /// Writing content that is already stored is a no-op.
    pub fn store_blob(&self, content: &[u8]) -> Result<Digest> {
        let digest = Digest::of(content);
        let blob_path = self.blob_path(&digest);

        if blob_path.is_file() {
            return Ok(digest);
        }

        let shard_dir = self.blobs_dir().join(digest.prefix());
        fs::create_dir_all(&shard_dir)?;

        // Write atomically using tempfile
        let mut temp_file = tempfile::NamedTempFile::new_in(&shard_dir)?;
        temp_file.write_all(content)?;
        temp_file.flush()?;
        temp_file.persist(&blob_path)?;

        debug!(digest = %digest, bytes = content.len(), "stored blob");

        Ok(digest)
    }

    /// Retrieve blob content by digest.
    ///
    /// Content is re-hashed on the way out; a mismatch is reported as corruption.
    pub fn load_blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        let blob_path = self.blob_path(digest);

        let content = match fs::read(&blob_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::blob_not_found(digest.to_hex()));
            }
            Err(e) => return Err(e.into()),
        };

        let computed = Digest::of(&content);
        if computed != *digest {
            return Err(Error::corrupted_blob(
                &blob_path,
                format!("Hash mismatch: expected {}, got {}", digest, computed),
            ));
        }

        Ok(content)
    }

    /// Check whether a blob is stored.
    pub fn blob_exists(&self, digest: &Digest) -> bool {
        self.blob_path(digest).is_file()
    }

    /// Size of a stored blob in bytes.
    ///
    /// A missing blob reports 0, so size queries never fail on an inconsistent store.
    /// Do not read a non-zero size as proof of existence, or zero as proof of absence.
    pub fn blob_size(&self, digest: &Digest) -> u64 {
        fs::metadata(self.blob_path(digest))
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// List every stored blob.
    ///
    /// Entries whose shard and file names do not form a valid digest are skipped.
    pub fn list_blobs(&self) -> Result<Vec<Digest>> {
        let blobs_dir = self.blobs_dir();
        let mut digests = Vec::new();

        if !blobs_dir.exists() {
            return Ok(digests);
        }

        for shard_entry in fs::read_dir(&blobs_dir)? {
            let shard_path = shard_entry?.path();
            if !shard_path.is_dir() {
                continue;
            }

            let prefix = shard_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_string();

            for blob_entry in fs::read_dir(&shard_path)? {
                let blob_path = blob_entry?.path();
                if !blob_path.is_file() {
                    continue;
                }

                let suffix = blob_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                match Digest::from_hex(&format!("{}{}", prefix, suffix)) {
                    Ok(digest) => digests.push(digest),
                    Err(_) => warn!(path = %blob_path.display(), "skipping unrecognized blob entry"),
                }
            }
        }

        digests.sort();
        Ok(digests)
    }

    /// Delete a stored blob, returning the number of bytes freed.
    ///
    /// The shard directory is removed once it is empty. Deleting a missing blob frees 0 bytes.
    pub fn remove_blob(&self, digest: &Digest) -> Result<u64> {
        let blob_path = self.blob_path(digest);

        let size = match fs::metadata(&blob_path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        fs::remove_file(&blob_path)?;

        let shard_dir = self.blobs_dir().join(digest.prefix());
        if let Ok(mut entries) = fs::read_dir(&shard_dir)
            && entries.next().is_none()
        {
            let _ = fs::remove_dir(&shard_dir);
        }

        debug!(digest = %digest, bytes = size, "removed blob");

        Ok(size)
    }
}

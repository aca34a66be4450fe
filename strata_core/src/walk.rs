//! Directory scanning.

use crate::error::{Error, Result};
use crate::hash::Digest;
use crate::snapshot::FlatState;
use crate::store::Store;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// One regular file captured by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub digest: Digest,
    pub content: Vec<u8>,
}

/// Every regular file under a scanned root, keyed by `/`-separated relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannedTree {
    pub files: BTreeMap<String, ScannedFile>,
}

impl ScannedTree {
    /// The path → digest view of the scan.
    pub fn flat(&self) -> FlatState {
        self.files
            .iter()
            .map(|(path, file)| (path.clone(), file.digest))
            .collect()
    }

    /// Total number of content bytes read.
    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|f| f.content.len() as u64).sum()
    }
}

impl Store {
    /// Scan a directory, leaving this store's own directory out if it lies inside.
    pub fn scan(&self, dir: &Path) -> Result<ScannedTree> {
        scan_tree(dir, Some(self.root()))
    }
}

/// Walk `root` and read every regular file once.
///
/// Hidden and ignored files are included; symlinks are neither followed nor recorded.
/// `exclude` prunes one directory (and everything below it) from the walk.
pub fn scan_tree(root: &Path, exclude: Option<&Path>) -> Result<ScannedTree> {
    let metadata = fs::metadata(root)?;
    if !metadata.is_dir() {
        return Err(Error::invalid_path(root, "not a directory"));
    }

    let root = root.canonicalize()?;
    let exclude: Option<PathBuf> = exclude.and_then(|p| p.canonicalize().ok());

    let mut builder = ignore::WalkBuilder::new(&root);
    builder.standard_filters(false).follow_links(false);
    if let Some(excluded) = exclude {
        builder.filter_entry(move |entry| entry.path() != excluded);
    }

    let mut tree = ScannedTree::default();

    for entry in builder.build() {
        let entry = entry?;
        let is_file = entry.file_type().is_some_and(|t| t.is_file());
        if entry.depth() == 0 || !is_file {
            continue;
        }

        let entry_path = entry.path();
        let relative = relative_key(&root, entry_path)?;
        let content = fs::read(entry_path)?;
        let digest = Digest::of(&content);

        tree.files.insert(relative, ScannedFile { digest, content });
    }

    debug!(
        root = %root.display(),
        files = tree.files.len(),
        bytes = tree.total_bytes(),
        "scanned directory"
    );

    Ok(tree)
}

/// Turn an absolute entry path into the `/`-joined key used in snapshot records.
fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| Error::invalid_path(path, "outside of scanned root"))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let name = name
                    .to_str()
                    .ok_or_else(|| Error::invalid_path(path, "file name is not valid UTF-8"))?;
                parts.push(name);
            }
            _ => return Err(Error::invalid_path(path, "unexpected path component")),
        }
    }

    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Algorithm;
    use tempfile::TempDir;

    #[test]
    fn test_scan_flat_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), b"alpha").unwrap();
        fs::write(temp_dir.path().join("b.txt"), b"beta").unwrap();

        let tree = scan_tree(temp_dir.path(), None).unwrap();

        assert_eq!(tree.files.len(), 2);
        assert_eq!(tree.files["a.txt"].content, b"alpha");
        assert_eq!(tree.files["b.txt"].digest, Digest::of(b"beta"));
        assert_eq!(tree.total_bytes(), 9);
    }

    #[test]
    fn test_scan_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("sub").join("deeper");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp_dir.path().join("root.txt"), b"root").unwrap();
        fs::write(nested.join("leaf.txt"), b"leaf").unwrap();

        let flat = scan_tree(temp_dir.path(), None).unwrap().flat();

        let keys: Vec<&str> = flat.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["root.txt", "sub/deeper/leaf.txt"]);
    }

    #[test]
    fn test_scan_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("empty")).unwrap();

        let tree = scan_tree(temp_dir.path(), None).unwrap();
        assert!(tree.files.is_empty());
    }

    #[test]
    fn test_scan_includes_hidden_and_ignored_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".hidden"), b"h").unwrap();
        fs::write(temp_dir.path().join(".gitignore"), b"*.log\n").unwrap();
        fs::write(temp_dir.path().join("debug.log"), b"log").unwrap();

        let tree = scan_tree(temp_dir.path(), None).unwrap();
        assert!(tree.files.contains_key(".hidden"));
        assert!(tree.files.contains_key(".gitignore"));
        assert!(tree.files.contains_key("debug.log"));
    }

    #[test]
    fn test_scan_deep_nesting() {
        let temp_dir = TempDir::new().unwrap();
        let mut dir = temp_dir.path().to_path_buf();
        for _ in 0..100 {
            dir = dir.join("d");
        }
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("bottom.txt"), b"bottom").unwrap();

        let tree = scan_tree(temp_dir.path(), None).unwrap();
        let expected = format!("{}bottom.txt", "d/".repeat(100));
        assert!(tree.files.contains_key(&expected));
    }

    #[test]
    fn test_scan_excludes_store_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path().join(".strata"), Algorithm::Blake3).unwrap();
        store.store_blob(b"inside the store").unwrap();
        fs::write(temp_dir.path().join("data.txt"), b"data").unwrap();

        let tree = store.scan(temp_dir.path()).unwrap();
        let keys: Vec<&String> = tree.files.keys().collect();
        assert_eq!(keys, vec!["data.txt"]);
    }

    #[test]
    fn test_scan_rejects_missing_and_non_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(scan_tree(&file, None), Err(Error::InvalidPath { .. })));

        let missing = scan_tree(&temp_dir.path().join("missing"), None);
        assert!(missing.unwrap_err().is_not_found());
    }

    #[test]
    #[cfg(unix)]
    fn test_scan_skips_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("target.txt"), b"target").unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("target.txt"),
            temp_dir.path().join("link.txt"),
        )
        .unwrap();

        let tree = scan_tree(temp_dir.path(), None).unwrap();
        assert!(tree.files.contains_key("target.txt"));
        assert!(!tree.files.contains_key("link.txt"));
    }
}

//! End-to-end workflows through the public API.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use strata_core::{Digest, Error, Store};
use tempfile::TempDir;

/// Read every file under `root` into a map keyed by `/`-separated relative path.
fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let key = path
                    .strip_prefix(root)
                    .unwrap()
                    .components()
                    .map(|c| c.as_os_str().to_str().unwrap())
                    .collect::<Vec<_>>()
                    .join("/");
                files.insert(key, fs::read(&path).unwrap());
            }
        }
    }

    files
}

#[test]
fn alpha_beta_gamma_scenario() {
    let temp = TempDir::new().unwrap();
    let store = Store::open_or_init(temp.path().join("db")).unwrap();
    let source = temp.path().join("source");
    fs::create_dir(&source).unwrap();

    fs::write(source.join("a.txt"), "alpha").unwrap();
    fs::write(source.join("b.txt"), "beta").unwrap();
    let s1 = store.create_snapshot(&source).unwrap();
    assert_eq!(
        s1.changes.added.keys().cloned().collect::<Vec<_>>(),
        vec!["a.txt".to_string(), "b.txt".to_string()]
    );

    fs::write(source.join("c.txt"), "gamma").unwrap();
    let s2 = store.create_snapshot(&source).unwrap();
    assert_eq!(
        s2.changes.added.keys().cloned().collect::<Vec<_>>(),
        vec!["c.txt".to_string()]
    );
    assert!(s2.changes.modified.is_empty());
    assert!(s2.changes.deleted.is_empty());

    assert_eq!(store.logical_size(s2.id).unwrap(), 14);
    assert_eq!(store.physical_size(s2.id).unwrap(), 5);

    store.prune(s1.id).unwrap();

    let state = store.reconstruct(s2.id).unwrap();
    assert_eq!(state.len(), 3);

    let dest = temp.path().join("restored");
    store.restore(s2.id, &dest).unwrap();
    assert_eq!(read_tree(&dest), read_tree(&source));
}

#[test]
fn history_survives_every_prune_order() {
    for victim in 1..=4 {
        let temp = TempDir::new().unwrap();
        let store = Store::open_or_init(temp.path().join("db")).unwrap();
        let source = temp.path().join("source");
        fs::create_dir_all(source.join("docs")).unwrap();

        // Four snapshots with adds, modifications, deletions and shared content
        let mut expected = BTreeMap::new();
        fs::write(source.join("docs/readme.md"), "v1").unwrap();
        fs::write(source.join("shared-1.bin"), "same").unwrap();
        expected.insert(store.create_snapshot(&source).unwrap().id, read_tree(&source));

        fs::write(source.join("docs/readme.md"), "v2").unwrap();
        fs::write(source.join("shared-2.bin"), "same").unwrap();
        expected.insert(store.create_snapshot(&source).unwrap().id, read_tree(&source));

        fs::remove_file(source.join("shared-1.bin")).unwrap();
        fs::write(source.join("notes.txt"), "only in three").unwrap();
        expected.insert(store.create_snapshot(&source).unwrap().id, read_tree(&source));

        fs::remove_file(source.join("notes.txt")).unwrap();
        fs::write(source.join("docs/readme.md"), "v1").unwrap();
        expected.insert(store.create_snapshot(&source).unwrap().id, read_tree(&source));

        store.prune(victim).unwrap();
        expected.remove(&victim);

        for (id, files) in &expected {
            let dest = temp.path().join(format!("restore-{}", id));
            store.restore(*id, &dest).unwrap();
            assert_eq!(&read_tree(&dest), files, "snapshot {} after pruning {}", id, victim);
        }

        // Nothing dangling, nothing leaked
        let report = store.verify().unwrap();
        assert!(report.is_ok(), "verify after pruning {}: {:?}", victim, report);
        assert_eq!(report.unreferenced_blobs, 0);
        assert_eq!(store.referenced_digests().unwrap().len(), store.list_blobs().unwrap().len());
    }
}

#[test]
fn dedup_across_paths_and_snapshots() {
    let temp = TempDir::new().unwrap();
    let store = Store::open_or_init(temp.path().join("db")).unwrap();
    let source = temp.path().join("source");
    fs::create_dir(&source).unwrap();

    fs::write(source.join("one.txt"), "duplicate").unwrap();
    fs::write(source.join("two.txt"), "duplicate").unwrap();
    store.create_snapshot(&source).unwrap();

    let state = store.reconstruct(1).unwrap();
    assert_eq!(state["one.txt"], state["two.txt"]);
    assert_eq!(store.list_blobs().unwrap(), vec![Digest::of(b"duplicate")]);

    fs::write(source.join("three.txt"), "duplicate").unwrap();
    store.create_snapshot(&source).unwrap();

    assert_eq!(store.physical_size(2).unwrap(), 0);
    assert_eq!(store.logical_size(2).unwrap(), 27);
    assert_eq!(store.db_size().unwrap(), 9);
}

#[test]
fn reopened_store_sees_same_history() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("db");
    let source = temp.path().join("source");
    fs::create_dir(&source).unwrap();

    {
        let store = Store::open_or_init(&root).unwrap();
        fs::write(source.join("a.txt"), "first").unwrap();
        store.create_snapshot(&source).unwrap();
        fs::write(source.join("a.txt"), "second").unwrap();
        store.create_snapshot(&source).unwrap();
    }

    let store = Store::open(&root).unwrap();
    let summaries = store.summaries().unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[1].logical_size, 6);

    let dest = temp.path().join("restored");
    store.restore(1, &dest).unwrap();
    assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "first");
}

#[test]
fn snapshot_of_directory_containing_the_store() {
    let temp = TempDir::new().unwrap();
    let store = Store::open_or_init(temp.path().join(".strata")).unwrap();
    fs::write(temp.path().join("data.txt"), "payload").unwrap();

    store.create_snapshot(temp.path()).unwrap();
    store.create_snapshot(temp.path()).unwrap();

    // The second scan must not pick up blobs or records written by the first
    let second = store.load_snapshot(2).unwrap();
    assert!(second.changes.is_empty());
}

#[test]
fn pruning_unknown_snapshot_is_an_error() {
    let temp = TempDir::new().unwrap();
    let store = Store::open_or_init(temp.path().join("db")).unwrap();

    let err = store.prune(1).unwrap_err();
    assert!(matches!(err, Error::SnapshotNotFound { id: 1 }));
    assert!(err.is_not_found());
}

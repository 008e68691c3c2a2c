//! Latest slot, snapshots and reference resolution on disk.

use kiln::artifact::{Artifact, ArtifactStore, FileEntry};
use kiln::error::StorageError;
use tempfile::TempDir;

fn store(dir: &TempDir) -> ArtifactStore {
    ArtifactStore::new(dir.path().join("output"), dir.path().join("modified_output"))
}

fn artifact(files: &[(&str, &str)]) -> Artifact {
    Artifact {
        name: Some("demo".to_string()),
        files: files
            .iter()
            .map(|(path, text)| (path.to_string(), FileEntry::Text(text.to_string())))
            .collect(),
        ..Default::default()
    }
}

#[test]
fn latest_slot_replaces_the_previous_tree() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store
        .save_latest(&artifact(&[("old.html", "<p>old</p>"), ("src/a.ts", "a")]))
        .unwrap();
    let saved = store.save_latest(&artifact(&[("src/b.ts", "b")])).unwrap();

    assert_eq!(saved.version, None);
    assert_eq!(store.tree_files(&saved.root).unwrap(), vec!["src/b.ts"]);
    assert_eq!(store.load(&saved.manifest_path).unwrap().files_count(), 1);
}

#[test]
fn snapshots_never_overwrite_each_other() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let first = store.save_snapshot(&artifact(&[("a.ts", "1")])).unwrap();
    let second = store.save_snapshot(&artifact(&[("a.ts", "2")])).unwrap();

    assert_ne!(first.root, second.root);
    assert_ne!(first.version, second.version);
    assert_eq!(store.snapshots().unwrap(), vec![first.root.clone(), second.root.clone()]);
    assert_eq!(std::fs::read_to_string(first.tree_path.join("a.ts")).unwrap(), "1");
}

#[test]
fn newest_snapshot_is_the_latest_project() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    assert!(store.latest().unwrap().is_none());

    let fresh = store.save_latest(&artifact(&[("a.ts", "fresh")])).unwrap();
    assert_eq!(store.latest_manifest().unwrap(), Some(fresh.manifest_path));

    let snapshot = store.save_snapshot(&artifact(&[("a.ts", "changed")])).unwrap();
    let latest = store.latest().unwrap().unwrap();
    assert_eq!(latest.manifest_path, snapshot.manifest_path);
    assert_eq!(latest.artifact.files["a.ts"].text(), "changed");
}

#[test]
fn references_resolve_to_a_manifest() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let saved = store.save_latest(&artifact(&[("a.ts", "x")])).unwrap();
    let expected = dunce::canonicalize(&saved.manifest_path).unwrap();

    assert_eq!(store.resolve_reference("output", dir.path()).unwrap(), expected);
    assert_eq!(
        store.resolve_reference("output/project.json", dir.path()).unwrap(),
        expected
    );
    assert!(matches!(
        store.resolve_reference("nowhere", dir.path()),
        Err(StorageError::ArtifactNotFound(_))
    ));
}

#[test]
fn unsafe_paths_are_never_written() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let err = store
        .save_latest(&artifact(&[("../escape.txt", "x")]))
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidPath(_)));
    assert!(!dir.path().join("escape.txt").exists());
    assert!(!dir.path().join("output").join("project.json").exists());
}

#[test]
fn unknown_keys_survive_a_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let mut original = artifact(&[("a.ts", "x")]);
    original
        .metadata
        .insert("dirents".to_string(), serde_json::json!(["src"]));

    let saved = store.save_latest(&original).unwrap();
    assert_eq!(store.load(&saved.manifest_path).unwrap(), original);
}

//! Property-based testing for mew
//!
//! Uses proptest to check capture, restore and path handling across
//! randomly generated trees and entry paths.

use ::mew::utils::sanitize_entry_path;
use ::mew::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;

use crate::integration::tree_state;

/// Generate random file paths
///
/// Directory components never contain a dot and file names always do, so a
/// generated file never collides with a generated directory.
fn path_strategy() -> impl Strategy<Value = PathBuf> {
    let dir_strategy = prop::collection::vec("d[a-z]{1,6}", 0..=3);
    let filename_strategy = prop_oneof![
        "file[0-9]{1,3}\\.txt",
        "[a-z]{1,8}\\.(txt|rs|md)",
    ];

    (dir_strategy, filename_strategy).prop_map(|(dirs, filename)| {
        let mut path = PathBuf::new();
        for dir in dirs {
            path.push(dir);
        }
        path.join(filename)
    })
}

/// Generate random file content
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        "[a-zA-Z0-9 \n]{0,500}".prop_map(|s| s.into_bytes()),
        prop::collection::vec(any::<u8>(), 0..4096),
        (any::<u8>(), 1..2000usize).prop_map(|(byte, count)| vec![byte; count]),
    ]
}

fn tree_strategy() -> impl Strategy<Value = BTreeMap<PathBuf, Vec<u8>>> {
    prop::collection::btree_map(path_strategy(), content_strategy(), 0..30)
}

fn materialize(root: &Path, tree: &BTreeMap<PathBuf, Vec<u8>>) {
    for (path, content) in tree {
        let full_path = root.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full_path, content).unwrap();
    }
}

fn wipe(root: &Path) {
    for entry in fs::read_dir(root).unwrap() {
        let entry = entry.unwrap();
        if entry.file_name() == METADATA_DIR {
            continue;
        }
        if entry.file_type().unwrap().is_dir() {
            fs::remove_dir_all(entry.path()).unwrap();
        } else {
            fs::remove_file(entry.path()).unwrap();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Capturing, wiping and restoring reproduces the tree exactly
    #[test]
    fn capture_restore_identity(tree in tree_strategy()) {
        let temp_dir = TempDir::new().unwrap();
        let mew = Mew::open(temp_dir.path()).unwrap();
        materialize(temp_dir.path(), &tree);
        let before = tree_state(temp_dir.path());

        let snap = mew.capture("prop").unwrap();
        prop_assert_eq!(snap.stats.files, tree.len());

        wipe(temp_dir.path());
        mew.restore(&snap.id).unwrap();

        prop_assert_eq!(tree_state(temp_dir.path()), before);
    }

    /// The same tree in two different roots yields the same identity
    #[test]
    fn identity_is_deterministic(tree in tree_strategy()) {
        let left = TempDir::new().unwrap();
        let right = TempDir::new().unwrap();
        materialize(left.path(), &tree);
        materialize(right.path(), &tree);

        let left_snap = Mew::open(left.path()).unwrap().capture("left").unwrap();
        let right_snap = Mew::open(right.path()).unwrap().capture("right").unwrap();

        prop_assert_eq!(left_snap.id.len(), IDENTITY_LEN);
        prop_assert_eq!(left_snap.id, right_snap.id);
    }

    /// Any identity prefix resolves back to its snapshot
    #[test]
    fn every_prefix_resolves(len in 1usize..=IDENTITY_LEN) {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "alpha").unwrap();
        let mew = Mew::open(temp_dir.path()).unwrap();
        let snap = mew.capture("only").unwrap();

        let resolved = mew.resolve(&snap.id[..len]).unwrap();
        prop_assert_eq!(resolved.id, snap.id);
    }

    /// A sanitized entry path is always relative and never climbs out
    #[test]
    fn sanitized_paths_stay_inside(parts in prop::collection::vec(
        prop_oneof![
            Just("..".to_string()),
            Just(".".to_string()),
            Just("/".to_string()),
            "[a-z]{1,5}",
        ],
        0..6
    )) {
        let raw: PathBuf = parts.iter().collect();
        match sanitize_entry_path(&raw) {
            Ok(Some(clean)) => {
                prop_assert!(clean.is_relative());
                prop_assert!(clean.components().all(|c| matches!(c, Component::Normal(_))));
            }
            Ok(None) => {}
            Err(e) => prop_assert!(matches!(e, MewError::UnsafePath(_))),
        }
    }
}

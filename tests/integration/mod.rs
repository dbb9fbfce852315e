//! Integration tests for mew
//!
//! End-to-end scenarios across init, capture, restore, listing, resolution,
//! verification and garbage collection.

use ::mew::archive::ArchiveReader;
use ::mew::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;
use walkdir::WalkDir;

/// Test harness owning a scratch root and a `Mew` over it
pub struct MewTestHarness {
    pub root: TempDir,
    pub mew: Mew,
    rng: StdRng,
}

impl MewTestHarness {
    /// Create a new harness with default configuration
    pub fn new() -> Self {
        Self::with_builder(MewBuilder::new())
    }

    /// Create a harness from a preconfigured builder
    pub fn with_builder(builder: MewBuilder) -> Self {
        let root = TempDir::new().unwrap();
        let mew = builder.build(root.path()).unwrap();
        Self {
            root,
            mew,
            rng: StdRng::seed_from_u64(42),
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }

    /// Populate `dirs` directories with `files_per_dir` random files each
    pub fn generate_tree(&mut self, dirs: usize, files_per_dir: usize) {
        for d in 0..dirs {
            for f in 0..files_per_dir {
                let size = self.rng.random_range(0..4096);
                let content: Vec<u8> = (0..size).map(|_| self.rng.random()).collect();
                self.write(&format!("dir_{}/file_{}.bin", d, f), content);
            }
        }
    }

    /// Map of every file and directory outside the metadata directory
    pub fn tree_state(&self) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
        tree_state(self.root.path())
    }
}

impl Default for MewTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of a directory as relative path to file contents (None for dirs)
pub fn tree_state(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == METADATA_DIR))
        .map(|e| e.unwrap())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().to_path_buf();
            let content = e.file_type().is_file().then(|| fs::read(e.path()).unwrap());
            (relative, content)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_init_then_load() {
        let harness = MewTestHarness::new();
        assert!(!harness.mew.is_initialized());

        harness.mew.init(false).unwrap();
        assert!(harness.mew.is_initialized());
        assert!(harness.mew.config().archive_dir().is_dir());
        assert!(harness.mew.list().unwrap().is_empty());

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(harness.mew.config().index_path()).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["snapshots"], serde_json::json!([]));
    }

    #[test]
    fn test_reinit_guard_and_force() {
        let harness = MewTestHarness::new();
        harness.write("a.txt", "alpha");
        harness.mew.init(false).unwrap();
        harness.mew.capture("kept").unwrap();

        let err = harness.mew.init(false).unwrap_err();
        assert!(matches!(err, MewError::AlreadyExists(_)));
        assert_eq!(harness.mew.list().unwrap().len(), 1);

        harness.mew.init(true).unwrap();
        assert!(harness.mew.list().unwrap().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_round_trip_random_tree() {
        let mut harness = MewTestHarness::new();
        harness.generate_tree(5, 8);
        fs::create_dir_all(harness.path("empty/nested")).unwrap();
        let before = harness.tree_state();

        let snap = harness.mew.capture("random").unwrap();
        info!("captured {} with {} entries", snap.id, snap.stats.entries());
        assert_eq!(snap.stats.files, 40);
        assert_eq!(snap.stats.directories, 7);

        for entry in fs::read_dir(harness.root.path()).unwrap() {
            let entry = entry.unwrap();
            if entry.file_name() != METADATA_DIR {
                fs::remove_dir_all(entry.path()).unwrap();
            }
        }
        assert!(harness.tree_state().is_empty());

        let result = harness.mew.restore(&snap.id).unwrap();
        assert_eq!(result.files_restored, 40);
        assert_eq!(result.directories_created, 7);
        assert_eq!(harness.tree_state(), before);
    }

    #[test]
    fn test_unchanged_tree_same_identity() {
        let harness = MewTestHarness::new();
        harness.write("a.txt", "alpha");
        harness.write("sub/b.txt", "beta");

        let first = harness.mew.capture("one").unwrap();
        let second = harness.mew.capture("two").unwrap();
        assert_eq!(first.id, second.id);
        assert_ne!(first.archive, second.archive);
        assert!(harness.mew.config().archive_location(&first.archive).is_file());
        assert!(harness.mew.config().archive_location(&second.archive).is_file());

        harness.write("a.txt", "alpha!");
        let third = harness.mew.capture("three").unwrap();
        assert_ne!(first.id, third.id);
    }

    #[test]
    fn test_prefix_resolution() {
        let harness = MewTestHarness::new();
        harness.write("a.txt", "alpha");
        let snap = harness.mew.capture("first").unwrap();

        let prefix = &snap.id[..4];
        assert_eq!(harness.mew.resolve(prefix).unwrap().id, snap.id);
        assert_eq!(harness.mew.resolve("first").unwrap().id, snap.id);
        // An empty key is a prefix of every identity
        assert_eq!(harness.mew.resolve("").unwrap().id, snap.id);
        assert!(harness.mew.resolve("no-such-key").unwrap_err().is_not_found());
    }

    #[test]
    fn test_newest_match_wins_regardless_of_kind() {
        let harness = MewTestHarness::new();
        harness.write("a.txt", "alpha");
        let older = harness.mew.capture("older").unwrap();
        harness.write("a.txt", "other");
        let newer = harness.mew.capture("newer").unwrap();
        harness.write("a.txt", "third");
        let key = newer.id[..3].to_string();
        let titled = harness.mew.capture(&key).unwrap();
        assert_ne!(older.id, newer.id);

        // The newest record titled with the key comes first in stored order
        assert_eq!(harness.mew.resolve(&key).unwrap().id, titled.id);
        assert_eq!(harness.mew.resolve(&newer.id).unwrap().id, newer.id);

        // Strict mode ranks the exact title above the identity prefix
        assert_eq!(harness.mew.resolve_with(&key, ResolveMode::Strict).unwrap().id, titled.id);
    }

    #[test]
    fn test_overlay_keeps_new_files() {
        let harness = MewTestHarness::new();
        harness.write("a.txt", "alpha");
        let snap = harness.mew.capture("base").unwrap();

        harness.write("a.txt", "modified");
        harness.write("new.txt", "created later");
        harness.mew.restore(&snap.id).unwrap();

        assert_eq!(harness.read("a.txt"), "alpha");
        assert_eq!(harness.read("new.txt"), "created later");
    }

    #[test]
    fn test_metadata_never_captured() {
        let harness = MewTestHarness::new();
        harness.mew.init(false).unwrap();
        harness.write(".mew/junk.txt", "private");
        harness.write("a.txt", "alpha");
        harness.write("nested/.mew/stale.txt", "nested metadata");
        harness.write("nested/kept.txt", "content");

        let snap = harness.mew.capture("clean").unwrap();
        let archive = harness.mew.config().archive_location(&snap.archive);
        let headers = ArchiveReader::open(&archive).unwrap().headers().unwrap();
        let paths: Vec<PathBuf> = headers.into_iter().map(|h| h.path).collect();

        assert!(paths
            .iter()
            .all(|p| !p.components().any(|c| c.as_os_str() == METADATA_DIR)));
        assert!(paths.contains(&PathBuf::from("a.txt")));
        assert!(paths.contains(&PathBuf::from("nested/kept.txt")));
    }

    #[test]
    fn test_exclude_patterns() {
        let harness = MewTestHarness::with_builder(
            MewBuilder::new().exclude_patterns(vec!["*.log".to_string(), "target/".to_string()]),
        );
        harness.write("keep.txt", "k");
        harness.write("debug.log", "noise");
        harness.write("deep/trace.log", "noise");
        harness.write("target/out.bin", "build output");

        let snap = harness.mew.capture("filtered").unwrap();
        let paths: Vec<PathBuf> = harness
            .mew
            .entries(&snap.id)
            .unwrap()
            .into_iter()
            .map(|h| h.path)
            .collect();
        assert_eq!(paths, vec![PathBuf::from("deep"), PathBuf::from("keep.txt")]);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let harness = MewTestHarness::new();
        harness.mew.init(false).unwrap();
        harness.write("a.txt", "hello");
        harness.write("sub/b.txt", "world");

        let snap = harness.mew.capture("first").unwrap();
        let listed = harness.mew.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, snap.id);
        assert_eq!(listed[0].title, "first");

        fs::remove_file(harness.path("a.txt")).unwrap();
        harness.write("sub/b.txt", "changed");

        harness.mew.restore("first").unwrap();
        assert_eq!(harness.read("a.txt"), "hello");
        assert_eq!(harness.read("sub/b.txt"), "world");
    }

    #[test]
    fn test_list_newest_first() {
        let harness = MewTestHarness::new();
        harness.mew.init(false).unwrap();
        assert!(harness.mew.list().unwrap().is_empty());

        let mut ids = Vec::new();
        for i in 0..3 {
            harness.write("v.txt", format!("version {}", i));
            ids.push(harness.mew.capture(&format!("v{}", i)).unwrap().id);
        }

        let listed: Vec<String> = harness.mew.list().unwrap().into_iter().map(|s| s.id).collect();
        ids.reverse();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_strict_mode_reports_ambiguity() {
        let harness = MewTestHarness::new();
        harness.write("a.txt", "alpha");
        let captures = [
            harness.mew.capture("same").unwrap(),
            harness.mew.capture("same").unwrap(),
        ];

        let first = harness.mew.resolve_with("same", ResolveMode::FirstMatch).unwrap();
        assert_eq!(first.archive, captures[1].archive);

        match harness.mew.resolve_with("same", ResolveMode::Strict) {
            Err(MewError::AmbiguousKey { key, candidates }) => {
                assert_eq!(key, "same");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_remove_and_gc() {
        let harness = MewTestHarness::new();
        harness.write("a.txt", "alpha");
        let keep = harness.mew.capture("keep").unwrap();
        harness.write("a.txt", "beta");
        let dropped = harness.mew.capture("drop").unwrap();

        let reports = harness.mew.verify_all().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.is_valid()));

        harness.mew.remove("drop").unwrap();
        assert!(harness.mew.resolve(&dropped.id).unwrap_err().is_not_found());

        // An orphan archive plus a stale temp file
        let archive_dir = harness.mew.config().archive_dir();
        fs::write(archive_dir.join("orphan.tar.lz4"), b"orphan").unwrap();
        fs::write(archive_dir.join(".tmp-stale.tar.lz4"), b"partial").unwrap();

        let preview = harness.mew.gc(true).unwrap();
        assert!(preview.dry_run);
        assert_eq!(preview.archives_removed, 1);
        assert_eq!(preview.temp_files_removed, 1);
        assert!(archive_dir.join("orphan.tar.lz4").exists());

        let stats = harness.mew.gc(false).unwrap();
        assert_eq!(stats.archives_removed, 1);
        assert_eq!(stats.temp_files_removed, 1);
        assert!(!archive_dir.join("orphan.tar.lz4").exists());
        assert!(harness.mew.verify(&keep.id).unwrap().is_valid());
    }

    #[test]
    fn test_corrupted_archive_fails_verification_and_restore() {
        let harness = MewTestHarness::new();
        harness.write("a.txt", "alpha".repeat(1000));
        let snap = harness.mew.capture("fragile").unwrap();

        let path = harness.mew.config().archive_location(&snap.archive);
        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes.truncate(mid);
        fs::write(&path, bytes).unwrap();

        let report = harness.mew.verify(&snap.id).unwrap();
        assert!(!report.is_valid());
        assert!(harness.mew.restore(&snap.id).is_err());
    }
}

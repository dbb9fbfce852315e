//! Core data types used throughout the mew library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Records**: `Snapshot`, `SnapshotStats` - what the index persists per capture
//! - **Archive contents**: `EntryHeader`, `EntryKind` - one filesystem object inside an archive
//! - **Operation results**: `RestoreResult`, `GcStats`
//! - **Configuration**: `MewConfig`, `ResolveMode`
//!
//! ## Examples
//!
//! ```rust
//! use mew::types::{EntryHeader, EntryKind};
//! use std::path::PathBuf;
//!
//! let header = EntryHeader::file(PathBuf::from("src/main.rs"), 0o644, 12);
//! assert_eq!(header.kind, EntryKind::File);
//! assert!(header.is_file());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Number of hex characters kept from the archive digest
pub const IDENTITY_LEN: usize = 12;

/// One immutable capture record
///
/// Records are appended to the index and removed wholesale; they are never
/// edited in place.
///
/// # Examples
///
/// ```rust
/// # use mew::types::Snapshot;
/// # use chrono::Utc;
/// # use std::path::PathBuf;
/// let snap = Snapshot {
///     id: "abc123def456".to_string(),
///     title: "before refactor".to_string(),
///     timestamp: Utc::now(),
///     archive: PathBuf::from("snaps/20260101T000000000000-abc123def456.tar.lz4"),
///     stats: Default::default(),
///     hostname: None,
///     tool_version: None,
/// };
/// assert!(snap.matches_prefix("abc1"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    /// Truncated hex digest of the archive bytes
    pub id: String,
    /// Caller supplied title, not necessarily unique
    pub title: String,
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Archive location relative to the metadata directory
    pub archive: PathBuf,
    /// Counts gathered while encoding
    #[serde(default)]
    pub stats: SnapshotStats,
    /// Host that produced the capture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// mew version that produced the capture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
}

impl Snapshot {
    /// Whether the identity starts with `prefix`
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.id.starts_with(prefix)
    }
}

/// Statistics about one capture
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotStats {
    /// Regular files stored
    pub files: usize,
    /// Directories stored (including empty ones)
    pub directories: usize,
    /// Symbolic links stored
    pub symlinks: usize,
    /// Sum of regular file sizes
    pub total_size: u64,
    /// Size of the compressed archive on disk
    pub archive_size: u64,
}

impl SnapshotStats {
    /// Total number of entries in the archive
    pub fn entries(&self) -> usize {
        self.files + self.directories + self.symlinks
    }

    /// Record one entry header
    pub fn record(&mut self, header: &EntryHeader) {
        match header.kind {
            EntryKind::File => {
                self.files += 1;
                self.total_size += header.size;
            }
            EntryKind::Directory => self.directories += 1,
            EntryKind::Symlink => self.symlinks += 1,
        }
    }
}

/// Type tag of an archive entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file with a byte payload
    File,
    /// Directory, emitted even when empty
    Directory,
    /// Symbolic link, stored as its target and never followed
    Symlink,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryKind::File => "file",
            EntryKind::Directory => "dir",
            EntryKind::Symlink => "link",
        };
        f.pad(s)
    }
}

/// Header of one archive entry
///
/// `path` is always relative to the snapshot root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryHeader {
    /// Root-relative path
    pub path: PathBuf,
    /// Entry type
    pub kind: EntryKind,
    /// Permission bits
    pub mode: u32,
    /// Payload length, zero for anything but regular files
    pub size: u64,
    /// Symlink target
    pub link_target: Option<PathBuf>,
}

impl EntryHeader {
    /// Header for a regular file
    pub fn file(path: PathBuf, mode: u32, size: u64) -> Self {
        Self {
            path,
            kind: EntryKind::File,
            mode,
            size,
            link_target: None,
        }
    }

    /// Header for a directory
    pub fn directory(path: PathBuf, mode: u32) -> Self {
        Self {
            path,
            kind: EntryKind::Directory,
            mode,
            size: 0,
            link_target: None,
        }
    }

    /// Header for a symbolic link
    pub fn symlink(path: PathBuf, target: PathBuf) -> Self {
        Self {
            path,
            kind: EntryKind::Symlink,
            mode: 0o777,
            size: 0,
            link_target: Some(target),
        }
    }

    /// Whether this entry carries a payload
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Whether this entry is a directory
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Result of a restore operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreResult {
    /// Identity of the snapshot that was restored
    pub snapshot_id: String,
    /// Regular files created or overwritten
    pub files_restored: usize,
    /// Directories that did not exist before
    pub directories_created: usize,
    /// Symbolic links recreated
    pub symlinks_restored: usize,
    /// Payload bytes written
    pub bytes_written: u64,
    /// Entries ignored because they belong to the metadata directory
    pub skipped: Vec<PathBuf>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Outcome of a garbage collection pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcStats {
    /// Archives no record referenced
    pub archives_removed: usize,
    /// Leftover temporary archives from aborted captures
    pub temp_files_removed: usize,
    /// Bytes freed (or that would be freed on a dry run)
    pub bytes_reclaimed: u64,
    /// Paths that were (or would be) removed
    pub removed: Vec<PathBuf>,
    /// Whether anything was actually deleted
    pub dry_run: bool,
}

/// How `resolve` treats keys matching several snapshots
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
    /// First match in stored order wins silently
    #[default]
    FirstMatch,
    /// Several matches in the winning tier is an error
    Strict,
}

/// Configuration threaded into every core operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MewConfig {
    /// Working directory being captured and restored
    pub root_path: PathBuf,
    /// Metadata directory holding the index and archives
    pub metadata_path: PathBuf,
    /// Glob patterns matched against root-relative paths
    pub exclude_patterns: Vec<String>,
    /// Absolute paths never captured
    pub exclude_paths: Vec<PathBuf>,
    /// Skip the binary of the running process if it lives inside the root
    pub exclude_current_exe: bool,
    /// Prefix ambiguity policy
    pub resolve_mode: ResolveMode,
}

impl MewConfig {
    /// Default configuration for a root: metadata in `<root>/.mew`
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        let root_path = root_path.into();
        let metadata_path = root_path.join(crate::METADATA_DIR);
        Self {
            root_path,
            metadata_path,
            exclude_patterns: Vec::new(),
            exclude_paths: Vec::new(),
            exclude_current_exe: true,
            resolve_mode: ResolveMode::FirstMatch,
        }
    }

    /// Path of the index document
    pub fn index_path(&self) -> PathBuf {
        self.metadata_path.join(crate::INDEX_FILE)
    }

    /// Directory holding archive blobs
    pub fn archive_dir(&self) -> PathBuf {
        self.metadata_path.join(crate::ARCHIVE_DIR)
    }

    /// Resolve a record's archive reference to an absolute location
    pub fn archive_location(&self, archive: &Path) -> PathBuf {
        self.metadata_path.join(archive)
    }
}

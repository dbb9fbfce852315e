//! Deterministic directory traversal for capture
//!
//! The walker enumerates a root depth-first, one directory at a time, with
//! children visited in byte-lexicographic order of their file names. The same
//! tree state therefore always yields the same entry sequence, which is what
//! makes the archive digest reproducible.
//!
//! ## Exclusions
//!
//! Three kinds of entries never reach the archive:
//!
//! - any directory named [`crate::METADATA_DIR`], at any depth, and an entry
//!   of that name directly under the root
//! - absolute paths registered on [`ExclusionRules`] (the running binary, a
//!   relocated metadata directory, anything a caller injects)
//! - paths matching caller supplied glob patterns
//!
//! An excluded directory is pruned together with everything beneath it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mew::walker::{ExclusionRules, TreeWalker};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rules = ExclusionRules::new().with_patterns(&["*.log".to_string()])?;
//! let walker = TreeWalker::new(Path::new("./project"), rules)?;
//! for entry in walker.walk() {
//!     let entry = entry?;
//!     println!("{} {}", entry.header.kind, entry.header.path.display());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{MewError, Result};
use crate::types::EntryHeader;
use crate::utils;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::{DirEntry, WalkDir};

/// Predicate deciding which paths are left out of a capture
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    /// Absolute paths skipped wherever they appear
    paths: Vec<PathBuf>,
    /// Source patterns, kept for diagnostics
    patterns: Vec<String>,
    /// Compiled patterns, matched against root-relative paths
    globs: Option<GlobSet>,
}

impl ExclusionRules {
    /// Rules that exclude nothing beyond the metadata directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude one absolute path
    ///
    /// The path is canonicalized when it exists so it compares equal to what
    /// the walker produces under a canonical root.
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        trace!("Excluding path {:?}", resolved);
        self.paths.push(resolved);
        self
    }

    /// Exclude the executable of the running process
    pub fn with_current_exe(self) -> Self {
        match std::env::current_exe() {
            Ok(exe) => self.with_path(exe),
            Err(e) => {
                warn!("Cannot determine running executable: {}", e);
                self
            }
        }
    }

    /// Exclude paths matching glob patterns
    ///
    /// A pattern without `/` matches an entry name at any depth (`*.log`,
    /// `target`). A pattern containing `/` is anchored at the root
    /// (`build/out`, `/docs/*.pdf`). A trailing `/` is accepted and ignored.
    pub fn with_patterns(mut self, patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(self);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in self.patterns.iter().chain(patterns) {
            let trimmed = pattern.trim_end_matches('/');
            let anchored = if trimmed.contains('/') {
                trimmed.trim_start_matches('/').to_string()
            } else {
                format!("**/{}", trimmed)
            };
            let glob = GlobBuilder::new(&anchored)
                .literal_separator(true)
                .build()
                .map_err(|e| MewError::InvalidPattern(format!("'{}': {}", pattern, e)))?;
            builder.add(glob);
        }

        self.globs = Some(
            builder
                .build()
                .map_err(|e| MewError::InvalidPattern(e.to_string()))?,
        );
        self.patterns.extend(patterns.iter().cloned());
        Ok(self)
    }

    /// Patterns registered so far
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Check an entry given its absolute and root-relative paths
    pub fn is_excluded(&self, absolute: &Path, relative: &Path) -> bool {
        if self.paths.iter().any(|p| p == absolute) {
            return true;
        }
        self.globs
            .as_ref()
            .is_some_and(|globs| globs.is_match(relative))
    }
}

/// One entry produced by the walker
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Archive header for this entry
    pub header: EntryHeader,
    /// Absolute location on disk
    pub source: PathBuf,
}

/// Lazy, ordered enumerator of a directory tree
#[derive(Debug)]
pub struct TreeWalker {
    /// Canonical root directory
    root: PathBuf,
    /// Exclusion predicate
    rules: ExclusionRules,
}

impl TreeWalker {
    /// Create a walker for `root`
    ///
    /// # Errors
    ///
    /// - [`MewError::Traversal`] if the root cannot be resolved
    pub fn new(root: &Path, rules: ExclusionRules) -> Result<Self> {
        let root = fs::canonicalize(root).map_err(|e| MewError::traversal(root, e))?;
        debug!("Walking {:?}", root);
        Ok(Self { root, rules })
    }

    /// Canonical root this walker enumerates
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Iterate entries depth-first in lexicographic order
    ///
    /// The iterator is lazy; the first error it yields should abort the
    /// caller's capture.
    pub fn walk(&self) -> impl Iterator<Item = Result<WalkEntry>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_pruned(entry))
            .filter_map(move |res| match res {
                Ok(entry) => self.to_walk_entry(&entry).transpose(),
                Err(e) => Some(Err(MewError::from(e))),
            })
    }

    fn is_pruned(&self, entry: &DirEntry) -> bool {
        if entry.file_name() == crate::METADATA_DIR && (entry.file_type().is_dir() || entry.depth() == 1) {
            trace!("Skipping metadata directory {:?}", entry.path());
            return true;
        }
        let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
        if self.rules.is_excluded(entry.path(), relative) {
            trace!("Excluded {:?}", relative);
            return true;
        }
        false
    }

    fn to_walk_entry(&self, entry: &DirEntry) -> Result<Option<WalkEntry>> {
        let source = entry.path().to_path_buf();
        let relative = utils::make_relative(&source, &self.root)?;
        let metadata = entry.metadata()?;
        let file_type = metadata.file_type();
        let mode = utils::get_permissions(&metadata);

        let header = if file_type.is_dir() {
            EntryHeader::directory(relative, mode)
        } else if file_type.is_file() {
            EntryHeader::file(relative, mode, metadata.len())
        } else if file_type.is_symlink() {
            let target = utils::read_symlink(&source).map_err(|e| MewError::traversal(&source, e))?;
            EntryHeader::symlink(relative, target)
        } else {
            warn!("Skipping unsupported file type at {:?}", source);
            return Ok(None);
        };

        Ok(Some(WalkEntry { header, source }))
    }
}

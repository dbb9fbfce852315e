//! Snapshot index: the ordered list of capture records
//!
//! The index is a single JSON document holding every [`Snapshot`] newest
//! first. It is read in full and rewritten in full; every rewrite goes
//! through [`utils::atomic_write`] so a crash leaves either the old or the
//! new document, never a torn one.
//!
//! ## Resolution
//!
//! A record matches a key when its identity equals the key, its title equals
//! the key, or its identity starts with the key.
//!
//! Under [`ResolveMode::FirstMatch`] the records are scanned once in stored
//! order (newest first) and the first matching record wins, whichever way it
//! matched. An empty key is a prefix of every identity and so resolves to the
//! newest record.
//!
//! [`ResolveMode::Strict`] ranks matches in three tiers (exact identity, exact
//! title, identity prefix). The first non-empty tier must hold exactly one
//! record, otherwise the lookup fails with [`MewError::AmbiguousKey`].

use crate::error::{MewError, Result};
use crate::types::{ResolveMode, Snapshot};
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// Version written into new index documents
pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
struct IndexDocument {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    snapshots: Vec<Snapshot>,
}

fn default_version() -> u32 {
    INDEX_VERSION
}

/// Handle on the index document of one metadata directory
#[derive(Debug, Clone)]
pub struct SnapshotIndex {
    path: PathBuf,
}

impl SnapshotIndex {
    /// Index stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the index document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the document exists on disk
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write an empty index
    ///
    /// # Errors
    ///
    /// - [`MewError::AlreadyExists`] if a document exists and `force` is false
    pub fn initialize(&self, force: bool) -> Result<()> {
        if self.exists() && !force {
            return Err(MewError::AlreadyExists(self.path.clone()));
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.save(&[])?;
        info!("Initialized empty index at {:?}", self.path);
        Ok(())
    }

    /// Every record, newest first
    ///
    /// A missing document is an empty index.
    pub fn load_all(&self) -> Result<Vec<Snapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!("No index at {:?}, treating as empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let document: IndexDocument =
            serde_json::from_slice(&bytes).map_err(|source| MewError::CorruptIndex {
                path: self.path.clone(),
                source,
            })?;
        debug!(
            "Loaded {} snapshot records (index version {})",
            document.snapshots.len(),
            document.version
        );
        Ok(document.snapshots)
    }

    /// Prepend a record
    ///
    /// The document is created if it does not exist yet.
    pub fn append(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.load_all()?;
        debug!("Appending record {} ({})", snapshot.id, snapshot.title);
        snapshots.insert(0, snapshot);
        self.save(&snapshots)
    }

    /// Resolve a key to one record
    pub fn resolve(&self, key: &str, mode: ResolveMode) -> Result<Snapshot> {
        let snapshots = self.load_all()?;
        resolve_in(&snapshots, key, mode).cloned()
    }

    /// Remove a record, matched on identity and archive location
    ///
    /// Returns `false` if no such record was present.
    pub fn remove(&self, snapshot: &Snapshot) -> Result<bool> {
        let mut snapshots = self.load_all()?;
        let before = snapshots.len();
        snapshots.retain(|s| !(s.id == snapshot.id && s.archive == snapshot.archive));
        if snapshots.len() == before {
            return Ok(false);
        }
        self.save(&snapshots)?;
        info!("Removed record {} from index", snapshot.id);
        Ok(true)
    }

    fn save(&self, snapshots: &[Snapshot]) -> Result<()> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            version: u32,
            snapshots: &'a [Snapshot],
        }

        let json = serde_json::to_vec_pretty(&Borrowed {
            version: INDEX_VERSION,
            snapshots,
        })?;
        utils::atomic_write(&self.path, &json)
    }
}

/// Why a record matched a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchReason {
    Identity,
    Title,
    Prefix,
}

fn match_reason(snapshot: &Snapshot, key: &str) -> Option<MatchReason> {
    if snapshot.id == key {
        Some(MatchReason::Identity)
    } else if snapshot.title == key {
        Some(MatchReason::Title)
    } else if snapshot.matches_prefix(key) {
        Some(MatchReason::Prefix)
    } else {
        None
    }
}

/// Resolve `key` against an in-memory record list
pub fn resolve_in<'a>(snapshots: &'a [Snapshot], key: &str, mode: ResolveMode) -> Result<&'a Snapshot> {
    match mode {
        ResolveMode::FirstMatch => snapshots
            .iter()
            .find_map(|s| match_reason(s, key).map(|reason| (s, reason)))
            .map(|(snapshot, reason)| {
                debug!("Key '{}' matched {} by {:?}", key, snapshot.id, reason);
                snapshot
            })
            .ok_or_else(|| MewError::NotFound(key.to_string())),
        ResolveMode::Strict => resolve_strict(snapshots, key),
    }
}

fn resolve_strict<'a>(snapshots: &'a [Snapshot], key: &str) -> Result<&'a Snapshot> {
    for tier in [MatchReason::Identity, MatchReason::Title, MatchReason::Prefix] {
        let candidates: Vec<&Snapshot> = snapshots
            .iter()
            .filter(|s| match_reason(s, key) == Some(tier))
            .collect();
        match candidates.as_slice() {
            [] => continue,
            [only] => return Ok(*only),
            _ => {
                return Err(MewError::AmbiguousKey {
                    key: key.to_string(),
                    candidates: candidates.iter().map(|s| s.id.clone()).collect(),
                });
            }
        }
    }

    Err(MewError::NotFound(key.to_string()))
}

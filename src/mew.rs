//! Main mew implementation
//!
//! The [`Mew`] struct is the entry point for every operation. It owns a
//! [`MewConfig`] and wires the subsystems together:
//!
//! - **Tree Walker**: enumerates the root in a fixed order
//! - **Archive Codec**: turns the entry stream into one compressed archive
//! - **Content Hasher**: digests the archive bytes as they are written
//! - **Snapshot Index**: records and resolves snapshots
//! - **Restore Engine**: writes an archive back over the root
//!
//! Nothing here reads the process working directory or any other global
//! state; two `Mew` values over different roots are fully independent.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use mew::Mew;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mew = Mew::open("./my_project")?;
//! mew.init(false)?;
//!
//! let snap = mew.capture("before refactor")?;
//! // ... edit files ...
//! mew.restore(&snap.id[..4])?;
//! # Ok(())
//! # }
//! ```

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::{MewError, Result};
use crate::index::SnapshotIndex;
use crate::restore::RestoreEngine;
use crate::storage::ArchiveStore;
use crate::types::*;
use crate::verification::{SnapshotVerifier, VerificationReport};
use crate::walker::{ExclusionRules, TreeWalker};
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Snapshot operations over one root directory
///
/// # Examples
///
/// ```rust,no_run
/// use mew::{Mew, MewBuilder};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Defaults: metadata in <root>/.mew
/// let mew = Mew::open("./project")?;
///
/// // Custom configuration
/// let mew = MewBuilder::new()
///     .exclude_patterns(vec!["target".to_string(), "*.log".to_string()])
///     .build("./project")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Mew {
    config: MewConfig,
    index: SnapshotIndex,
    store: ArchiveStore,
}

impl Mew {
    /// Open `root_path` with the default configuration
    pub fn open(root_path: impl Into<PathBuf>) -> Result<Self> {
        MewBuilder::new().build(root_path)
    }

    /// Open with an explicit configuration
    ///
    /// # Errors
    ///
    /// - [`MewError::Traversal`] if the root is not a directory
    /// - [`MewError::InvalidPattern`] if an exclude pattern does not compile
    pub fn with_config(config: MewConfig) -> Result<Self> {
        if !config.root_path.is_dir() {
            return Err(MewError::traversal(
                &config.root_path,
                io::Error::new(io::ErrorKind::NotFound, "root is not a directory"),
            ));
        }
        ExclusionRules::new().with_patterns(&config.exclude_patterns)?;

        debug!("Opening mew for {:?} (metadata {:?})", config.root_path, config.metadata_path);
        Ok(Self {
            index: SnapshotIndex::new(config.index_path()),
            store: ArchiveStore::new(&config.metadata_path),
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &MewConfig {
        &self.config
    }

    /// Root directory being captured and restored
    pub fn root(&self) -> &Path {
        &self.config.root_path
    }

    /// Whether an index document exists
    pub fn is_initialized(&self) -> bool {
        self.index.exists()
    }

    /// Create the metadata layout and an empty index
    ///
    /// Existing archives are left alone on a forced reinitialization; `gc`
    /// removes them once nothing references them.
    ///
    /// # Errors
    ///
    /// - [`MewError::AlreadyExists`] if an index exists and `force` is false
    #[instrument(skip(self), fields(root = ?self.config.root_path))]
    pub fn init(&self, force: bool) -> Result<()> {
        self.store.ensure_layout()?;
        self.index.initialize(force)?;
        info!("Initialized metadata at {:?}", self.config.metadata_path);
        Ok(())
    }

    /// Capture the current tree under `title`
    ///
    /// The metadata directory is created on demand, so capturing without a
    /// prior [`Mew::init`] works.
    pub fn capture(&self, title: &str) -> Result<Snapshot> {
        self.capture_with_progress(title, |_| {})
    }

    /// Capture, calling `on_entry` for every entry as it is encoded
    ///
    /// Any failure discards the partial archive and leaves the index unchanged.
    #[instrument(skip(self, on_entry))]
    pub fn capture_with_progress<F>(&self, title: &str, mut on_entry: F) -> Result<Snapshot>
    where
        F: FnMut(&EntryHeader),
    {
        let start = Instant::now();
        let timestamp = Utc::now();
        self.store.ensure_layout()?;

        let walker = TreeWalker::new(&self.config.root_path, self.exclusion_rules()?)?;
        let temp = self.store.create_temp()?;

        let mut writer = ArchiveWriter::new(temp);
        for entry in walker.walk() {
            let entry = entry?;
            on_entry(&entry.header);
            writer.append_walk_entry(&entry)?;
        }
        let (temp, digest, stats) = writer.finish()?;

        let id = digest.identity();
        let archive = self.store.persist(temp, &timestamp, &id)?;

        let snapshot = Snapshot {
            id,
            title: title.to_string(),
            timestamp,
            archive,
            stats,
            hostname: hostname::get().ok().map(|h| h.to_string_lossy().into_owned()),
            tool_version: Some(crate::VERSION.to_string()),
        };

        if let Err(e) = self.index.append(snapshot.clone()) {
            if let Err(cleanup) = self.store.delete(&snapshot.archive) {
                warn!("Could not remove unreferenced archive {:?}: {}", snapshot.archive, cleanup);
            }
            return Err(e);
        }

        info!(
            "Captured {} '{}' ({} entries, {} -> {} bytes) in {:?}",
            snapshot.id,
            snapshot.title,
            stats.entries(),
            stats.total_size,
            stats.archive_size,
            start.elapsed()
        );
        Ok(snapshot)
    }

    /// Restore the snapshot `key` resolves to
    pub fn restore(&self, key: &str) -> Result<RestoreResult> {
        self.restore_with_progress(key, |_| {})
    }

    /// Restore, calling `on_entry` for every entry before it is written
    #[instrument(skip(self, on_entry))]
    pub fn restore_with_progress<F>(&self, key: &str, on_entry: F) -> Result<RestoreResult>
    where
        F: FnMut(&EntryHeader),
    {
        let snapshot = self.resolve(key)?;
        self.restore_snapshot(&snapshot, on_entry)
    }

    /// Restore a specific record
    pub fn restore_snapshot<F>(&self, snapshot: &Snapshot, on_entry: F) -> Result<RestoreResult>
    where
        F: FnMut(&EntryHeader),
    {
        info!("Restoring {} '{}'", snapshot.id, snapshot.title);
        let mut reader = ArchiveReader::open(&self.store.locate(&snapshot.archive))?;
        let mut result = RestoreEngine::new(&self.config.root_path).restore(&mut reader, on_entry)?;
        result.snapshot_id = snapshot.id.clone();
        Ok(result)
    }

    /// Every record, newest first
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        self.index.load_all()
    }

    /// Resolve a key using the configured [`ResolveMode`]
    pub fn resolve(&self, key: &str) -> Result<Snapshot> {
        self.resolve_with(key, self.config.resolve_mode)
    }

    /// Resolve a key with an explicit mode
    pub fn resolve_with(&self, key: &str, mode: ResolveMode) -> Result<Snapshot> {
        let snapshot = self.index.resolve(key, mode)?;
        debug!("Resolved '{}' to {}", key, snapshot.id);
        Ok(snapshot)
    }

    /// Entry headers of a snapshot, in archive order
    pub fn entries(&self, key: &str) -> Result<Vec<EntryHeader>> {
        let snapshot = self.resolve(key)?;
        ArchiveReader::open(&self.store.locate(&snapshot.archive))?.headers()
    }

    /// Verify one snapshot
    #[instrument(skip(self))]
    pub fn verify(&self, key: &str) -> Result<VerificationReport> {
        let snapshot = self.resolve(key)?;
        SnapshotVerifier::new(&self.store).verify(&snapshot)
    }

    /// Verify every snapshot, newest first
    #[instrument(skip(self))]
    pub fn verify_all(&self) -> Result<Vec<VerificationReport>> {
        let verifier = SnapshotVerifier::new(&self.store);
        self.index
            .load_all()?
            .iter()
            .map(|snapshot| verifier.verify(snapshot))
            .collect()
    }

    /// Remove a record and its archive
    ///
    /// The record goes first, so a failure deleting the archive leaves an
    /// orphan for `gc` rather than a dangling record.
    #[instrument(skip(self))]
    pub fn remove(&self, key: &str) -> Result<Snapshot> {
        let snapshot = self.resolve(key)?;
        self.index.remove(&snapshot)?;

        let shared = self
            .index
            .load_all()?
            .iter()
            .any(|s| s.archive == snapshot.archive);
        if !shared && !self.store.delete(&snapshot.archive)? {
            warn!("Archive {:?} was already gone", snapshot.archive);
        }
        info!("Removed snapshot {} '{}'", snapshot.id, snapshot.title);
        Ok(snapshot)
    }

    /// Delete archives no record references and stale temporary archives
    #[instrument(skip(self))]
    pub fn gc(&self, dry_run: bool) -> Result<GcStats> {
        let referenced: Vec<PathBuf> = self
            .index
            .load_all()?
            .into_iter()
            .map(|s| s.archive)
            .collect();
        self.store.gc(&referenced, dry_run)
    }

    fn exclusion_rules(&self) -> Result<ExclusionRules> {
        let mut rules = ExclusionRules::new()
            .with_patterns(&self.config.exclude_patterns)?
            .with_path(&self.config.metadata_path);
        for path in &self.config.exclude_paths {
            rules = rules.with_path(path);
        }
        if self.config.exclude_current_exe {
            rules = rules.with_current_exe();
        }
        Ok(rules)
    }
}

/// Builder for [`Mew`] with custom configuration
///
/// # Default Values
///
/// - `metadata_path`: `<root>/.mew`
/// - `exclude_patterns`: empty (the metadata directory is always excluded)
/// - `exclude_current_exe`: true
/// - `resolve_mode`: [`ResolveMode::FirstMatch`]
#[derive(Debug, Default)]
pub struct MewBuilder {
    metadata_path: Option<PathBuf>,
    exclude_patterns: Vec<String>,
    exclude_paths: Vec<PathBuf>,
    exclude_current_exe: Option<bool>,
    resolve_mode: ResolveMode,
}

impl MewBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep metadata somewhere other than `<root>/.mew`
    pub fn metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_path = Some(path.into());
        self
    }

    /// Glob patterns to leave out of captures
    ///
    /// ```rust
    /// use mew::MewBuilder;
    ///
    /// let builder = MewBuilder::new()
    ///     .exclude_patterns(vec!["target".to_string(), "*.tmp".to_string()]);
    /// ```
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Absolute path to leave out of captures
    pub fn exclude_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude_paths.push(path.into());
        self
    }

    /// Whether the running executable is skipped when it lives in the root
    pub fn exclude_current_exe(mut self, exclude: bool) -> Self {
        self.exclude_current_exe = Some(exclude);
        self
    }

    /// How ambiguous keys are handled
    pub fn resolve_mode(mut self, mode: ResolveMode) -> Self {
        self.resolve_mode = mode;
        self
    }

    /// Finish into a configuration without touching the filesystem
    pub fn into_config(self, root_path: impl Into<PathBuf>) -> MewConfig {
        let mut config = MewConfig::new(root_path);
        if let Some(metadata_path) = self.metadata_path {
            config.metadata_path = metadata_path;
        }
        config.exclude_patterns = self.exclude_patterns;
        config.exclude_paths = self.exclude_paths;
        if let Some(exclude) = self.exclude_current_exe {
            config.exclude_current_exe = exclude;
        }
        config.resolve_mode = self.resolve_mode;
        config
    }

    /// Build a [`Mew`] over `root_path`
    pub fn build(self, root_path: impl Into<PathBuf>) -> Result<Mew> {
        Mew::with_config(self.into_config(root_path))
    }
}

//! Archive storage inside the metadata directory
//!
//! ```text
//! .mew/
//! ├── index.json                                   # snapshot records
//! └── snaps/
//!     ├── 20261016T120301123456-abc123def456.tar.lz4
//!     └── .tmp-XXXXXX.tar.lz4                      # capture in progress
//! ```
//!
//! Archives are written to a temporary file in `snaps/` and renamed into
//! place only once the stream is complete, so a finished archive name never
//! refers to a partial file. Renames never overwrite: a name collision picks
//! the next numeric suffix instead.

use crate::error::{MewError, Result};
use crate::types::GcStats;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

/// File name prefix of in-progress archives
pub const TEMP_PREFIX: &str = ".tmp-";
/// File name suffix of every archive
pub const ARCHIVE_SUFFIX: &str = ".tar.lz4";

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Archive blobs of one metadata directory
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    /// Store rooted at a metadata directory
    pub fn new(metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            root: metadata_path.into(),
        }
    }

    /// Metadata directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the archive files
    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(crate::ARCHIVE_DIR)
    }

    /// Create the metadata and archive directories if absent
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.archive_dir())?;
        trace!("Ensured storage layout under {:?}", self.root);
        Ok(())
    }

    /// Absolute location of an archive referenced by a record
    pub fn locate(&self, archive: &Path) -> PathBuf {
        self.root.join(archive)
    }

    /// Open a temporary archive file, removed automatically if dropped
    pub fn create_temp(&self) -> Result<NamedTempFile> {
        self.ensure_layout()?;
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(ARCHIVE_SUFFIX)
            .tempfile_in(self.archive_dir())?;
        trace!("Created temporary archive {:?}", temp.path());
        Ok(temp)
    }

    /// Move a finished temporary archive to its final name
    ///
    /// Returns the archive location relative to the metadata directory.
    pub fn persist(&self, temp: NamedTempFile, timestamp: &DateTime<Utc>, id: &str) -> Result<PathBuf> {
        temp.as_file().sync_all()?;

        let mut temp = temp;
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let relative = Path::new(crate::ARCHIVE_DIR).join(archive_file_name(timestamp, id, attempt));
            match temp.persist_noclobber(self.locate(&relative)) {
                Ok(_) => {
                    debug!("Stored archive {:?}", relative);
                    return Ok(relative);
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    trace!("Archive name {:?} taken", relative);
                    temp = e.file;
                }
                Err(e) => return Err(e.error.into()),
            }
        }

        Err(MewError::AlreadyExists(
            self.archive_dir().join(archive_file_name(timestamp, id, 0)),
        ))
    }

    /// Delete an archive, returning whether it existed
    pub fn delete(&self, archive: &Path) -> Result<bool> {
        match fs::remove_file(self.locate(archive)) {
            Ok(()) => {
                debug!("Deleted archive {:?}", archive);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove archives no record references, plus stale temporary archives
    ///
    /// `referenced` holds the archive paths of every live record, relative to
    /// the metadata directory. Only files ending in [`ARCHIVE_SUFFIX`] are
    /// considered. Must not run while a capture is in progress.
    pub fn gc(&self, referenced: &[PathBuf], dry_run: bool) -> Result<GcStats> {
        let keep: HashSet<PathBuf> = referenced.iter().map(|a| self.locate(a)).collect();
        let mut stats = GcStats {
            dry_run,
            ..Default::default()
        };

        let entries = match fs::read_dir(self.archive_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type()?.is_file() || !name.ends_with(ARCHIVE_SUFFIX) {
                continue;
            }
            let path = entry.path();
            if name.starts_with(TEMP_PREFIX) {
                candidates.push((path, true));
            } else if !keep.contains(&path) {
                candidates.push((path, false));
            }
        }
        candidates.sort();

        for (path, is_temp) in candidates {
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if !dry_run {
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Failed to remove {:?}: {}", path, e);
                    continue;
                }
            }
            if is_temp {
                stats.temp_files_removed += 1;
            } else {
                stats.archives_removed += 1;
            }
            stats.bytes_reclaimed += size;
            stats.removed.push(path);
        }

        info!(
            "Garbage collection{}: {} archives, {} temporary files, {} bytes",
            if dry_run { " (dry run)" } else { "" },
            stats.archives_removed,
            stats.temp_files_removed,
            stats.bytes_reclaimed
        );
        Ok(stats)
    }
}

/// `<timestamp>-<id>[-<n>].tar.lz4`
fn archive_file_name(timestamp: &DateTime<Utc>, id: &str, attempt: u32) -> String {
    let stamp = timestamp.format("%Y%m%dT%H%M%S%6f");
    if attempt == 0 {
        format!("{}-{}{}", stamp, id, ARCHIVE_SUFFIX)
    } else {
        format!("{}-{}-{}{}", stamp, id, attempt, ARCHIVE_SUFFIX)
    }
}

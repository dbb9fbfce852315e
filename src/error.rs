//! Error types for the mew library
//!
//! Every fallible operation returns [`Result<T>`], an alias over [`MewError`].
//! Errors surface synchronously to the caller; nothing is retried.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the mew library
pub type Result<T> = std::result::Result<T, MewError>;

/// Main error type for all mew operations
#[derive(Debug, Error)]
pub enum MewError {
    /// Metadata already initialized and overwrite was not requested
    #[error("Already exists: {0:?} (use --force to reinitialize)")]
    AlreadyExists(PathBuf),

    /// No snapshot matches the given key
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// Strict resolution found more than one snapshot for a key
    #[error("Ambiguous key '{key}' matches {} snapshots: {}", candidates.len(), candidates.join(", "))]
    AmbiguousKey {
        /// Key that was looked up
        key: String,
        /// Identities of every matching snapshot, in index order
        candidates: Vec<String>,
    },

    /// The index document exists but is not valid JSON of the expected shape
    #[error("Corrupt index at {path:?}: {source}")]
    CorruptIndex {
        /// Path to the index document
        path: PathBuf,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// I/O errors during storage operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tree walker could not stat or open an entry
    #[error("Traversal error at {path:?}: {source}")]
    Traversal {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An archive entry path is absolute or contains `..`
    #[error("Unsafe entry path in archive: {0:?}")]
    UnsafePath(PathBuf),

    /// An exclude pattern could not be compiled
    #[error("Invalid exclude pattern: {0}")]
    InvalidPattern(String),

    /// Errors during JSON serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<walkdir::Error> for MewError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
        let source = err
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
        MewError::Traversal { path, source }
    }
}

impl MewError {
    /// Create a traversal error for a path
    pub fn traversal(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MewError::Traversal {
            path: path.into(),
            source,
        }
    }

    /// Check if this error means a key did not resolve
    pub fn is_not_found(&self) -> bool {
        matches!(self, MewError::NotFound(_))
    }

    /// Check if this error indicates corruption of persisted state
    pub fn is_corruption(&self) -> bool {
        matches!(self, MewError::CorruptIndex { .. } | MewError::UnsafePath(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            MewError::NotFound(key) => {
                format!("No snapshot matches '{}'. Use 'mew list' to see available snapshots.", key)
            }
            MewError::AmbiguousKey { key, candidates } => {
                format!(
                    "'{}' is ambiguous ({} matches). Use a longer prefix or the full identity.",
                    key,
                    candidates.len()
                )
            }
            MewError::CorruptIndex { path, .. } => {
                format!(
                    "Index {:?} is corrupt. Run 'mew init --force' to start over (existing archives are kept).",
                    path
                )
            }
            _ => self.to_string(),
        }
    }
}

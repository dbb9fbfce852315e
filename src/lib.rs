//! # mew - local-first immutable snapshots
//!
//! Capture a directory into a single compressed, content-addressed archive
//! and wind it back later.
//!
//! ## Overview
//!
//! mew keeps a flat, append-only list of snapshots next to the directory it
//! tracks:
//! - `capture` walks the tree, streams it into one archive and names the
//!   snapshot after the archive's SHA-256 digest
//! - `restore` writes an archive back over the tree as an overlay: files are
//!   created or overwritten, nothing is deleted
//! - snapshots are looked up by identity, title or identity prefix
//!
//! There is no history graph, no diffing and no deduplication between
//! snapshots. Every snapshot is a self-contained archive.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mew::Mew;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mew = Mew::open("./my_project")?;
//! mew.init(false)?;
//!
//! let snap = mew.capture("first")?;
//! println!("captured {} ({} files)", snap.id, snap.stats.files);
//!
//! // Make some changes to your files...
//!
//! let result = mew.restore("first")?;
//! println!("restored {} files", result.files_restored);
//! # Ok(())
//! # }
//! ```
//!
//! ## On-disk Layout
//!
//! ```text
//! <root>/.mew/
//! ├── index.json        # { "version": 1, "snapshots": [...] }, newest first
//! └── snaps/
//!     └── <timestamp>-<identity>.tar.lz4
//! ```
//!
//! The identity is the first 12 hex characters of the SHA-256 digest of the
//! archive file. Archive headers carry no timestamps or ownership, so an
//! unchanged tree captured twice gets the same identity.
//!
//! ## Guarantees
//!
//! - The index is replaced atomically; readers never see a torn document.
//! - An archive is renamed to its final name only after it is complete, and
//!   the index only ever references complete archives.
//! - Archive paths are root-relative; `..` and absolute paths are rejected
//!   on decode, and restore never writes through a symbolic link.
//! - The metadata directory is never captured and never restored.
//!
//! ## Concurrency
//!
//! One operation at a time per metadata directory. There is no locking.
//!
//! ## Module Organization
//!
//! - [`mew`]: the [`Mew`] facade and [`MewBuilder`]
//! - [`walker`]: ordered traversal and exclusion rules
//! - [`archive`]: the tar + LZ4 codec
//! - [`hasher`]: streaming SHA-256
//! - [`index`]: the snapshot index and key resolution
//! - [`restore`]: the overlay restore engine
//! - [`storage`]: archive files inside the metadata directory
//! - [`verification`]: integrity checks
//! - [`types`]: records, headers and configuration
//! - [`error`]: error types

pub mod archive;
pub mod error;
pub mod hasher;
pub mod index;
pub mod mew;
pub mod restore;
pub mod storage;
pub mod types;
pub mod utils;
pub mod verification;
pub mod walker;

pub use error::{MewError, Result};
pub use mew::{Mew, MewBuilder};
pub use types::*;
pub use verification::VerificationReport;

/// Reserved metadata directory name under the root
pub const METADATA_DIR: &str = ".mew";
/// Index document name inside the metadata directory
pub const INDEX_FILE: &str = "index.json";
/// Archive directory name inside the metadata directory
pub const ARCHIVE_DIR: &str = "snaps";
/// Crate version recorded in every snapshot
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

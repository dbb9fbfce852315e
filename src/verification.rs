//! Snapshot verification and integrity checking
//!
//! Verifying a snapshot re-reads its archive twice:
//!
//! 1. **Identity**: the archive bytes are hashed again and the truncated
//!    digest compared with the record's identity.
//! 2. **Stream**: every entry is decoded and every payload read to the end,
//!    so truncation or corruption anywhere in the stream is detected.
//!
//! Problems are collected into a [`VerificationReport`] rather than raised;
//! only failures to read the index itself surface as errors.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mew::Mew;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mew = Mew::open(".")?;
//! let report = mew.verify("abc1")?;
//! if report.is_valid() {
//!     println!("{}", report.summary());
//! } else {
//!     for error in &report.errors {
//!         eprintln!("{}", error);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::archive::ArchiveReader;
use crate::error::Result;
use crate::hasher;
use crate::storage::ArchiveStore;
use crate::types::{EntryKind, Snapshot};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader};
use std::time::Instant;
use tracing::{debug, warn};

/// Verifies snapshots against the archives in one store
pub struct SnapshotVerifier<'a> {
    store: &'a ArchiveStore,
}

impl<'a> SnapshotVerifier<'a> {
    /// Create a verifier over `store`
    pub fn new(store: &'a ArchiveStore) -> Self {
        Self { store }
    }

    /// Check one snapshot's archive
    pub fn verify(&self, snapshot: &Snapshot) -> Result<VerificationReport> {
        let start = Instant::now();
        let mut report = VerificationReport::new(snapshot);
        let path = self.store.locate(&snapshot.archive);

        if !path.is_file() {
            warn!("Archive for {} missing at {:?}", snapshot.id, path);
            report.errors.push(format!("archive missing: {}", path.display()));
            report.verification_time_ms = start.elapsed().as_millis() as u64;
            return Ok(report);
        }
        report.archive_exists = true;

        match File::open(&path).and_then(|f| hasher::digest_reader(BufReader::new(f))) {
            Ok(digest) => {
                let actual = digest.identity();
                report.identity_valid = actual == snapshot.id;
                if !report.identity_valid {
                    report
                        .errors
                        .push(format!("identity mismatch: archive hashes to {}", actual));
                }
                report.actual_id = Some(actual);
            }
            Err(e) => report.errors.push(format!("cannot hash archive: {}", e)),
        }

        match decode_all(&path, &mut report) {
            Ok(()) => report.stream_valid = true,
            Err(e) => report.errors.push(format!("archive stream invalid: {}", e)),
        }

        let recorded = snapshot.stats.entries();
        if report.stream_valid && recorded != 0 && recorded != report.entries_checked {
            report.errors.push(format!(
                "entry count mismatch: record says {}, archive holds {}",
                recorded, report.entries_checked
            ));
        }

        report.verification_time_ms = start.elapsed().as_millis() as u64;
        debug!("{}", report.summary());
        Ok(report)
    }
}

fn decode_all(path: &std::path::Path, report: &mut VerificationReport) -> Result<()> {
    let mut reader = ArchiveReader::open(path)?;
    let mut entries = reader.entries()?;
    for entry in entries.by_ref() {
        let mut entry = entry?;
        if entry.header.kind == EntryKind::File {
            let read = io::copy(&mut entry, &mut io::sink())?;
            if read != entry.header.size {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{:?}: expected {} bytes, read {}", entry.header.path, entry.header.size, read),
                )
                .into());
            }
            report.bytes_checked += read;
        }
        report.entries_checked += 1;
    }
    report.reserved_entries = entries.skipped().len();
    Ok(())
}

/// Outcome of verifying one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Identity recorded in the index
    pub snapshot_id: String,
    /// Title recorded in the index
    pub title: String,
    /// The referenced archive file exists
    pub archive_exists: bool,
    /// Re-hashing the archive reproduced the identity
    pub identity_valid: bool,
    /// Identity computed from the archive bytes
    pub actual_id: Option<String>,
    /// Every entry decoded and every payload was complete
    pub stream_valid: bool,
    /// Entries decoded
    pub entries_checked: usize,
    /// Payload bytes read
    pub bytes_checked: u64,
    /// Entries inside the metadata directory that decoding dropped
    pub reserved_entries: usize,
    /// Time spent verifying
    pub verification_time_ms: u64,
    /// Problems found
    pub errors: Vec<String>,
}

impl VerificationReport {
    fn new(snapshot: &Snapshot) -> Self {
        Self {
            snapshot_id: snapshot.id.clone(),
            title: snapshot.title.clone(),
            archive_exists: false,
            identity_valid: false,
            actual_id: None,
            stream_valid: false,
            entries_checked: 0,
            bytes_checked: 0,
            reserved_entries: 0,
            verification_time_ms: 0,
            errors: Vec::new(),
        }
    }

    /// Check if the snapshot is fully valid
    pub fn is_valid(&self) -> bool {
        self.archive_exists && self.identity_valid && self.stream_valid && self.errors.is_empty()
    }

    /// Get a summary of the verification
    pub fn summary(&self) -> String {
        if self.is_valid() {
            format!(
                "Snapshot {} is valid ({} entries verified in {}ms)",
                self.snapshot_id, self.entries_checked, self.verification_time_ms
            )
        } else {
            let issues = [
                (!self.archive_exists).then_some("archive missing"),
                (self.archive_exists && !self.identity_valid).then_some("identity mismatch"),
                (self.archive_exists && !self.stream_valid).then_some("corrupt stream"),
            ]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

            let issues = if issues.is_empty() {
                "inconsistent record".to_string()
            } else {
                issues.join(", ")
            };
            format!("Snapshot {} is invalid: {}", self.snapshot_id, issues)
        }
    }
}

//! Archive codec: a directory tree as one compressed, ordered byte stream
//!
//! ## Format
//!
//! An archive is a GNU `tar` stream wrapped in a single LZ4 frame. Each tree
//! entry becomes one tar member, in the order the walker produced it:
//!
//! - regular files carry their mode, size and payload
//! - directories are emitted even when empty
//! - symbolic links store their target and are never followed
//!
//! Header fields that vary between otherwise identical trees (mtime, uid, gid,
//! owner names) are zeroed, so the same tree state always encodes to the same
//! bytes and therefore the same identity.
//!
//! ## Hashing
//!
//! The writer pipeline is `tar -> LZ4 -> SHA-256 -> sink`. The digest of the
//! compressed bytes is available as soon as [`ArchiveWriter::finish`] returns.
//!
//! ## Example
//!
//! ```rust
//! use mew::archive::{ArchiveReader, ArchiveWriter};
//! use mew::types::EntryHeader;
//! use std::io::Cursor;
//! use std::path::PathBuf;
//!
//! # fn main() -> mew::Result<()> {
//! let mut writer = ArchiveWriter::new(Vec::new());
//! writer.append_dir(&EntryHeader::directory(PathBuf::from("src"), 0o755))?;
//! writer.append_file(&EntryHeader::file(PathBuf::from("src/a.txt"), 0o644, 5), &b"hello"[..])?;
//! let (bytes, digest, stats) = writer.finish()?;
//! assert_eq!(stats.files, 1);
//! assert_eq!(digest.identity().len(), 12);
//!
//! let mut reader = ArchiveReader::new(Cursor::new(bytes));
//! let headers = reader.headers()?;
//! assert_eq!(headers.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::error::{MewError, Result};
use crate::hasher::{ContentDigest, HashingWriter};
use crate::types::{EntryHeader, EntryKind, SnapshotStats};
use crate::utils;
use crate::walker::WalkEntry;
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use tracing::{trace, warn};

/// Reader that yields exactly `expected` bytes or fails
///
/// Guards against a file changing size between stat and read; tar would
/// otherwise emit a member that disagrees with its header. The first
/// failure on the source side is kept in `failure` so callers can tell it
/// apart from errors writing the archive.
struct ExactReader<R> {
    inner: io::Take<R>,
    remaining: u64,
    path: PathBuf,
    failure: Option<io::Error>,
}

impl<R: Read> ExactReader<R> {
    fn new(inner: R, expected: u64, path: &Path) -> Self {
        Self {
            inner: inner.take(expected),
            remaining: expected,
            path: path.to_path_buf(),
            failure: None,
        }
    }

    fn fail(&mut self, error: io::Error) -> io::Error {
        let relayed = io::Error::new(error.kind(), error.to_string());
        self.failure = Some(error);
        relayed
    }

    /// Any byte past the declared size means the source grew
    fn check_trailing(&mut self) -> io::Result<()> {
        let mut extra = [0u8; 1];
        match self.inner.get_mut().read(&mut extra) {
            Ok(0) => Ok(()),
            Ok(_) => Err(self.fail(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{:?} grew during capture", self.path),
            ))),
            Err(e) => Err(self.fail(e)),
        }
    }
}

impl<R: Read> Read for ExactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            self.check_trailing()?;
            return Ok(0);
        }
        let n = match self.inner.read(buf) {
            Ok(n) => n,
            Err(e) => return Err(self.fail(e)),
        };
        if n == 0 {
            let missing = self.remaining;
            return Err(self.fail(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{:?} shrank during capture ({} bytes missing)", self.path, missing),
            )));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Streaming archive encoder
pub struct ArchiveWriter<W: Write> {
    builder: Builder<FrameEncoder<HashingWriter<W>>>,
    stats: SnapshotStats,
}

impl<W: Write> ArchiveWriter<W> {
    /// Start an archive on top of `inner`
    pub fn new(inner: W) -> Self {
        let mut builder = Builder::new(FrameEncoder::new(HashingWriter::new(inner)));
        builder.follow_symlinks(false);
        Self {
            builder,
            stats: SnapshotStats::default(),
        }
    }

    /// Counts recorded so far
    pub fn stats(&self) -> &SnapshotStats {
        &self.stats
    }

    /// Append a regular file whose payload is read from `contents`
    ///
    /// Exactly `header.size` bytes must be available. A shorter or longer
    /// reader, or one that fails, yields [`MewError::Traversal`]; errors
    /// writing the archive stay [`MewError::Io`].
    pub fn append_file<R: Read>(&mut self, header: &EntryHeader, contents: R) -> Result<()> {
        self.append_file_from(header, contents, &header.path)
    }

    fn append_file_from<R: Read>(&mut self, header: &EntryHeader, contents: R, source: &Path) -> Result<()> {
        let mut tar_header = normalized_header(EntryType::Regular, header.mode, header.size);
        let mut reader = ExactReader::new(contents, header.size, &header.path);
        if let Err(e) = self
            .builder
            .append_data(&mut tar_header, &header.path, &mut reader)
        {
            return Err(match reader.failure.take() {
                Some(cause) => MewError::traversal(source, cause),
                None => e.into(),
            });
        }
        self.stats.record(header);
        trace!("Encoded file {:?} ({} bytes)", header.path, header.size);
        Ok(())
    }

    /// Append a directory entry
    pub fn append_dir(&mut self, header: &EntryHeader) -> Result<()> {
        let mut tar_header = normalized_header(EntryType::Directory, header.mode, 0);
        self.builder
            .append_data(&mut tar_header, &header.path, io::empty())?;
        self.stats.record(header);
        Ok(())
    }

    /// Append a symbolic link entry
    pub fn append_symlink(&mut self, header: &EntryHeader) -> Result<()> {
        let target = header
            .link_target
            .as_deref()
            .ok_or_else(|| MewError::UnsafePath(header.path.clone()))?;
        let mut tar_header = normalized_header(EntryType::Symlink, 0o777, 0);
        self.builder
            .append_link(&mut tar_header, &header.path, target)?;
        self.stats.record(header);
        Ok(())
    }

    /// Append an entry produced by the tree walker, reading file content from disk
    pub fn append_walk_entry(&mut self, entry: &WalkEntry) -> Result<()> {
        match entry.header.kind {
            EntryKind::File => {
                let file = File::open(&entry.source)
                    .map_err(|e| MewError::traversal(&entry.source, e))?;
                self.append_file_from(&entry.header, BufReader::new(file), &entry.source)
            }
            EntryKind::Directory => self.append_dir(&entry.header),
            EntryKind::Symlink => self.append_symlink(&entry.header),
        }
    }

    /// Terminate the stream
    ///
    /// Returns the underlying sink, the digest of every byte written to it
    /// and the final statistics including the compressed size.
    pub fn finish(self) -> Result<(W, ContentDigest, SnapshotStats)> {
        let encoder = self.builder.into_inner()?;
        let hashing = encoder.finish().map_err(io::Error::from)?;
        let (inner, digest, bytes) = hashing.finalize()?;

        let mut stats = self.stats;
        stats.archive_size = bytes;
        Ok((inner, digest, stats))
    }
}

fn normalized_header(entry_type: EntryType, mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode & 0o7777);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

/// Streaming archive decoder
pub struct ArchiveReader<R: Read> {
    archive: tar::Archive<FrameDecoder<R>>,
}

impl ArchiveReader<BufReader<File>> {
    /// Open an archive file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> ArchiveReader<R> {
    /// Decode an archive from any reader
    pub fn new(reader: R) -> Self {
        Self {
            archive: tar::Archive::new(FrameDecoder::new(reader)),
        }
    }

    /// Iterate entries in stored order
    ///
    /// Entries are sequential: an entry's payload must be read before the
    /// next one is requested, otherwise it is skipped.
    pub fn entries(&mut self) -> Result<ArchiveEntries<'_, R>> {
        Ok(ArchiveEntries {
            inner: self.archive.entries()?,
            skipped: Vec::new(),
        })
    }

    /// Collect every header, discarding payloads
    pub fn headers(&mut self) -> Result<Vec<EntryHeader>> {
        self.entries()?
            .map(|entry| entry.map(|e| e.header))
            .collect()
    }
}

/// Iterator over decoded entries
///
/// Members inside the reserved metadata directory are dropped and remembered
/// in [`ArchiveEntries::skipped`]; member types the codec never writes
/// (hard links, devices, FIFOs) are dropped with a warning.
pub struct ArchiveEntries<'a, R: Read> {
    inner: tar::Entries<'a, FrameDecoder<R>>,
    skipped: Vec<PathBuf>,
}

impl<R: Read> ArchiveEntries<'_, R> {
    /// Paths dropped because they belong to the metadata directory
    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }

    /// Consume the iterator, returning the skipped paths
    pub fn into_skipped(self) -> Vec<PathBuf> {
        self.skipped
    }
}

impl<'a, R: Read> Iterator for ArchiveEntries<'a, R> {
    type Item = Result<ArchiveEntry<'a, R>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            let raw_path = match entry.path() {
                Ok(p) => p.into_owned(),
                Err(e) => return Some(Err(e.into())),
            };
            let path = match utils::sanitize_entry_path(&raw_path) {
                Ok(Some(path)) => path,
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            };

            if utils::is_metadata_path(&path) {
                warn!("Skipping reserved entry {:?} in archive", path);
                self.skipped.push(path);
                continue;
            }

            match decode_header(&entry, path) {
                Ok(Some(header)) => return Some(Ok(ArchiveEntry { header, inner: entry })),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn decode_header<R: Read>(entry: &tar::Entry<'_, R>, path: PathBuf) -> Result<Option<EntryHeader>> {
    let tar_header = entry.header();
    let mode = tar_header.mode()?;
    let header = match tar_header.entry_type() {
        EntryType::Regular | EntryType::Continuous => EntryHeader::file(path, mode, entry.size()),
        EntryType::Directory => EntryHeader::directory(path, mode),
        EntryType::Symlink => {
            let target = entry
                .link_name()?
                .ok_or_else(|| MewError::UnsafePath(path.clone()))?
                .into_owned();
            EntryHeader::symlink(path, target)
        }
        other => {
            warn!("Skipping unsupported archive member {:?} ({:?})", path, other);
            return Ok(None);
        }
    };
    Ok(Some(header))
}

/// One decoded entry: its header and, for files, a readable payload
pub struct ArchiveEntry<'a, R: Read> {
    /// Decoded header with a sanitized root-relative path
    pub header: EntryHeader,
    inner: tar::Entry<'a, FrameDecoder<R>>,
}

impl<R: Read> Read for ArchiveEntry<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

//! Materializing an archive onto the working tree
//!
//! Restore is an overlay. Every entry of the archive is written under the
//! root: missing directories are created, files are created or truncated and
//! overwritten, symbolic links are recreated. Nothing that exists on disk but
//! not in the archive is touched.
//!
//! Entries are applied in archive order and the first failure aborts the
//! rest; entries already written stay on disk.
//!
//! Writes never pass through a symbolic link: an existing link at a file or
//! link target is replaced, and an entry beneath a symlinked directory is
//! rejected with [`MewError::UnsafePath`].

use crate::archive::{ArchiveEntry, ArchiveReader};
use crate::error::{MewError, Result};
use crate::types::{EntryHeader, EntryKind, RestoreResult};
use crate::utils;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace};

/// Writes decoded entries beneath a root directory
#[derive(Debug, Clone)]
pub struct RestoreEngine {
    root: PathBuf,
}

impl RestoreEngine {
    /// Engine writing beneath `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Restore every entry of `reader`
    ///
    /// `on_entry` is called with each header just before it is written.
    pub fn restore<R, F>(&self, reader: &mut ArchiveReader<R>, mut on_entry: F) -> Result<RestoreResult>
    where
        R: Read,
        F: FnMut(&EntryHeader),
    {
        let start = Instant::now();
        let mut result = RestoreResult::default();

        let mut entries = reader.entries()?;
        for entry in entries.by_ref() {
            let mut entry = entry?;
            on_entry(&entry.header);
            self.apply(&mut entry, &mut result)?;
        }
        result.skipped = entries.into_skipped();
        result.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Restored {} files, {} new directories, {} links ({} bytes) in {}ms",
            result.files_restored,
            result.directories_created,
            result.symlinks_restored,
            result.bytes_written,
            result.duration_ms
        );
        Ok(result)
    }

    fn apply<R: Read>(&self, entry: &mut ArchiveEntry<'_, R>, result: &mut RestoreResult) -> Result<()> {
        let relative = entry.header.path.clone();
        self.check_ancestors(&relative)?;
        let target = self.root.join(&relative);

        let kind = entry.header.kind;
        match kind {
            EntryKind::Directory => {
                match fs::symlink_metadata(&target) {
                    Ok(meta) if meta.is_dir() => return Ok(()),
                    Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(&target)?,
                    _ => {}
                }
                fs::create_dir_all(&target)?;
                result.directories_created += 1;
                trace!("Created directory {:?}", relative);
            }
            EntryKind::File => {
                ensure_parent(&target)?;
                prepare_file_target(&target)?;

                let mut writer = BufWriter::new(File::create(&target)?);
                let written = io::copy(entry, &mut writer)?;
                writer.flush()?;
                drop(writer);
                utils::set_permissions(&target, entry.header.mode)?;

                result.files_restored += 1;
                result.bytes_written += written;
                trace!("Wrote {:?} ({} bytes)", relative, written);
            }
            EntryKind::Symlink => {
                let link_target = entry
                    .header
                    .link_target
                    .clone()
                    .ok_or_else(|| MewError::UnsafePath(relative.clone()))?;
                ensure_parent(&target)?;
                if fs::symlink_metadata(&target).is_ok() {
                    fs::remove_file(&target)?;
                }
                utils::create_symlink(&link_target, &target)?;
                result.symlinks_restored += 1;
                trace!("Linked {:?} -> {:?}", relative, link_target);
            }
        }
        Ok(())
    }

    /// Reject entries whose parent chain under the root contains a symlink
    fn check_ancestors(&self, relative: &Path) -> Result<()> {
        let mut current = self.root.clone();
        let mut components = relative.components().peekable();
        while let Some(component) = components.next() {
            if components.peek().is_none() {
                break;
            }
            current.push(component);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    debug!("Refusing to write {:?} through symlink {:?}", relative, current);
                    return Err(MewError::UnsafePath(relative.to_path_buf()));
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn ensure_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Clear whatever would stop `File::create` from truncating in place
fn prepare_file_target(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(target)?,
        Ok(meta) if meta.is_file() && meta.permissions().readonly() => {
            utils::set_permissions(target, utils::get_permissions(&meta) | 0o200)?;
        }
        _ => {}
    }
    Ok(())
}

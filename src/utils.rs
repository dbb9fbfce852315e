//! Utility functions for mew
//!
//! Small filesystem helpers shared by the walker, the archive codec and the
//! restore engine:
//!
//! - permission bits in and out of [`std::fs::Metadata`] (Unix and Windows)
//! - symbolic link creation and reading
//! - atomic file replacement through a same-directory temporary file
//! - archive path sanitation
//! - human-readable byte counts
//!
//! ## Example
//!
//! ```rust
//! use mew::utils::{format_bytes, sanitize_entry_path};
//! use std::path::{Path, PathBuf};
//!
//! assert_eq!(format_bytes(1536), "1.50 KB");
//! assert_eq!(
//!     sanitize_entry_path(Path::new("./src/main.rs")).unwrap(),
//!     Some(PathBuf::from("src/main.rs"))
//! );
//! assert!(sanitize_entry_path(Path::new("../escape")).is_err());
//! ```

use crate::error::{MewError, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::trace;

/// Get Unix permissions from metadata
#[cfg(unix)]
pub fn get_permissions(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

/// Get permissions from metadata (Windows implementation)
#[cfg(windows)]
pub fn get_permissions(metadata: &fs::Metadata) -> u32 {
    let mut mode = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
    if metadata.is_dir() {
        mode |= 0o111;
    }
    mode
}

/// Set Unix permissions
#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    Ok(())
}

/// Set permissions (Windows implementation)
///
/// Only the owner write bit is meaningful; it maps onto the read-only flag.
#[cfg(windows)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// Create a symbolic link at `link` pointing to `target`
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

/// Create a symbolic link (Windows implementation)
///
/// Relative targets are resolved against the link's parent to pick between a
/// file and a directory link.
#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    let resolved = match link.parent() {
        Some(parent) if target.is_relative() => parent.join(target),
        _ => target.to_path_buf(),
    };
    if resolved.is_dir() {
        symlink_dir(target, link)?;
    } else {
        symlink_file(target, link)?;
    }
    Ok(())
}

/// Read the target of a symbolic link without following it
pub fn read_symlink(path: &Path) -> io::Result<PathBuf> {
    fs::read_link(path)
}

/// Express `path` relative to `base`
///
/// A lexical strip is tried first so symbolic links keep their own path.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize().map_err(|e| MewError::traversal(path, e))?;
    let base_canon = base.canonicalize().map_err(|e| MewError::traversal(base, e))?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            MewError::traversal(
                path,
                io::Error::other(format!("{:?} is not inside {:?}", path_canon, base_canon)),
            )
        })
}

/// Replace `path` with `content` atomically
///
/// The content lands in a temporary file next to `path` which is then renamed
/// over it, so readers only ever observe the old or the new document.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| MewError::Io(e.error))?;

    trace!("Atomically wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

/// Normalise an archive entry path
///
/// `.` components are dropped. Absolute paths and `..` components are
/// rejected with [`MewError::UnsafePath`]. Returns `None` when nothing is
/// left (the entry named the root itself).
pub fn sanitize_entry_path(path: &Path) -> Result<Option<PathBuf>> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(MewError::UnsafePath(path.to_path_buf()));
            }
        }
    }
    Ok(if clean.as_os_str().is_empty() { None } else { Some(clean) })
}

/// Whether a root-relative path lies in the reserved metadata directory
pub fn is_metadata_path(relative: &Path) -> bool {
    relative
        .components()
        .next()
        .is_some_and(|c| c.as_os_str() == crate::METADATA_DIR)
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

//! Local filesystem backend: full-tree copy between two directories.
//!
//! Every invocation copies the entire tree — there is no diffing against the
//! destination. Existing files are overwritten, missing directories created,
//! and file modification times carried over. The first failed entry aborts
//! the operation; entries already copied stay on disk.

use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use walkdir::WalkDir;

use crate::backend::SyncBackend;
use crate::error::{io_err, SyncError};

pub struct LocalBackend;

impl SyncBackend for LocalBackend {
    fn push(&self, source: &Path, dest: &str) -> Result<(), SyncError> {
        copy_tree(source, Path::new(dest))
    }

    fn pull(&self, dest: &str, source: &Path) -> Result<(), SyncError> {
        copy_tree(Path::new(dest), source)
    }
}

// ---------------------------------------------------------------------------
// Tree copy
// ---------------------------------------------------------------------------

/// Recursively copy `from` into `to`, preserving file mtimes.
///
/// Directories are visited before their contents, so parents always exist by
/// the time a child file is copied.
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<(), SyncError> {
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|_| SyncError::OutsideRoot {
                path: entry.path().to_path_buf(),
                root: from.to_path_buf(),
            })?;
        let target = if rel.as_os_str().is_empty() {
            to.to_path_buf()
        } else {
            to.join(rel)
        };

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
        } else {
            tracing::debug!(path = %entry.path().display(), "copy");
            fs::copy(entry.path(), &target).map_err(|e| io_err(&target, e))?;
            let meta = entry.metadata()?;
            let mtime = FileTime::from_last_modification_time(&meta);
            filetime::set_file_mtime(&target, mtime).map_err(|e| io_err(&target, e))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Safety copy
// ---------------------------------------------------------------------------

/// `<source>-backup` — the sibling a pull writes before overwriting `source`.
pub fn safety_copy_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push("-backup");
    PathBuf::from(name)
}

/// Copy the current source tree to its `-backup` sibling so a failed pull
/// can be recovered by hand.
pub fn safety_copy(source: &Path) -> Result<PathBuf, SyncError> {
    let target = safety_copy_path(source);
    copy_tree(source, &target)?;
    Ok(target)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Utility functions for nodepin
//!
//! File helpers shared by the store and the CLI. The central one is
//! [`atomic_write`]: content is staged in a temporary file in the target's
//! directory, synced, and renamed over the target, so readers see either the
//! old file or the new one and never a partially written file.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::trace;

use crate::error::{PinError, Result};

/// Atomic file write (write to temp file then rename)
///
/// # Errors
///
/// - [`PinError::Internal`] if the target has no parent directory
/// - [`PinError::Io`] if the temporary file cannot be written or the rename fails
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let staged = stage(path, content)?;
    commit(staged, path)
}

/// Write `content` to a synced temporary file next to `path`
///
/// Dropping the returned file without [`commit`] removes it and leaves
/// `path` untouched.
pub(crate) fn stage(path: &Path, content: &[u8]) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .ok_or_else(|| PinError::internal(format!("{:?} has no parent directory", path)))?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    trace!("staged {} bytes for {:?}", content.len(), path);
    Ok(temp)
}

/// Rename a staged file over `path`
pub(crate) fn commit(staged: NamedTempFile, path: &Path) -> Result<()> {
    staged.persist(path).map_err(|e| PinError::Io(e.error))?;
    Ok(())
}

/// Read a file, treating absence as empty content
pub fn read_or_empty(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

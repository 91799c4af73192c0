//! Crash-safe file operations
//!
//! Writes go to a sibling temp file that is fsynced and then renamed over the
//! target, so readers see either the old or the new content. The temp name
//! starts with `.` and carries [`TEMP_MARKER`], which every directory scan
//! ignores.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::FsError;

/// Reserved substring marking in-flight temp files
pub const TEMP_MARKER: &str = ".dq-tmp";

/// Extension every queue document carries
pub const DOC_EXTENSION: &str = ".md";

/// Whether a directory entry name follows the document naming convention
pub fn is_document_name(name: &str) -> bool {
    name.ends_with(DOC_EXTENSION)
        && name.len() > DOC_EXTENSION.len()
        && !name.starts_with('.')
        && !name.contains(TEMP_MARKER)
}

pub fn ensure_dir(dir: &Path) -> Result<(), FsError> {
    fs::create_dir_all(dir).map_err(|e| FsError::CreateDir {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Write `content` to `path` via temp file + fsync + rename
pub fn write_atomically(path: &Path, content: &str) -> Result<(), FsError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| FsError::NoFileName(path.to_path_buf()))?
        .to_string_lossy()
        .into_owned();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let write_err = |source: std::io::Error| FsError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}{}", file_name, TEMP_MARKER))
        .tempfile_in(parent)
        .map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    // A failed persist drops the temp file, which removes it
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

/// Move `path` into `dest_dir`, keeping its file name.
///
/// Refuses to replace an existing file of the same name. A rename across
/// filesystems fails with [`FsError::Relocate`]; nothing is copied.
pub fn relocate_file(path: &Path, dest_dir: &Path) -> Result<PathBuf, FsError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| FsError::NoFileName(path.to_path_buf()))?;
    ensure_dir(dest_dir)?;

    let dest = dest_dir.join(file_name);
    if dest.exists() {
        return Err(FsError::RelocateConflict { path: dest });
    }

    fs::rename(path, &dest).map_err(|e| FsError::Relocate {
        from: path.to_path_buf(),
        to: dest.clone(),
        source: e,
    })?;
    debug!("Moved {} to {}", path.display(), dest.display());
    Ok(dest)
}

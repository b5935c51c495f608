//! Atomic plain-file writes.
//!
//! Every file Cortex produces for the host (briefings, capsules, stores,
//! state) must appear atomically: write a temp file in the same directory,
//! then rename over the target. Rename is atomic on POSIX for
//! same-filesystem moves.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{CortexResult, StorageError};

/// Write `contents` to `path` atomically, creating parent directories.
pub fn write_atomic(path: &Path, contents: &str) -> CortexResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| write_err(path, e))?;
    }
    let tmp = tmp_path(path);
    if let Err(e) = fs::write(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(path, e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(path, e));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cortex".to_string());
    path.with_file_name(format!("{name}.tmp"))
}

fn write_err(path: &Path, source: std::io::Error) -> crate::errors::CortexError {
    StorageError::WriteFailed {
        path: path.display().to_string(),
        source,
    }
    .into()
}

//! Atomic write primitives
//!
//! Temp file plus rename, so readers never observe a half-written file.

#![allow(clippy::result_large_err)]

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{io_error, Result};

/// Atomically replace `target_path` with `content`
pub fn atomic_write(target_path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("create_state_dir", parent, e))?;
    }

    let temp_path = temp_path_for(target_path);
    fs::write(&temp_path, content).map_err(|e| io_error("write_state_temp", &temp_path, e))?;

    if let Err(e) = fs::rename(&temp_path, target_path) {
        fs::remove_file(&temp_path).ok();
        return Err(io_error("rename_state_temp", target_path, e));
    }

    Ok(())
}

/// `.marker` → `.marker.tmp`; the original extension is kept so two state
/// files in one directory never share a temp path
fn temp_path_for(target_path: &Path) -> PathBuf {
    let mut name = target_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target_path.with_file_name(name)
}

//! Process-scoped run lock
//!
//! An exclusive advisory lock on `<source>/.bytterfs-<label>.lock`, held from
//! startup until the `RunLock` is dropped. The lock file itself stays behind;
//! only the lock matters.

#![allow(clippy::result_large_err)]

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::errors::{concurrency, io_error, Result};

#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn lock_path(source: &Path, label: &str) -> PathBuf {
        source.join(format!(".bytterfs-{}.lock", label))
    }

    /// Take the lock without waiting
    ///
    /// # Errors
    /// `ExErrorKind::Concurrency` when another process holds it,
    /// `ExErrorKind::Io` when the lock file cannot be opened.
    pub fn acquire(source: &Path, label: &str) -> Result<Self> {
        let path = Self::lock_path(source, label);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| io_error("acquire_lock", &path, e))?;

        file.try_lock_exclusive().map_err(|_| {
            concurrency(
                "acquire_lock",
                &path,
                "another bytterfs run for this label is in progress",
            )
        })?;

        tracing::debug!(path = %path.display(), "run lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}

//! Crash marker
//!
//! A file next to the source subvolume whose presence at startup means the
//! previous run started a transfer it never confirmed. Presence is the only
//! signal the decision engine uses; the JSON body is for post-mortems.

#![allow(clippy::result_large_err)]

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytterfs_core_types::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::atomic::atomic_write;
use crate::errors::{concurrency, from_serde_json, io_error, Result};

/// What the marker records about the transfer it guards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub run_id: RunId,
    pub label: String,
    pub started_at: DateTime<Utc>,
    /// Snapshot being sent
    pub snapshot: String,
    /// Parent of an incremental send
    pub base: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashMarker {
    path: PathBuf,
}

impl CrashMarker {
    /// Marker for `label` at `<source>/.bytterfs-<label>.marker`
    pub fn for_label(source: &Path, label: &str) -> Self {
        Self {
            path: source.join(format!(".bytterfs-{}.marker", label)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    /// `ExErrorKind::Io` when existence cannot be determined.
    pub fn is_present(&self) -> Result<bool> {
        self.path
            .try_exists()
            .map_err(|e| io_error("check_marker", &self.path, e))
    }

    /// Create the marker; fails if it already exists
    ///
    /// # Errors
    /// `ExErrorKind::Concurrency` when another run created it first,
    /// `ExErrorKind::Io` on any other write failure.
    pub fn arm(&self, record: &MarkerRecord) -> Result<()> {
        let body = encode(&self.path, record)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    concurrency("arm_marker", &self.path, "crash marker already exists")
                }
                _ => io_error("arm_marker", &self.path, e),
            })?;

        file.write_all(&body)
            .and_then(|_| file.sync_all())
            .map_err(|e| io_error("arm_marker", &self.path, e))?;

        tracing::debug!(path = %self.path.display(), snapshot = %record.snapshot, "crash marker armed");
        Ok(())
    }

    /// Overwrite a marker left by an interrupted run with the current transfer
    ///
    /// # Errors
    /// `ExErrorKind::Io` on write failure.
    pub fn rearm(&self, record: &MarkerRecord) -> Result<()> {
        let body = encode(&self.path, record)?;
        atomic_write(&self.path, &body)?;
        tracing::debug!(path = %self.path.display(), snapshot = %record.snapshot, "crash marker re-armed");
        Ok(())
    }

    /// Remove the marker after a confirmed transfer
    ///
    /// # Errors
    /// `ExErrorKind::Io` when the file exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "crash marker already gone");
                Ok(())
            }
            Err(e) => Err(io_error("clear_marker", &self.path, e)),
        }
    }

    /// Read the record left behind, if any
    ///
    /// # Errors
    /// `ExErrorKind::Io` on read failure, `ExErrorKind::Serialization` when
    /// the body is not a record (older or hand-made markers).
    pub fn read(&self) -> Result<Option<MarkerRecord>> {
        let body = match fs::read(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read_marker", &self.path, e)),
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| from_serde_json("read_marker", &self.path, e))
    }
}

fn encode(path: &Path, record: &MarkerRecord) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(record).map_err(|e| from_serde_json("encode_marker", path, e))
}

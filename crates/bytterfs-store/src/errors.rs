//! Error handling for bytterfs-store
//!
//! Wraps bytterfs-core ExError with store-specific helpers. Every store file
//! lives next to the source subvolume, so errors point at the source side.

use std::path::Path;

use bytterfs_core::errors::{ExError, ExErrorKind};
use bytterfs_core::model::Location;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create an IO error
pub fn io_error(operation: &str, path: &Path, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation)
        .with_location(Location::Source)
        .with_message(format!("{}: {}", path.display(), err))
}

/// Another run already holds the lock or raced us to the marker
pub fn concurrency(operation: &str, path: &Path, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Concurrency)
        .with_op(operation)
        .with_location(Location::Source)
        .with_message(format!("{}: {}", path.display(), reason))
}

/// Create a serialization error from serde_json::Error
pub fn from_serde_json(operation: &str, path: &Path, err: serde_json::Error) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op(operation)
        .with_location(Location::Source)
        .with_message(format!("{}: {}", path.display(), err))
}

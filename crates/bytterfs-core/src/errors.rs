use crate::model::Location;
use thiserror::Error;

/// Result type alias using BackupError
pub type Result<T> = std::result::Result<T, BackupError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code used in log events, operator
/// notifications and tests. The kind also decides whether a failure aborts
/// the run or is recovered locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Configuration
    Config,

    // Inventory
    InventoryUnreachable,
    /// Unparsable snapshot name; the row is skipped
    Naming,

    // Decision invariants
    MissingInvariant,

    // Snapshot primitives
    SnapshotCreateFailure,
    SnapshotDeleteFailure,
    /// A single deletion failed while pruning destination history
    PruneDeleteFailure,

    // Transfer
    TransferFailure,
    TransferTimeout,

    // Run exclusion (lock held, marker raced)
    Concurrency,

    // Integration/IO
    Notification,
    Io,
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::InventoryUnreachable => "ERR_INVENTORY_UNREACHABLE",
            ExErrorKind::Naming => "ERR_NAMING",
            ExErrorKind::MissingInvariant => "ERR_MISSING_INVARIANT",
            ExErrorKind::SnapshotCreateFailure => "ERR_SNAPSHOT_CREATE",
            ExErrorKind::SnapshotDeleteFailure => "ERR_SNAPSHOT_DELETE",
            ExErrorKind::PruneDeleteFailure => "ERR_PRUNE_DELETE",
            ExErrorKind::TransferFailure => "ERR_TRANSFER_FAILURE",
            ExErrorKind::TransferTimeout => "ERR_TRANSFER_TIMEOUT",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Notification => "ERR_NOTIFICATION",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether a failure of this kind is handled in place (logged, reported)
    /// while the run continues with the remaining data.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExErrorKind::Naming | ExErrorKind::PruneDeleteFailure | ExErrorKind::Notification
        )
    }
}

/// Canonical structured error type
///
/// Carries a classification kind plus the context needed to tell the operator
/// which snapshot and which end of the replication pair were involved.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    snapshot: Option<String>,
    location: Option<Location>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            snapshot: None,
            location: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add snapshot name context
    pub fn with_snapshot(mut self, name: impl Into<String>) -> Self {
        self.snapshot = Some(name.into());
        self
    }

    /// Add location context
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the snapshot name context, if any
    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// Get the location context, if any
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    /// Shorthand for `self.kind().is_recoverable()`
    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(snapshot) = &self.snapshot {
            write!(f, " (snapshot: {})", snapshot)?;
        }
        if let Some(location) = self.location {
            write!(f, " (location: {})", location)?;
        }
        if let Some(source) = &self.source {
            write!(f, " <- {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain errors raised by the pure snapshot-lifecycle logic
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackupError {
    // ===== Configuration Errors =====
    /// Retention spec is empty
    #[error("Retention spec is empty")]
    EmptyRetentionSpec,

    /// A single `<N>(w|m)=<K>` token could not be parsed
    #[error("Invalid retention token '{token}': {reason}")]
    InvalidRetentionToken { token: String, reason: String },

    /// Retention windows must grow strictly from left to right
    #[error("Retention windows are not strictly increasing: {spec}")]
    RetentionWindowsNotIncreasing { spec: String },

    /// Path argument rejected at configuration time
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Snapshot label rejected at configuration time
    #[error("Invalid snapshot label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },

    /// Configuration file could not be read or parsed
    #[error("Invalid configuration file {path}: {reason}")]
    ConfigFile { path: String, reason: String },

    // ===== Naming Errors =====
    /// Snapshot name does not follow `<label>_<timestamp>`
    #[error("Snapshot name '{name}' is malformed: {reason}")]
    InvalidSnapshotName { name: String, reason: String },

    // ===== Invariant Errors =====
    /// Crash marker present but the destination holds no snapshot at all
    #[error("Crash marker present but destination has no snapshots")]
    MarkerWithEmptyDestination,

    /// Destination container subvolume does not exist under the root
    #[error("Destination container {container} not found under {root}")]
    DestinationContainerMissing { container: String, root: String },
}

impl From<BackupError> for ExError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::EmptyRetentionSpec => ExError::new(ExErrorKind::Config)
                .with_op("parse_retention")
                .with_message("Retention spec is empty"),

            BackupError::InvalidRetentionToken { token, reason } => {
                ExError::new(ExErrorKind::Config)
                    .with_op("parse_retention")
                    .with_message(format!("Invalid retention token '{}': {}", token, reason))
            }

            BackupError::RetentionWindowsNotIncreasing { spec } => {
                ExError::new(ExErrorKind::Config)
                    .with_op("parse_retention")
                    .with_message(format!("Time spans are unsorted: {}", spec))
            }

            BackupError::InvalidPath { path, reason } => ExError::new(ExErrorKind::Config)
                .with_op("validate_config")
                .with_message(format!("Invalid path '{}': {}", path, reason)),

            BackupError::InvalidLabel { label, reason } => ExError::new(ExErrorKind::Config)
                .with_op("validate_config")
                .with_message(format!("Invalid label '{}': {}", label, reason)),

            BackupError::ConfigFile { path, reason } => ExError::new(ExErrorKind::Config)
                .with_op("load_config")
                .with_message(format!("{}: {}", path, reason)),

            BackupError::InvalidSnapshotName { name, reason } => {
                ExError::new(ExErrorKind::Naming)
                    .with_op("parse_snapshot_name")
                    .with_snapshot(name)
                    .with_message(reason)
            }

            BackupError::MarkerWithEmptyDestination => {
                ExError::new(ExErrorKind::MissingInvariant)
                    .with_op("decide")
                    .with_location(Location::Destination)
                    .with_message("Crash marker present but destination has no snapshots")
            }

            BackupError::DestinationContainerMissing { container, root } => {
                ExError::new(ExErrorKind::MissingInvariant)
                    .with_op("check_container")
                    .with_location(Location::Destination)
                    .with_message(format!(
                        "Destination container {} not found under {}",
                        container, root
                    ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        let cases = [
            (ExErrorKind::Config, "ERR_CONFIG"),
            (ExErrorKind::InventoryUnreachable, "ERR_INVENTORY_UNREACHABLE"),
            (ExErrorKind::Naming, "ERR_NAMING"),
            (ExErrorKind::TransferFailure, "ERR_TRANSFER_FAILURE"),
            (ExErrorKind::TransferTimeout, "ERR_TRANSFER_TIMEOUT"),
            (ExErrorKind::MissingInvariant, "ERR_MISSING_INVARIANT"),
            (ExErrorKind::PruneDeleteFailure, "ERR_PRUNE_DELETE"),
        ];
        for (kind, expected_code) in cases {
            assert_eq!(kind.code(), expected_code, "Wrong code for {:?}", kind);
        }
    }

    #[test]
    fn test_only_local_kinds_are_recoverable() {
        assert!(ExErrorKind::Naming.is_recoverable());
        assert!(ExErrorKind::PruneDeleteFailure.is_recoverable());
        assert!(!ExErrorKind::TransferFailure.is_recoverable());
        assert!(!ExErrorKind::MissingInvariant.is_recoverable());
        assert!(!ExErrorKind::InventoryUnreachable.is_recoverable());
        assert!(!ExErrorKind::Config.is_recoverable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = ExError::new(ExErrorKind::TransferFailure)
            .with_op("transfer")
            .with_snapshot("rootfs_100")
            .with_location(Location::Destination)
            .with_message("receiver exited with status 1");
        let text = err.to_string();
        assert!(text.starts_with("[ERR_TRANSFER_FAILURE]"));
        assert!(text.contains("rootfs_100"));
        assert!(text.contains("destination"));
    }

    #[test]
    fn test_source_chain() {
        let inner = ExError::new(ExErrorKind::Io).with_message("broken pipe");
        let outer = ExError::new(ExErrorKind::TransferFailure).with_source(inner);
        assert_eq!(outer.source_error().map(|e| e.kind()), Some(ExErrorKind::Io));
        assert!(std::error::Error::source(&outer).is_some());
    }
}

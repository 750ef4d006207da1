//! Collaborator interfaces for snapshot primitives and byte transfer.
//!
//! The decision engine never touches btrfs or ssh directly; the run pipeline
//! drives these traits, and tests substitute in-memory implementations.

#![allow(clippy::result_large_err)]

use crate::errors::ExError;
use crate::inventory::SubvolumeRow;
use crate::model::{Location, Snapshot, SnapshotName};

/// Snapshot primitives on both ends of the replication pair
pub trait SnapshotHost {
    /// List subvolumes at `location`.
    ///
    /// A reachable location without subvolumes yields an empty list.
    ///
    /// # Errors
    ///
    /// `ExErrorKind::InventoryUnreachable` when the query itself fails.
    fn list_subvolumes(&self, location: Location) -> Result<Vec<SubvolumeRow>, ExError>;

    /// Create a read-only source snapshot named `name` and report it with
    /// its freshly assigned identity.
    ///
    /// # Errors
    ///
    /// `ExErrorKind::SnapshotCreateFailure` when creation fails.
    fn create_snapshot(&self, name: &SnapshotName) -> Result<Snapshot, ExError>;

    /// Delete `snapshot` at its own location.
    ///
    /// # Errors
    ///
    /// `ExErrorKind::SnapshotDeleteFailure` when deletion fails.
    fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<(), ExError>;

    /// Whether the destination container subvolume exists under the root.
    ///
    /// # Errors
    ///
    /// `ExErrorKind::InventoryUnreachable` when the destination cannot be queried.
    fn container_exists(&self) -> Result<bool, ExError>;
}

/// One send/receive to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Source snapshot to send
    pub snapshot: Snapshot,
    /// Parent for an incremental send; `None` sends in full
    pub base: Option<Snapshot>,
}

impl TransferRequest {
    pub fn full(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            base: None,
        }
    }

    pub fn incremental(snapshot: Snapshot, base: Snapshot) -> Self {
        Self {
            snapshot,
            base: Some(base),
        }
    }

    pub fn is_incremental(&self) -> bool {
        self.base.is_some()
    }
}

/// Executes a requested transfer and blocks until it is done
pub trait TransferCoordinator {
    /// Run the transfer to the destination container.
    ///
    /// # Errors
    ///
    /// `ExErrorKind::TransferFailure` when the receiving side (or, absent a
    /// receiver fault, the sending side) fails; `ExErrorKind::TransferTimeout`
    /// when the bounded wait expires.
    fn transfer(&self, request: &TransferRequest) -> Result<(), ExError>;
}

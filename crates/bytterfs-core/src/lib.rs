//! bytterfs core - snapshot-lifecycle decision engine
//!
//! Pure domain logic for replicating read-only btrfs snapshots:
//! - Snapshot naming and per-location inventories
//! - The decision engine choosing deletions plus one transfer per run
//! - Tiered retention rules and the even-spread pruner
//! - Collaborator traits for snapshot primitives, transfers and notifications
//! - Configuration, error and logging facilities shared by the other crates

pub mod config;
pub mod decision;
pub mod errors;
pub mod host;
pub mod inventory;
pub mod logging_facility;
pub mod model;
pub mod notifier;
pub mod retention;

// Re-export commonly used types
pub use config::{BackupArgs, BackupConfig, FileConfig};
pub use decision::{decide, Action, Notice, Plan};
pub use errors::{BackupError, ExError, ExErrorKind, Result};
pub use host::{SnapshotHost, TransferCoordinator, TransferRequest};
pub use inventory::{Inventory, InventoryScan, SubvolumeRow};
pub use model::{Location, Snapshot, SnapshotName};
pub use notifier::{NoopNotifier, Notifier, NotifyEvent, RecordingNotifier};
pub use retention::{plan_prune, PrunePlan, RetentionRule, RetentionRuleSet};

#[doc(hidden)]
pub use bytterfs_core_types as __core_types;

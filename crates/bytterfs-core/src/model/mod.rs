pub mod name;
pub mod snapshot;

pub use name::SnapshotName;
pub use snapshot::{Location, Snapshot};

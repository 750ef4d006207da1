//! bytterfs store - durable local state for a backup run
//!
//! Provides:
//! - The crash marker armed around each transfer
//! - The exclusive run lock held for a whole run
//! - Atomic file writes used by both

pub mod atomic;
pub mod errors;
pub mod lock;
pub mod marker;

// Re-export key types
pub use errors::Result;
pub use lock::RunLock;
pub use marker::{CrashMarker, MarkerRecord};

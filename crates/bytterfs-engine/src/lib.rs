//! bytterfs engine - orchestration layer
//!
//! Drives one backup run: the decision engine from `bytterfs-core`, the crash
//! marker and run lock from `bytterfs-store`, and the btrfs/ssh
//! implementations of the collaborator traits.

pub mod btrfs;
pub mod clock;
pub mod commands;
pub mod notify;
pub mod transfer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use commands::backup::{run_backup, Collaborators, RunReport};

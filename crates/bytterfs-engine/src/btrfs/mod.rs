//! btrfs and ssh plumbing behind the collaborator traits

pub mod host;
pub mod list;
pub mod runner;

pub use host::BtrfsHost;
pub use runner::{CommandLine, CommandOutput, CommandRunner, Endpoint, ProcessRunner, SshTarget};

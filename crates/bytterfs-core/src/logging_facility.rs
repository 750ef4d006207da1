//! Structured logging facility for bytterfs
//!
//! - Single initialization point via `init(profile)` or `init_with(&LogConfig)`
//! - Structured logging macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - Optional per-label log file next to console output
//! - Test capture mode for deterministic assertions
//!
//! # Usage
//!
//! ```rust
//! use bytterfs_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, init_with, LogConfig, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};

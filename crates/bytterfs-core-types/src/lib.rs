//! Small types shared by every bytterfs crate
//!
//! - [`RunId`]: correlation id for one backup run
//! - [`Sensitive`]: wrapper that keeps credentials out of logs
//! - [`schema`]: structured log field and event names

pub mod correlation;
pub mod schema;
pub mod sensitive;

pub use correlation::RunId;
pub use sensitive::Sensitive;

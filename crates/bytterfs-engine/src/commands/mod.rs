//! Command orchestration layer.
//!
//! Coordinates core decision logic, durable run state and the collaborators.

pub mod backup;

//! # Steering library.
//!
//! This library allows other crates in the workspace to access items defined inside the steering
//! crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Torque control module - converts desired curvature into a steering torque demand
pub mod torque_ctrl;

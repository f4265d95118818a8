//! # Vehicle interface crate.
//!
//! Provides the data exchanged between the host and the steering controller
//! on every control cycle.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Vehicle state, road geometry, desired motion and actuator feedback snapshots
pub mod vehicle;

/// Planned trajectory samples produced by the path planner
pub mod traj;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Standard gravitational acceleration.
///
/// Units: meters/second^2
pub const ACCELERATION_DUE_TO_GRAVITY: f64 = 9.81;

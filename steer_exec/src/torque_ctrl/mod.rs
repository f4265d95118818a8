//! # Torque control module
//!
//! Torque control converts the planner's desired path curvature into a
//! steering actuator torque demand. At higher speeds the lateral acceleration
//! achieved by a vehicle correlates with the torque applied to the steering
//! rack, rather than with wheel slip or speed, so the controller works in
//! lateral acceleration and maps that to torque through a torque model.
//!
//! Each cycle the controller:
//!  1. Refreshes the tuning parameters from the tuning store (every 250
//!     cycles).
//!  1. Builds the actual and desired lateral acceleration signals from the
//!     vehicle state and desired curvature.
//!  1. Shifts the setpoint and measurement by the low speed factor, which
//!     keeps the loop stable where the curvature to acceleration mapping
//!     becomes singular.
//!  1. Looks ahead along the planned trajectory to decide whether the desired
//!     lateral jerk is deliberate, scaling the friction compensation.
//!  1. Evaluates the torque model for the setpoint and the measurement, the
//!     difference being the error passed into the PID controller along with
//!     the feedforward torque.
//!  1. Updates the actuator delay estimate from the realised actuator torque.
//!
//! Steering rack friction must be overcome before the wheel moves at all, and
//! is compensated for in the torque model.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod diagnostics;
pub mod dsad;
pub mod features;
pub mod lookahead;
pub mod low_speed;
pub mod params;
pub mod pid;
pub mod signals;
pub mod state;
pub mod torque_model;
pub mod tuning;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use diagnostics::*;
pub use dsad::DelayEstimator;
pub use features::NnContext;
pub use low_speed::*;
pub use params::*;
pub use pid::PidController;
pub use signals::*;
pub use state::*;
pub use torque_model::*;
pub use tuning::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Below this speed the integrator is frozen.
///
/// Units: meters/second
pub const FREEZE_INTEGRATOR_SPEED_MS: f64 = 0.5;

/// Smallest speed used as a divisor, prevents blow up when stationary.
///
/// Units: meters/second
pub const MIN_SPEED_DIVISOR_MS: f64 = 1.0;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur while setting up TorqueCtrl.
///
/// Cyclic processing never fails, so these only occur during construction.
#[derive(Debug, thiserror::Error)]
pub enum TorqueCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Could not load the torque model: {0}")]
    ModelLoadError(ModelError),

    #[error("The neural torque model expects {found} inputs but the controller provides {expected}")]
    ModelInputSize {
        expected: usize,
        found: usize
    }
}

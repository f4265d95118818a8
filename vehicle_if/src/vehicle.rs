//! # Vehicle data snapshots

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Sensed state of the vehicle, sampled once per cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Forward speed of the vehicle, never negative.
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// Longitudinal acceleration.
    ///
    /// Units: meters/second^2
    pub long_accel_mss: f64,

    /// Steering wheel angle, positive to the left.
    ///
    /// Units: degrees
    pub steering_angle_deg: f64,

    /// Steering wheel rate.
    ///
    /// Units: degrees/second
    pub steering_rate_deg_s: f64,

    /// Calibrated yaw rate from the inertial sensors.
    ///
    /// Units: radians/second
    pub yaw_rate_rads: f64,

    /// True if the driver is applying torque to the steering wheel.
    pub steering_pressed: bool
}

/// Estimated geometry of the road surface and steering calibration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadGeometry {
    /// Road roll angle, positive when the road banks to the right.
    ///
    /// Units: radians
    pub roll_rad: f64,

    /// Road pitch angle, `None` if the orientation estimate is unavailable.
    ///
    /// Units: radians
    pub pitch_rad: Option<f64>,

    /// Learned offset between the measured and true straight-ahead steering
    /// angle.
    ///
    /// Units: degrees
    pub angle_offset_deg: f64
}

/// Motion demanded by the planner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredMotion {
    /// Desired path curvature, positive to the left.
    ///
    /// Units: 1/meters
    pub curvature_m: f64,

    /// Desired rate of change of the curvature, if the planner provides one.
    ///
    /// Units: 1/(meters seconds)
    pub curvature_rate_m_s: Option<f64>
}

/// Torque actually applied by the steering actuator, as reported by the
/// actuator itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorFeedback {
    /// Realised actuator torque, normalised to the actuator's maximum and
    /// positive to the left.
    pub steer_torque: f64
}

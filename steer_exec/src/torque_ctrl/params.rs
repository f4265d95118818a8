//! Torque control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use util::maths::interp;

// Internal
use super::{TorqueCtrlError, TuningParams};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for torque control
#[derive(Deserialize, Debug, Clone)]
pub struct Params {

    // ---- OUTPUT ----

    /// Maximum magnitude of the torque demand, normalised to the actuator's
    /// maximum.
    pub steer_max: f64,

    /// Rate at which the controller is executed.
    ///
    /// Units: hertz
    pub rate_hz: f64,

    // ---- PID ----

    /// Proportional gain, scheduled on speed
    pub k_p: GainSchedule,

    /// Integral gain, scheduled on speed
    pub k_i: GainSchedule,

    /// Derivative gain, scheduled on speed
    #[serde(default = "GainSchedule::zero")]
    pub k_d: GainSchedule,

    /// Feedforward gain, scheduled on speed
    #[serde(default = "GainSchedule::unity")]
    pub k_f: GainSchedule,

    // ---- ACTUATOR ----

    /// Static actuator response delay from the vehicle parameters. Used
    /// directly unless the dynamic delay estimate is enabled.
    ///
    /// Units: seconds
    pub steer_actuator_delay_s: f64,

    /// Enable the dynamic actuator delay estimate.
    #[serde(default)]
    pub enable_dsad: bool,

    /// Time the output must remain saturated before a saturation timeout is
    /// reported.
    ///
    /// Units: seconds
    #[serde(default = "default_steer_limit_timer_s")]
    pub steer_limit_timer_s: f64,

    // ---- FRICTION ----

    /// Use the planned lateral jerk to shape the friction compensation of the
    /// analytic torque model.
    #[serde(default)]
    pub use_lateral_jerk: bool,

    /// Scaling of the lateral jerk friction response.
    #[serde(default = "default_lat_jerk_friction_factor")]
    pub lat_jerk_friction_factor: f64,

    /// Scaling of the lateral acceleration friction response, in [0, 3].
    #[serde(default = "default_lat_accel_friction_factor")]
    pub lat_accel_friction_factor: f64,

    // ---- TUNING ----

    /// Vehicle specific tuning defaults, may be overridden at runtime from the
    /// tuning store.
    pub tuning: TuningParams
}

/// A gain scheduled on vehicle speed.
///
/// The gain is linearly interpolated between the speed breakpoints and held
/// constant outside them.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GainSchedule {
    /// Speed breakpoints, ascending.
    ///
    /// Units: meters/second
    pub speed_bp_ms: Vec<f64>,

    /// Gain at each breakpoint
    pub gain: Vec<f64>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check that the parameters are usable by the controller.
    pub fn validate(&self) -> Result<(), TorqueCtrlError> {
        if !(self.steer_max > 0.0) {
            return Err(TorqueCtrlError::InvalidParam(
                format!("steer_max must be positive, found {}", self.steer_max)
            ))
        }

        if !(self.rate_hz > 0.0) {
            return Err(TorqueCtrlError::InvalidParam(
                format!("rate_hz must be positive, found {}", self.rate_hz)
            ))
        }

        if !(self.steer_actuator_delay_s >= 0.0) {
            return Err(TorqueCtrlError::InvalidParam(format!(
                "steer_actuator_delay_s must not be negative, found {}",
                self.steer_actuator_delay_s
            )))
        }

        if !(self.tuning.lat_accel_factor > 0.0) {
            return Err(TorqueCtrlError::InvalidParam(format!(
                "tuning.lat_accel_factor must be positive, found {}",
                self.tuning.lat_accel_factor
            )))
        }

        for (name, schedule) in [
            ("k_p", &self.k_p),
            ("k_i", &self.k_i),
            ("k_d", &self.k_d),
            ("k_f", &self.k_f)
        ].iter() {
            if !schedule.is_valid() {
                return Err(TorqueCtrlError::InvalidParam(format!(
                    "{} must have the same, non-zero, number of ascending speed breakpoints \
                    and gains",
                    name
                )))
            }
        }

        Ok(())
    }

    /// Period of one control cycle.
    ///
    /// Units: seconds
    pub fn dt_s(&self) -> f64 {
        1.0 / self.rate_hz
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            steer_max: 1.0,
            rate_hz: 100.0,
            k_p: GainSchedule::constant(1.0),
            k_i: GainSchedule::constant(0.1),
            k_d: GainSchedule::zero(),
            k_f: GainSchedule::unity(),
            steer_actuator_delay_s: 0.2,
            enable_dsad: false,
            steer_limit_timer_s: default_steer_limit_timer_s(),
            use_lateral_jerk: false,
            lat_jerk_friction_factor: default_lat_jerk_friction_factor(),
            lat_accel_friction_factor: default_lat_accel_friction_factor(),
            tuning: TuningParams::default()
        }
    }
}

impl GainSchedule {
    /// A gain which does not vary with speed.
    pub fn constant(gain: f64) -> Self {
        Self {
            speed_bp_ms: vec![0.0],
            gain: vec![gain]
        }
    }

    pub fn zero() -> Self {
        Self::constant(0.0)
    }

    pub fn unity() -> Self {
        Self::constant(1.0)
    }

    /// Get the gain at the given speed.
    pub fn at(&self, speed_ms: f64) -> f64 {
        interp(speed_ms, &self.speed_bp_ms, &self.gain)
    }

    fn is_valid(&self) -> bool {
        !self.speed_bp_ms.is_empty()
            && self.speed_bp_ms.len() == self.gain.len()
            && self.speed_bp_ms.windows(2).all(|w| w[1] >= w[0])
            && self.gain.iter().all(|g| g.is_finite())
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn default_steer_limit_timer_s() -> f64 {
    1.0
}

fn default_lat_jerk_friction_factor() -> f64 {
    0.4
}

fn default_lat_accel_friction_factor() -> f64 {
    0.7
}

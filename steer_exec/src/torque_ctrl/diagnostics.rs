//! Per-cycle diagnostics and saturation monitoring

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;
use util::maths::clamp;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Margin from the output limit within which the output counts as saturated.
pub const SATURATION_EPSILON: f64 = 1e-3;

/// Saturation only counts towards the timeout above this speed.
///
/// Units: meters/second
pub const SATURATION_CHECK_MIN_SPEED_MS: f64 = 10.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Diagnostics record produced every cycle, active or not.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Cycle count since the controller was created.
    ///
    /// Two inactive cycles with the same inputs produce records that differ
    /// only in this field.
    pub tick: u64,

    /// True if the controller was engaged this cycle.
    pub active: bool,

    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub f: f64,

    /// Torque error passed into the PID controller.
    ///
    /// Zero on a cycle where the previous output was held.
    pub error: f64,

    /// Torque demand returned to the host.
    pub output: f64,

    /// Units: meters/second^2
    pub actual_lateral_accel: f64,

    /// Units: meters/second^2
    pub desired_lateral_accel: f64,

    /// Planned lateral jerk over the actuator delay plus the jerk margin.
    ///
    /// Units: meters/second^3
    pub desired_lateral_jerk: f64,

    /// Persistent part of the planned lateral jerk.
    ///
    /// Units: meters/second^3
    pub lookahead_lateral_jerk: f64,

    /// Value the friction term was evaluated at, the acceleration error plus
    /// any lookahead jerk contribution.
    pub friction_input: f64,

    /// True if the output is at its limit.
    pub saturated: bool,

    /// True if the output has been saturated for longer than the steer limit
    /// timer.
    pub saturation_timeout: bool,

    pub low_speed_factor: f64,

    pub lat_accel_factor: f64,

    pub lat_accel_offset: f64,

    pub friction: f64,

    /// Units: seconds
    pub actuator_delay_s: f64,

    /// True if the neural feedforward was used this cycle.
    pub used_nn: bool,

    /// True if a torque model evaluation failed and the previous output was
    /// held.
    pub model_fault: bool,

    /// Neural model feature vectors (feedforward, setpoint, measurement).
    #[serde(skip)]
    pub nn_log: Option<Vec<f64>>
}

/// Tracks how long the output has been saturated.
#[derive(Debug, Clone, Copy)]
pub struct SaturationMonitor {
    count_s: f64,
    limit_s: f64,
    dt_s: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SaturationMonitor {
    pub fn new(limit_s: f64, dt_s: f64) -> Self {
        Self {
            count_s: 0.0,
            limit_s,
            dt_s
        }
    }

    /// Update the timer, returning true once saturation has persisted for the
    /// limit time.
    ///
    /// Saturation is only counted above `SATURATION_CHECK_MIN_SPEED_MS` when
    /// the actuator isn't rate limited and the driver isn't steering, the
    /// timer decays otherwise.
    pub fn update(
        &mut self,
        saturated: bool,
        speed_ms: f64,
        steer_limited: bool,
        steering_pressed: bool
    ) -> bool {
        if saturated
            && speed_ms > SATURATION_CHECK_MIN_SPEED_MS
            && !steer_limited
            && !steering_pressed
        {
            self.count_s += self.dt_s;
        }
        else {
            self.count_s -= self.dt_s;
        }

        self.count_s = clamp(&self.count_s, &0.0, &self.limit_s);

        self.count_s > self.limit_s - SATURATION_EPSILON
    }

    /// Time counted towards the timeout.
    ///
    /// Units: seconds
    pub fn count_s(&self) -> f64 {
        self.count_s
    }

    pub fn reset(&mut self) {
        self.count_s = 0.0;
    }
}

/// True if `output` is within `SATURATION_EPSILON` of `limit`.
pub fn is_saturated(output: f64, limit: f64) -> bool {
    limit - output.abs() < SATURATION_EPSILON
}

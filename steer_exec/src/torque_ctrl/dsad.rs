//! # Dynamic steering actuator delay
//!
//! The effective delay of the steering actuator isn't constant: at low torque
//! the rack has to take up slack and overcome friction before anything
//! happens, while at higher torque it responds quickly, and faster still when
//! the realised torque already tracks the demand. The estimator blends a
//! torque based delay and a fixed low torque delay on the realised actuator
//! torque, then smooths the result.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use util::{filter::FirstOrderFilter, maths::interp};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Time constant of the delay smoothing filter.
///
/// Units: seconds
pub const DSAD_FILTER_RC_S: f64 = 2.5;

/// Delay used when the realised torque is small.
///
/// Units: seconds
pub const LOW_TORQUE_DELAY_S: f64 = 0.5;

/// Number of cycles between estimate log messages.
pub const DSAD_LOG_PERIOD: u64 = 50;

const TORQUE_DIFF_BP: [f64; 2] = [0.0, 1.0];

/// Units: seconds
const TORQUE_DELAY_V_S: [f64; 2] = [0.02, 0.40];

const BLEND_BP: [f64; 2] = [0.1, 0.35];

const BLEND_V: [f64; 2] = [0.0, 1.0];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Smoothed actuator delay estimate.
#[derive(Debug, Clone, Copy)]
pub struct DelayEstimator {
    enabled: bool,
    static_delay_s: f64,
    filter: FirstOrderFilter
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DelayEstimator {
    /// Create a new estimator.
    ///
    /// # Inputs
    /// - `enabled`: if false the static delay is always used
    /// - `static_delay_s`: the delay from the vehicle parameters, used
    ///   until the first actuator feedback arrives
    /// - `dt_s`: controller period
    pub fn new(enabled: bool, static_delay_s: f64, dt_s: f64) -> Self {
        Self {
            enabled,
            static_delay_s,
            filter: FirstOrderFilter::new(0.0, DSAD_FILTER_RC_S, dt_s, false)
        }
    }

    /// The actuator delay to use for the next cycle.
    ///
    /// Units: seconds
    pub fn delay_s(&self) -> f64 {
        if self.enabled && self.filter.is_initialized() {
            self.filter.value()
        }
        else {
            self.static_delay_s
        }
    }

    /// Update the estimate with this cycle's actuator feedback.
    ///
    /// `commanded` is the torque demand before it is negated into the
    /// actuator's convention, so a realised torque that tracks the demand
    /// gives a sum near zero. Without feedback the estimate holds.
    pub fn update(&mut self, realized: Option<f64>, commanded: f64, tick: u64) -> f64 {
        if !self.enabled {
            return self.delay_s()
        }

        match realized {
            Some(r) if r.is_finite() && commanded.is_finite() => {
                self.filter.update(raw_delay(r, commanded));

                if tick % DSAD_LOG_PERIOD == 0 {
                    debug!(
                        "DSAD: delay {:.3} s (realised torque {:.3}, commanded {:.3})",
                        self.filter.value(), r, -commanded
                    );
                }
            },
            _ => ()
        }

        self.delay_s()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Delay implied by the discrepancy between realised and commanded torque.
///
/// Units: seconds
pub fn torque_based_delay(torque_diff: f64) -> f64 {
    interp(torque_diff, &TORQUE_DIFF_BP, &TORQUE_DELAY_V_S)
}

/// Weight of the torque based delay against the low torque delay.
pub fn delay_blend(realized: f64) -> f64 {
    interp(realized.abs(), &BLEND_BP, &BLEND_V)
}

/// Unfiltered delay for one cycle.
///
/// Units: seconds
pub fn raw_delay(realized: f64, commanded: f64) -> f64 {
    let blend = delay_blend(realized);

    blend * torque_based_delay((realized + commanded).abs())
        + (1.0 - blend) * LOW_TORQUE_DELAY_S
}

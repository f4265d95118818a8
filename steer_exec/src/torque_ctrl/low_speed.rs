//! # Low speed factor
//!
//! At low speed the mapping from curvature to lateral acceleration collapses
//! (it scales with speed squared), so a small acceleration error hides a large
//! curvature error. The low speed factor adds a curvature proportional term to
//! both the setpoint and the measurement to keep the loop stiff. The law that
//! computes the factor is vehicle specific and injected as a `LowSpeedFactor`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use serde::Deserialize;
use util::maths::interp;

// Internal
use super::TuningParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything a low speed factor law may depend on for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LowSpeedInputs {
    /// Factor returned on the previous active cycle.
    pub previous_factor: f64,

    /// Units: meters/second^2
    pub desired_lateral_accel: f64,

    /// Units: meters/second^2
    pub actual_lateral_accel: f64,

    /// Units: meters/second
    pub speed_ms: f64,

    /// Units: meters/second^3
    pub actual_lateral_jerk: f64,

    /// True if the reduced factor should be used, because another mechanism
    /// (neural model, jerk lookahead, non-linear torque model) already shapes
    /// the low speed response.
    pub suppress: bool,

    /// True if the integrator is frozen this cycle.
    pub freeze_integrator: bool
}

/// The squared speed table law.
///
/// `factor = interp(v, speed_bp_ms, factor_v)^2`, with `suppressed_factor_v`
/// used instead of `factor_v` when suppression is requested.
#[derive(Debug, Clone, Deserialize)]
pub struct TableLowSpeedFactor {
    /// Units: meters/second
    pub speed_bp_ms: Vec<f64>,

    pub factor_v: Vec<f64>,

    pub suppressed_factor_v: Vec<f64>
}

/// Holds the factor between cycles and sanitises the law's output.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowSpeedScheduler {
    last_factor: f64
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A vehicle specific low speed factor law.
pub trait LowSpeedFactor {
    /// Compute the factor for this cycle.
    ///
    /// Units: meters^2/second^2 (multiplies a curvature to give an
    /// acceleration)
    fn low_speed_factor(&self, tuning: &TuningParams, inputs: &LowSpeedInputs) -> f64;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for TableLowSpeedFactor {
    fn default() -> Self {
        Self {
            speed_bp_ms: vec![0.0, 10.0, 20.0, 30.0],
            factor_v: vec![15.0, 13.0, 10.0, 5.0],
            suppressed_factor_v: vec![12.0, 3.0, 1.0, 0.0]
        }
    }
}

impl LowSpeedFactor for TableLowSpeedFactor {
    fn low_speed_factor(&self, _tuning: &TuningParams, inputs: &LowSpeedInputs) -> f64 {
        let table = if inputs.suppress {
            &self.suppressed_factor_v
        }
        else {
            &self.factor_v
        };

        interp(inputs.speed_ms, &self.speed_bp_ms, table).powi(2)
    }
}

impl LowSpeedScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factor from the most recent active cycle.
    pub fn last_factor(&self) -> f64 {
        self.last_factor
    }

    /// Call the law once for this cycle and remember the result.
    ///
    /// A non-finite factor is replaced by zero, which removes the low speed
    /// shaping entirely.
    pub fn update(
        &mut self,
        law: &dyn LowSpeedFactor,
        tuning: &TuningParams,
        mut inputs: LowSpeedInputs
    ) -> f64 {
        inputs.previous_factor = self.last_factor;

        let mut factor = law.low_speed_factor(tuning, &inputs);

        if !factor.is_finite() {
            warn!("Low speed factor law returned {}, using zero", factor);
            factor = 0.0;
        }

        self.last_factor = factor;
        factor
    }

    pub fn reset(&mut self) {
        self.last_factor = 0.0;
    }
}

//! PID controller with feedforward, speed scheduled gains and integrator
//! freeze.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use util::{filter::FirstOrderFilter, maths::clamp};

// Internal
use super::GainSchedule;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Time constant of the error smoothing used for the derivative term.
///
/// Units: seconds
const ERROR_FILTER_RC_S: f64 = 0.5;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PidController {
    k_p: GainSchedule,
    k_i: GainSchedule,
    k_d: GainSchedule,
    k_f: GainSchedule,

    pos_limit: f64,
    neg_limit: f64,

    /// Integration period
    ///
    /// Units: seconds
    dt_s: f64,

    error_filter: FirstOrderFilter,
    prev_filtered_error: f64,

    p: f64,
    i: f64,
    d: f64,
    f: f64,
    control: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    /// Create a new controller with output limited to `[-limit, limit]`.
    pub fn new(
        k_p: GainSchedule,
        k_i: GainSchedule,
        k_d: GainSchedule,
        k_f: GainSchedule,
        limit: f64,
        dt_s: f64
    ) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            k_f,
            pos_limit: limit,
            neg_limit: -limit,
            dt_s,
            error_filter: FirstOrderFilter::new(0.0, ERROR_FILTER_RC_S, dt_s, false),
            prev_filtered_error: 0.0,
            p: 0.0,
            i: 0.0,
            d: 0.0,
            f: 0.0,
            control: 0.0
        }
    }

    /// Run one step of the controller.
    ///
    /// The integrator is only advanced if doing so moves the output away from
    /// its limit or moves the integrator towards the sign of the error, and
    /// never when `freeze_integrator` is set.
    pub fn update(
        &mut self,
        error: f64,
        feedforward: f64,
        speed_ms: f64,
        freeze_integrator: bool
    ) -> f64 {
        let has_history = self.error_filter.is_initialized();
        let filtered = self.error_filter.update(error);
        let error_rate = if has_history {
            (filtered - self.prev_filtered_error) / self.dt_s
        }
        else {
            0.0
        };
        self.prev_filtered_error = filtered;

        self.p = error * self.k_p.at(speed_ms);
        self.f = feedforward * self.k_f.at(speed_ms);
        self.d = error_rate * self.k_d.at(speed_ms);

        let i = self.i + error * self.k_i.at(speed_ms) * self.dt_s;
        let control = self.p + i + self.d + self.f;

        let unwinding = (error >= 0.0 && (control <= self.pos_limit || i < 0.0))
            || (error <= 0.0 && (control >= self.neg_limit || i > 0.0));

        if unwinding && !freeze_integrator {
            self.i = i;
        }

        let control = self.p + self.i + self.d + self.f;
        self.control = clamp(&control, &self.neg_limit, &self.pos_limit);
        self.control
    }

    /// Clear the integrator and derivative memory.
    pub fn reset(&mut self) {
        self.error_filter.reset(0.0, false);
        self.prev_filtered_error = 0.0;
        self.p = 0.0;
        self.i = 0.0;
        self.d = 0.0;
        self.f = 0.0;
        self.control = 0.0;
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    pub fn i(&self) -> f64 {
        self.i
    }

    pub fn d(&self) -> f64 {
        self.d
    }

    pub fn f(&self) -> f64 {
        self.f
    }

    /// Most recent (clamped) output.
    pub fn control(&self) -> f64 {
        self.control
    }

    pub fn limit(&self) -> f64 {
        self.pos_limit
    }
}

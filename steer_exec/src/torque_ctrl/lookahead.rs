//! # Lateral jerk lookahead
//!
//! Instantaneous lateral jerk changes too quickly to be useful on its own. By
//! looking ahead along the planned trajectory we can judge whether the
//! currently desired jerk persists into the near future, i.e. whether it is
//! deliberate, and only then let it shape the friction compensation.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use util::maths::{interp, sign};
use vehicle_if::traj::{CONTROL_N, Trajectory};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of earliest trajectory samples skipped when looking ahead, these are
/// planned to happen before the current desired value once the actuator delay
/// is accounted for.
pub const LAT_PLAN_MIN_IDX: usize = 5;

/// Upper index of the lookahead window when no sample is beyond the lookahead
/// time.
pub const DEFAULT_LOOKAHEAD_UPPER_IDX: usize = CONTROL_N - 1;

/// Time added to the actuator delay to find the planned acceleration used for
/// the desired jerk.
///
/// Units: seconds
pub const DESIRED_JERK_TIME_MARGIN_S: f64 = 0.3;

/// Units: meters/second
const FRICTION_LOOKAHEAD_BP_MS: [f64; 2] = [9.0, 30.0];

/// Units: seconds
const FRICTION_LOOKAHEAD_V_S: [f64; 2] = [1.4, 2.0];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Result of the jerk lookahead for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JerkEstimate {
    /// Jerk needed to reach the planned acceleration one actuator delay (plus
    /// margin) from now.
    ///
    /// Units: meters/second^3
    pub desired_lateral_jerk: f64,

    /// The persistent part of the desired jerk, zero if the plan reverses.
    ///
    /// Units: meters/second^3
    pub lookahead_lateral_jerk: f64,

    /// Jerk term fed to the setpoint torque evaluation.
    pub jerk_setpoint: f64,

    /// Jerk term fed to the measurement torque evaluation.
    pub jerk_measurement: f64,

    /// Scaling of the lateral acceleration error in the friction input for
    /// this cycle.
    pub lat_accel_friction_factor: f64
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Select the persistent value from a set of future values.
///
/// If any future value differs in sign from the current value the result is
/// zero. Otherwise it is the value, current included, with the smallest
/// magnitude. With no future values the current value is returned.
pub fn lookahead_value<I>(future: I, current: f64) -> f64
where
    I: IntoIterator<Item = f64>
{
    let current_sign = sign(current);
    let mut min_val = current;

    for v in future {
        if sign(v) != current_sign {
            return 0.0
        }

        if v.abs() < min_val.abs() {
            min_val = v;
        }
    }

    min_val
}

/// How far ahead to look at the given speed.
///
/// Units: seconds
pub fn lookahead_time_s(speed_ms: f64) -> f64 {
    interp(speed_ms, &FRICTION_LOOKAHEAD_BP_MS, &FRICTION_LOOKAHEAD_V_S)
}

/// Planned lateral jerk between each pair of consecutive trajectory samples.
pub fn predicted_lateral_jerks<'a>(traj: &'a Trajectory) -> impl Iterator<Item = f64> + 'a {
    traj.t_s.windows(2)
        .zip(traj.lat_accel_mss.windows(2))
        .map(|(t, a)| (a[1] - a[0]) / (t[1] - t[0]))
}

/// Run the lookahead over a good trajectory.
///
/// # Inputs
/// - `traj`: planned trajectory, must satisfy `Trajectory::is_good`
/// - `speed_ms`: vehicle speed
/// - `desired_lateral_accel`: current desired lateral acceleration
/// - `actual_lateral_jerk`: measured lateral jerk
/// - `actuator_delay_s`: current actuator delay estimate
/// - `use_steering_angle`: true if measuring curvature from the steering
///   angle, which disables the jerk terms
/// - `jerk_friction_factor`: scaling of the jerk terms
/// - `accel_friction_factor`: configured scaling of the acceleration error in
///   the friction input
pub fn estimate(
    traj: &Trajectory,
    speed_ms: f64,
    desired_lateral_accel: f64,
    actual_lateral_jerk: f64,
    actuator_delay_s: f64,
    use_steering_angle: bool,
    jerk_friction_factor: f64,
    accel_friction_factor: f64
) -> JerkEstimate {
    let lookahead = lookahead_time_s(speed_ms);
    let upper_idx = traj.t_s.iter()
        .position(|&t| t > lookahead)
        .unwrap_or(DEFAULT_LOOKAHEAD_UPPER_IDX);

    let jerk_time = actuator_delay_s + DESIRED_JERK_TIME_MARGIN_S;
    let desired_lateral_jerk = (
        interp(jerk_time, &traj.t_s, &traj.lat_accel_mss) - desired_lateral_accel
    ) / jerk_time;

    let mut lookahead_lateral_jerk = lookahead_value(
        predicted_lateral_jerks(traj)
            .skip(LAT_PLAN_MIN_IDX)
            .take(upper_idx.saturating_sub(LAT_PLAN_MIN_IDX)),
        desired_lateral_jerk
    );

    let mut actual_lateral_jerk = actual_lateral_jerk;
    let mut lat_accel_friction_factor = accel_friction_factor;

    if use_steering_angle || lookahead_lateral_jerk == 0.0 {
        lookahead_lateral_jerk = 0.0;
        actual_lateral_jerk = 0.0;
        lat_accel_friction_factor = 1.0;
    }

    JerkEstimate {
        desired_lateral_jerk,
        lookahead_lateral_jerk,
        jerk_setpoint: jerk_friction_factor * lookahead_lateral_jerk,
        jerk_measurement: jerk_friction_factor * actual_lateral_jerk,
        lat_accel_friction_factor
    }
}

impl JerkEstimate {
    /// Estimate used when no lookahead is possible, no jerk shaping.
    pub fn none(accel_friction_factor: f64) -> Self {
        Self {
            lat_accel_friction_factor: accel_friction_factor,
            ..Default::default()
        }
    }
}

//! # Planned trajectory
//!
//! The planner predicts the vehicle's motion over a fixed, ascending set of
//! time offsets (the model time grid). Each index into the trajectory is one
//! sample of that prediction.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of samples in a full planner trajectory.
pub const TRAJECTORY_SIZE: usize = 33;

/// Number of samples covering the control horizon. A trajectory shorter than
/// this is not usable by the controller.
pub const CONTROL_N: usize = 17;

/// Length of the planner's prediction horizon.
///
/// Units: seconds
pub const MAX_T_S: f64 = 10.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One time-indexed sample of the planned trajectory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    /// Time offset from now.
    ///
    /// Units: seconds
    pub t_s: f64,

    /// Predicted lateral acceleration.
    ///
    /// Units: meters/second^2
    pub lat_accel_mss: f64,

    /// Predicted change in roll orientation.
    ///
    /// Units: radians
    pub roll_rad: f64,

    /// Predicted change in pitch orientation.
    ///
    /// Units: radians
    pub pitch_rad: f64
}

/// A planned trajectory, stored as one vector per quantity so that the
/// controller can interpolate over each quantity directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Sample time offsets, ascending.
    pub t_s: Vec<f64>,

    /// Predicted lateral acceleration at each sample.
    pub lat_accel_mss: Vec<f64>,

    /// Predicted roll orientation at each sample.
    pub roll_rad: Vec<f64>,

    /// Predicted pitch orientation at each sample.
    pub pitch_rad: Vec<f64>
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Trajectory {
    /// Build a trajectory from a sequence of samples.
    pub fn from_samples<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = TrajectorySample>
    {
        let mut traj = Self::default();

        for s in samples {
            traj.t_s.push(s.t_s);
            traj.lat_accel_mss.push(s.lat_accel_mss);
            traj.roll_rad.push(s.roll_rad);
            traj.pitch_rad.push(s.pitch_rad);
        }

        traj
    }

    /// Number of samples in the trajectory.
    pub fn len(&self) -> usize {
        self.t_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t_s.is_empty()
    }

    /// Determine if the trajectory is usable by the controller.
    ///
    /// A good trajectory has at least `CONTROL_N` samples, the same number of
    /// values for every quantity, finite values, and strictly ascending times.
    pub fn is_good(&self) -> bool {
        let n = self.t_s.len();

        n >= CONTROL_N
            && self.lat_accel_mss.len() == n
            && self.roll_rad.len() == n
            && self.pitch_rad.len() == n
            && self.t_s.windows(2).all(|w| w[1] > w[0])
            && self.t_s.iter()
                .chain(self.lat_accel_mss.iter())
                .chain(self.roll_rad.iter())
                .chain(self.pitch_rad.iter())
                .all(|v| v.is_finite())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// The planner's model time grid, `t_i = 10 (i / 32)^2` seconds.
///
/// The grid is dense near the present and sparse towards the horizon.
pub fn t_idxs() -> [f64; TRAJECTORY_SIZE] {
    let mut t = [0f64; TRAJECTORY_SIZE];
    let last = (TRAJECTORY_SIZE - 1) as f64;

    for (i, ti) in t.iter_mut().enumerate() {
        *ti = MAX_T_S * (i as f64 / last).powi(2);
    }

    t
}

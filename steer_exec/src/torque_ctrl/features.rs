//! # Neural model feature assembly
//!
//! The neural torque model sees more than the current acceleration, it also
//! gets a short history of the desired acceleration and road roll, and the
//! planned acceleration and roll a little into the future. This module keeps
//! the histories and builds the feature vectors.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use util::{filter::FirstOrderFilter, maths::interp, ring_buffer::RingBuffer};
use vehicle_if::traj::{CONTROL_N, Trajectory};

// Internal
use super::MIN_SPEED_DIVISOR_MS;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Length of each feature vector.
pub const NN_INPUT_SIZE: usize = 18;

/// Number of cycles of history kept, 0.3 s at 100 Hz.
pub const HISTORY_LEN: usize = 30;

/// Indices into the (oldest first) history of the past samples, for 0.3, 0.2
/// and 0.1 s ago.
const HISTORY_OFFSETS: [usize; 3] = [0, 10, 20];

/// Future sample times before the delay offset is added.
///
/// Units: seconds
const FUTURE_TIMES_S: [f64; 4] = [0.3, 0.6, 1.0, 1.5];

/// Time added to the actuator delay to offset the future samples.
///
/// Units: seconds
pub const NN_TIME_OFFSET_MARGIN_S: f64 = 0.2;

/// Units: seconds
const PITCH_FILTER_RC_S: f64 = 0.5;

const NUM_PAST: usize = HISTORY_OFFSETS.len();
const NUM_FUTURE: usize = FUTURE_TIMES_S.len();

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Current cycle values going into the feature vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureInputs {
    /// Units: meters/second
    pub speed_ms: f64,

    /// Units: meters/second^2
    pub long_accel_mss: f64,

    /// Lateral acceleration setpoint including the low speed factor.
    pub setpoint: f64,

    /// Lateral acceleration measurement including the low speed factor.
    pub measurement: f64,

    pub jerk_setpoint: f64,

    pub jerk_measurement: f64,

    /// Units: meters/second^2
    pub desired_lateral_accel: f64,

    /// Friction input, already scaled by the model's friction factor.
    pub friction_input: f64,

    /// Units: radians
    pub roll_rad: f64,

    /// Units: radians
    pub pitch_rad: Option<f64>,

    /// Offset applied to the future sample times, the actuator delay plus a
    /// margin.
    ///
    /// Units: seconds
    pub time_offset_s: f64
}

/// The three feature vectors for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NnFeatures {
    /// Vector giving the torque for the setpoint.
    pub setpoint: [f64; NN_INPUT_SIZE],

    /// Vector giving the torque for the measurement.
    pub measurement: [f64; NN_INPUT_SIZE],

    /// Vector giving the feedforward torque.
    pub feedforward: [f64; NN_INPUT_SIZE],

    /// Roll used in the vectors, pitch adjusted if the pitch was known.
    pub roll_rad: f64
}

/// Histories and filters feeding the neural feature vectors.
#[derive(Debug, Clone)]
pub struct NnContext {
    roll_history: RingBuffer<HISTORY_LEN>,
    desired_history: RingBuffer<HISTORY_LEN>,
    pitch_filter: FirstOrderFilter,
    dt_s: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NnContext {
    /// Create a new context for a controller running with period `dt_s`.
    pub fn new(dt_s: f64) -> Self {
        Self {
            roll_history: RingBuffer::new(),
            desired_history: RingBuffer::new(),
            pitch_filter: FirstOrderFilter::new(0.0, PITCH_FILTER_RC_S, dt_s, true),
            dt_s
        }
    }

    /// Record this cycle's values and build the feature vectors.
    pub fn assemble(&mut self, inputs: &FeatureInputs, traj: &Trajectory) -> NnFeatures {
        let pitch = match inputs.pitch_rad {
            Some(p) => self.pitch_filter.update(p),
            None => self.pitch_filter.value()
        };
        let roll = match inputs.pitch_rad {
            Some(_) => roll_pitch_adjust(inputs.roll_rad, pitch),
            None => inputs.roll_rad
        };

        self.roll_history.push(roll);
        self.desired_history.push(inputs.desired_lateral_accel);

        let future_times = adjusted_future_times(
            inputs.time_offset_s,
            inputs.long_accel_mss,
            inputs.speed_ms
        );

        let past_rolls = past_samples(&self.roll_history, roll);
        let past_desired = past_samples(&self.desired_history, inputs.desired_lateral_accel);

        let mut future_rolls = [0f64; NUM_FUTURE];
        let mut future_planned = [0f64; NUM_FUTURE];
        let control_n = CONTROL_N.min(traj.len());

        for (i, &t) in future_times.iter().enumerate() {
            future_rolls[i] = roll_pitch_adjust(
                interp(t, &traj.t_s, &traj.roll_rad) + roll,
                interp(t, &traj.t_s, &traj.pitch_rad) + pitch
            );
            future_planned[i] = interp(t, &traj.t_s[..control_n], &traj.lat_accel_mss);
        }

        let mut setpoint = [inputs.setpoint; NN_INPUT_SIZE];
        let mut measurement = [inputs.measurement; NN_INPUT_SIZE];
        let mut feedforward = [0f64; NN_INPUT_SIZE];

        setpoint[..4].copy_from_slice(&[
            inputs.speed_ms, inputs.setpoint, inputs.jerk_setpoint, roll
        ]);
        measurement[..4].copy_from_slice(&[
            inputs.speed_ms, inputs.measurement, inputs.jerk_measurement, roll
        ]);

        write_roll_tail(&mut setpoint, &past_rolls, &future_rolls);
        write_roll_tail(&mut measurement, &past_rolls, &future_rolls);

        feedforward[..4].copy_from_slice(&[
            inputs.speed_ms, inputs.desired_lateral_accel, inputs.friction_input, roll
        ]);
        let mut idx = 4;
        for chunk in [&past_desired[..], &future_planned[..], &past_rolls[..], &future_rolls[..]].iter() {
            feedforward[idx..idx + chunk.len()].copy_from_slice(chunk);
            idx += chunk.len();
        }

        NnFeatures {
            setpoint,
            measurement,
            feedforward,
            roll_rad: roll
        }
    }

    /// Filtered road pitch.
    pub fn pitch_rad(&self) -> f64 {
        self.pitch_filter.value()
    }

    /// Clear all history.
    pub fn reset(&mut self) {
        *self = Self::new(self.dt_s);
    }
}

impl NnFeatures {
    /// The vectors concatenated for logging: feedforward, setpoint, then
    /// measurement.
    pub fn to_log(&self) -> Vec<f64> {
        self.feedforward.iter()
            .chain(self.setpoint.iter())
            .chain(self.measurement.iter())
            .copied()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// As pitch grows the gravitational component starts pointing along the
/// vehicle rather than across it, reducing the effect of roll.
pub fn roll_pitch_adjust(roll_rad: f64, pitch_rad: f64) -> f64 {
    roll_rad * pitch_rad.cos()
}

/// Future sample times, offset by `time_offset_s` and stretched or shrunk by
/// the longitudinal acceleration (a faster vehicle reaches a point sooner).
pub fn adjusted_future_times(
    time_offset_s: f64,
    long_accel_mss: f64,
    speed_ms: f64
) -> [f64; NUM_FUTURE] {
    let mut times = [0f64; NUM_FUTURE];

    for (i, t) in FUTURE_TIMES_S.iter().enumerate() {
        let t = t + time_offset_s;
        times[i] = t + 0.5 * long_accel_mss * (t / speed_ms.max(MIN_SPEED_DIVISOR_MS));
    }

    times
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Past samples from the history. Until the history fills, offsets beyond its
/// length take the newest sample.
fn past_samples(history: &RingBuffer<HISTORY_LEN>, current: f64) -> [f64; NUM_PAST] {
    let mut out = [current; NUM_PAST];

    for (o, &i) in out.iter_mut().zip(HISTORY_OFFSETS.iter()) {
        *o = history.get_saturating(i).unwrap_or(current);
    }

    out
}

/// Both error vectors end with the past and future rolls.
fn write_roll_tail(
    v: &mut [f64; NN_INPUT_SIZE],
    past_rolls: &[f64; NUM_PAST],
    future_rolls: &[f64; NUM_FUTURE]
) {
    let tail = NN_INPUT_SIZE - NUM_PAST - NUM_FUTURE;
    v[tail..tail + NUM_PAST].copy_from_slice(past_rolls);
    v[tail + NUM_PAST..].copy_from_slice(future_rolls);
}

#[cfg(test)]
mod test {
    use super::*;
    use vehicle_if::traj::{t_idxs, TrajectorySample};

    fn flat_traj(lat_accel: f64) -> Trajectory {
        Trajectory::from_samples(t_idxs().iter().map(|&t| TrajectorySample {
            t_s: t,
            lat_accel_mss: lat_accel,
            ..Default::default()
        }))
    }

    fn inputs() -> FeatureInputs {
        FeatureInputs {
            speed_ms: 20.0,
            setpoint: 0.5,
            measurement: 0.3,
            jerk_setpoint: 0.1,
            jerk_measurement: 0.05,
            desired_lateral_accel: 0.45,
            friction_input: 0.2,
            roll_rad: 0.02,
            time_offset_s: 0.4,
            ..Default::default()
        }
    }

    #[test]
    fn test_vector_layout() {
        let mut ctx = NnContext::new(0.01);
        let f = ctx.assemble(&inputs(), &flat_traj(0.7));

        assert_eq!(&f.setpoint[..4], &[20.0, 0.5, 0.1, 0.02]);
        assert!(f.setpoint[4..11].iter().all(|&v| v == 0.5));
        assert!(f.setpoint[11..].iter().all(|&v| (v - 0.02).abs() < 1e-12));

        assert_eq!(&f.measurement[..4], &[20.0, 0.3, 0.05, 0.02]);
        assert!(f.measurement[4..11].iter().all(|&v| v == 0.3));

        assert_eq!(&f.feedforward[..4], &[20.0, 0.45, 0.2, 0.02]);
        assert!(f.feedforward[4..7].iter().all(|&v| v == 0.45));
        assert!(f.feedforward[7..11].iter().all(|&v| (v - 0.7).abs() < 1e-12));

        let log = f.to_log();
        assert_eq!(log.len(), 3 * NN_INPUT_SIZE);
        assert_eq!(log[1], 0.45);
        assert_eq!(log[NN_INPUT_SIZE + 1], 0.5);
    }

    #[test]
    fn test_history() {
        let mut ctx = NnContext::new(0.01);
        let traj = flat_traj(0.0);
        let mut inp = inputs();

        for i in 0..(HISTORY_LEN + 5) {
            inp.desired_lateral_accel = i as f64;
            ctx.assemble(&inp, &traj);
        }

        inp.desired_lateral_accel = 100.0;
        let f = ctx.assemble(&inp, &traj);

        // History holds the last 30 cycles, 100.0 is the newest
        assert_eq!(&f.feedforward[4..7], &[6.0, 16.0, 26.0]);
    }

    #[test]
    fn test_pitch_adjust() {
        let mut ctx = NnContext::new(0.01);
        let mut inp = inputs();
        inp.pitch_rad = Some(0.5);

        let f = ctx.assemble(&inp, &flat_traj(0.0));
        let pitch = ctx.pitch_rad();
        assert!(pitch > 0.0 && pitch < 0.5);
        assert!((f.roll_rad - 0.02 * pitch.cos()).abs() < 1e-12);

        // Without a pitch sample the filter holds and roll isn't adjusted
        inp.pitch_rad = None;
        let f = ctx.assemble(&inp, &flat_traj(0.0));
        assert_eq!(ctx.pitch_rad(), pitch);
        assert_eq!(f.roll_rad, 0.02);
    }

    #[test]
    fn test_adjusted_future_times() {
        let t = adjusted_future_times(0.2, 0.0, 10.0);
        assert!((t[0] - 0.5).abs() < 1e-12);
        assert!((t[3] - 1.7).abs() < 1e-12);

        let t = adjusted_future_times(0.0, 2.0, 0.0);
        assert!((t[0] - 0.6).abs() < 1e-12);
    }
}

//! # Steering simulation
//!
//! A simple closed loop plant for exercising the torque controller on a
//! host: the steering actuator follows the torque demand with a first order
//! lag, the rack has Coulomb friction, and the lateral acceleration is
//! proportional to the torque getting past the friction. The planner is
//! replaced by a scripted curvature profile.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;
use util::filter::FirstOrderFilter;
use vehicle_if::{
    traj::{t_idxs, Trajectory, TrajectorySample},
    vehicle::{ActuatorFeedback, VehicleState}
};

// Internal
use steer_lib::torque_ctrl::BicycleModel;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the simulation
#[derive(Debug, Clone, Deserialize)]
pub struct SimParams {
    /// Length of the simulation.
    ///
    /// Units: seconds
    pub duration_s: f64,

    /// Time at which the controller is engaged.
    ///
    /// Units: seconds
    pub engage_s: f64,

    /// Run in real time rather than as fast as possible.
    #[serde(default)]
    pub realtime: bool,

    /// Constant vehicle speed.
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// Constant road roll.
    ///
    /// Units: radians
    #[serde(default)]
    pub roll_rad: f64,

    /// Time constant of the actuator's torque response.
    ///
    /// Units: seconds
    pub actuator_time_constant_s: f64,

    /// Lateral acceleration per unit of torque past the rack friction.
    ///
    /// Units: meters/second^2
    pub torque_to_lat_accel: f64,

    /// Torque needed to overcome the rack friction.
    pub rack_friction: f64,

    /// Directory of the tuning store, if runtime overrides are used.
    #[serde(default)]
    pub tuning_store_dir: Option<String>,

    /// Path to a neural torque model, if one is used.
    #[serde(default)]
    pub nn_model_path: Option<String>,

    /// The simulated vehicle's geometry.
    pub vehicle: BicycleModel,

    /// The scripted curvature profile.
    pub profile: Vec<ProfileSegment>
}

/// One segment of the curvature profile, holding a constant curvature from
/// its start time until the next segment starts.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ProfileSegment {
    /// Units: seconds
    pub start_s: f64,

    /// Units: 1/meters
    pub curvature_m: f64
}

/// Simulated steering actuator and vehicle.
#[derive(Debug, Clone)]
pub struct SteerPlant {
    params: SimParams,
    actuator: FirstOrderFilter,
    dt_s: f64,
    steering_angle_deg: f64,
    steering_rate_deg_s: f64,
    lat_accel_mss: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimParams {
    /// Desired curvature of the profile at the given time.
    pub fn curvature_at(&self, time_s: f64) -> f64 {
        self.profile.iter()
            .take_while(|s| s.start_s <= time_s)
            .last()
            .map(|s| s.curvature_m)
            .unwrap_or(0.0)
    }

    /// The plan the profile implies from the given time, at constant speed.
    pub fn planned_trajectory(&self, time_s: f64) -> Trajectory {
        let v2 = self.speed_ms.powi(2);

        Trajectory::from_samples(t_idxs().iter().map(|&t| TrajectorySample {
            t_s: t,
            lat_accel_mss: self.curvature_at(time_s + t) * v2,
            ..Default::default()
        }))
    }
}

impl SteerPlant {
    pub fn new(params: &SimParams, dt_s: f64) -> Self {
        Self {
            params: params.clone(),
            actuator: FirstOrderFilter::new(0.0, params.actuator_time_constant_s, dt_s, true),
            dt_s,
            steering_angle_deg: 0.0,
            steering_rate_deg_s: 0.0,
            lat_accel_mss: 0.0
        }
    }

    /// The vehicle state as sensed at the start of a cycle.
    pub fn vehicle_state(&self) -> VehicleState {
        let speed_ms = self.params.speed_ms;

        VehicleState {
            speed_ms,
            long_accel_mss: 0.0,
            steering_angle_deg: self.steering_angle_deg,
            steering_rate_deg_s: self.steering_rate_deg_s,
            yaw_rate_rads: self.lat_accel_mss / speed_ms.max(1.0),
            steering_pressed: false
        }
    }

    /// Apply a torque demand for one cycle, returning the realised torque.
    pub fn step(&mut self, torque_demand: f64) -> ActuatorFeedback {
        let realised = self.actuator.update(torque_demand);

        // Only the torque past the rack friction turns the wheels. Positive
        // actuator torque gives negative curvature.
        let effective = realised.signum() * (realised.abs() - self.params.rack_friction).max(0.0);
        self.lat_accel_mss = -effective * self.params.torque_to_lat_accel;

        let speed_ms = self.params.speed_ms.max(1.0);
        let curvature = self.lat_accel_mss / speed_ms.powi(2);

        // Invert the vehicle model for the steering angle, whose curvature
        // sign is opposite to the path's
        let vm = &self.params.vehicle;
        let angle_deg = (-curvature * vm.steer_ratio / vm.curvature_factor(speed_ms)).to_degrees();

        self.steering_rate_deg_s = (angle_deg - self.steering_angle_deg) / self.dt_s;
        self.steering_angle_deg = angle_deg;

        ActuatorFeedback {
            steer_torque: realised
        }
    }

    /// Units: meters/second^2
    pub fn lat_accel_mss(&self) -> f64 {
        self.lat_accel_mss
    }
}

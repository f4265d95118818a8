//! # Lateral signal builder
//!
//! Derives the actual and desired lateral acceleration from the vehicle state,
//! road geometry and desired curvature. Everything here is a pure function of
//! its inputs.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;
use util::maths::interp;
use vehicle_if::{
    ACCELERATION_DUE_TO_GRAVITY,
    vehicle::{DesiredMotion, RoadGeometry, VehicleState}
};

// Internal
use super::{MIN_SPEED_DIVISOR_MS, TuningParams};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Speeds over which the measured curvature transitions from the vehicle
/// model to the inertial measurement.
///
/// Units: meters/second
const CURVATURE_BLEND_BP_MS: [f64; 2] = [2.0, 5.0];

/// Speed breakpoints of the desired curvature attenuation.
///
/// Units: meters/second
const CURVATURE_SCALE_BP_MS: [f64; 3] = [8.0, 13.0, 20.0];

/// Desired curvature attenuation at each breakpoint. Attenuating at medium
/// speed reduces cutting the inside of curves.
const CURVATURE_SCALE_V: [f64; 3] = [0.88, 0.93, 1.0];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Lateral signals for one control cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LateralSignals {
    /// Measured path curvature.
    ///
    /// Units: 1/meters
    pub actual_curvature: f64,

    /// Curvature equivalent of the steering angle deadzone.
    ///
    /// Units: 1/meters
    pub curvature_deadzone: f64,

    /// Attenuation applied to the desired curvature.
    pub curvature_scale: f64,

    /// Units: meters/second^2
    pub actual_lateral_accel: f64,

    /// Units: meters/second^2
    pub desired_lateral_accel: f64,

    /// Units: meters/second^2
    pub lateral_accel_deadzone: f64,

    /// Measured lateral jerk, only available when measuring from the steering
    /// angle.
    ///
    /// Units: meters/second^3
    pub actual_lateral_jerk: f64,

    /// Lateral acceleration due to gravity from road roll.
    ///
    /// Units: meters/second^2
    pub roll_compensation: f64
}

/// Steady state single track (bicycle) model of the vehicle.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BicycleModel {
    /// Ratio between steering wheel angle and road wheel angle.
    pub steer_ratio: f64,

    /// Units: meters
    pub wheelbase_m: f64,

    /// Slip factor of the vehicle, negative for an understeering vehicle.
    ///
    /// Units: seconds^2/meters^2
    pub slip_factor: f64
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Maps a steering angle to the path curvature it produces.
pub trait CurvatureModel {
    /// Curvature produced by the steering wheel angle `steer_angle_rad` at
    /// speed `speed_ms` on a road with roll `roll_rad`.
    fn calc_curvature(&self, steer_angle_rad: f64, speed_ms: f64, roll_rad: f64) -> f64;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BicycleModel {
    /// Curvature per unit road wheel angle at the given speed.
    pub fn curvature_factor(&self, speed_ms: f64) -> f64 {
        1.0 / (1.0 - self.slip_factor * speed_ms.powi(2)) / self.wheelbase_m
    }

    /// Curvature induced by gravity on a rolled road.
    pub fn roll_compensation(&self, roll_rad: f64, speed_ms: f64) -> f64 {
        if self.slip_factor.abs() < 1e-6 {
            0.0
        }
        else {
            (ACCELERATION_DUE_TO_GRAVITY * roll_rad)
                / ((1.0 / self.slip_factor) - speed_ms.powi(2))
        }
    }
}

impl CurvatureModel for BicycleModel {
    fn calc_curvature(&self, steer_angle_rad: f64, speed_ms: f64, roll_rad: f64) -> f64 {
        self.curvature_factor(speed_ms) * steer_angle_rad / self.steer_ratio
            + self.roll_compensation(roll_rad, speed_ms)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Attenuation of the desired curvature at the given speed.
pub fn curvature_attenuation(speed_ms: f64) -> f64 {
    interp(speed_ms, &CURVATURE_SCALE_BP_MS, &CURVATURE_SCALE_V)
}

/// Build the lateral signals for this cycle.
pub fn build_signals(
    vehicle: &VehicleState,
    road: &RoadGeometry,
    desired: &DesiredMotion,
    tuning: &TuningParams,
    model: &dyn CurvatureModel
) -> LateralSignals {
    let v = vehicle.speed_ms;
    let v2 = v.powi(2);

    // The vehicle model's curvature sign is opposite to the path convention
    let actual_curvature_vm = -model.calc_curvature(
        (vehicle.steering_angle_deg - road.angle_offset_deg).to_radians(),
        v,
        road.roll_rad
    );

    let actual_curvature;
    let curvature_deadzone;
    let mut actual_lateral_jerk = 0.0;

    if tuning.use_steering_angle {
        actual_curvature = actual_curvature_vm;
        curvature_deadzone = model.calc_curvature(
            tuning.steering_angle_deadzone_deg.to_radians(),
            v,
            0.0
        ).abs();

        let actual_curvature_rate = -model.calc_curvature(
            vehicle.steering_rate_deg_s.to_radians(),
            v,
            0.0
        );
        actual_lateral_jerk = actual_curvature_rate * v2;
    }
    else {
        let actual_curvature_inertial = vehicle.yaw_rate_rads / v.max(MIN_SPEED_DIVISOR_MS);
        actual_curvature = interp(
            v,
            &CURVATURE_BLEND_BP_MS,
            &[actual_curvature_vm, actual_curvature_inertial]
        );
        curvature_deadzone = 0.0;
    }

    let curvature_scale = curvature_attenuation(v);

    LateralSignals {
        actual_curvature,
        curvature_deadzone,
        curvature_scale,
        actual_lateral_accel: actual_curvature * v2,
        desired_lateral_accel: desired.curvature_m * v2 * curvature_scale,
        lateral_accel_deadzone: curvature_deadzone * v2,
        actual_lateral_jerk,
        roll_compensation: road.roll_rad * ACCELERATION_DUE_TO_GRAVITY
    }
}

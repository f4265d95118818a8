//! Closed box tests of the torque controller through its public interface.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use steer_lib::torque_ctrl::*;
use steer_lib::torque_ctrl::features::NN_INPUT_SIZE;
use util::maths::interp;
use vehicle_if::{
    traj::{t_idxs, Trajectory, TrajectorySample, CONTROL_N},
    vehicle::{ActuatorFeedback, DesiredMotion, RoadGeometry, VehicleState}
};

// ---------------------------------------------------------------------------
// STUB CAPABILITIES
// ---------------------------------------------------------------------------

/// One radian of steering angle gives one 1/m of curvature.
struct UnitModel;

impl CurvatureModel for UnitModel {
    fn calc_curvature(&self, steer_angle_rad: f64, _speed_ms: f64, _roll_rad: f64) -> f64 {
        steer_angle_rad
    }
}

struct NoLowSpeedFactor;

impl LowSpeedFactor for NoLowSpeedFactor {
    fn low_speed_factor(&self, _tuning: &TuningParams, _inputs: &LowSpeedInputs) -> f64 {
        0.0
    }
}

/// The linear model, failing for accelerations above 10 m/s^2.
struct FailsAboveTen;

impl AnalyticTorqueModel for FailsAboveTen {
    fn torque_from_lateral_accel(
        &self,
        inputs: &LatControlInputs,
        tuning: &TuningParams,
        friction_input: f64,
        lateral_accel_deadzone: f64,
        friction_compensation: bool,
        gravity_adjusted: bool
    ) -> Result<f64, ModelError> {
        if inputs.lateral_acceleration.abs() > 10.0 {
            return Err(ModelError::Malformed("out of range".into()))
        }

        LinearTorqueModel.torque_from_lateral_accel(
            inputs, tuning, friction_input, lateral_accel_deadzone,
            friction_compensation, gravity_adjusted
        )
    }

    fn is_linear(&self) -> bool {
        true
    }
}

/// A "network" returning its acceleration input.
struct AccelNn {
    size: usize
}

impl NeuralTorqueModel for AccelNn {
    fn input_size(&self) -> usize {
        self.size
    }

    fn evaluate(&self, input: &[f64]) -> Result<f64, ModelError> {
        Ok(input[1])
    }
}

/// As `AccelNn`, but asking for the analytic friction on top.
struct WeakFrictionNn;

impl NeuralTorqueModel for WeakFrictionNn {
    fn input_size(&self) -> usize {
        NN_INPUT_SIZE
    }

    fn evaluate(&self, input: &[f64]) -> Result<f64, ModelError> {
        Ok(input[1])
    }

    fn friction_override(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// HELPERS
// ---------------------------------------------------------------------------

fn e2e_params() -> Params {
    let mut params = Params::default();
    params.tuning.lat_accel_factor = 1.0;
    params.tuning.friction = 0.05;
    params
}

fn ctrl(params: Params, torque_model: FeedforwardModel, tuning_store: Box<dyn TuningStore>) -> TorqueCtrl {
    TorqueCtrl::new(
        params,
        Capabilities {
            curvature_model: Box::new(UnitModel),
            torque_model,
            low_speed_factor: Box::new(NoLowSpeedFactor),
            tuning_store
        }
    ).unwrap()
}

fn linear_ctrl(params: Params) -> TorqueCtrl {
    ctrl(
        params,
        FeedforwardModel::AnalyticLinear(Box::new(LinearTorqueModel)),
        Box::new(StaticTuning)
    )
}

fn input(speed_ms: f64, curvature_m: f64, active: bool) -> InputData<'static> {
    InputData {
        active,
        vehicle: VehicleState {
            speed_ms,
            ..Default::default()
        },
        road: RoadGeometry::default(),
        desired: DesiredMotion {
            curvature_m,
            curvature_rate_m_s: None
        },
        trajectory: None,
        actuator: None,
        steer_limited: false
    }
}

fn plan<F: Fn(f64) -> f64>(lat_accel: F) -> Trajectory {
    Trajectory::from_samples(t_idxs().iter().map(|&t| TrajectorySample {
        t_s: t,
        lat_accel_mss: lat_accel(t),
        ..Default::default()
    }))
}

fn constant_plan(lat_accel: f64) -> Trajectory {
    plan(|_| lat_accel)
}

fn neural_ctrl(params: Params, nn: Box<dyn NeuralTorqueModel>, tuning_store: Box<dyn TuningStore>) -> TorqueCtrl {
    ctrl(
        params,
        FeedforwardModel::NeuralFeedforward {
            nn,
            analytic: Box::new(LinearTorqueModel)
        },
        tuning_store
    )
}

/// Parameters using the yaw rate for the measured curvature, which leaves
/// the jerk terms enabled.
fn yaw_rate_params() -> Params {
    let mut params = e2e_params();
    params.tuning.use_steering_angle = false;
    params
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[test]
fn test_end_to_end_feedforward() {
    let mut tc = linear_ctrl(e2e_params());

    let out = tc.proc(&input(20.0, 0.001, true));
    let diag = &out.diagnostics;

    assert!(diag.active);
    assert!((diag.desired_lateral_accel - 0.4).abs() < 1e-12);
    assert_eq!(diag.actual_lateral_accel, 0.0);

    // accel / factor + friction, the error being positive
    assert!((diag.f - 0.45).abs() < 1e-12);

    // Error torque 0.4, one step of integration, plus the feedforward
    assert!((diag.error - 0.4).abs() < 1e-12);
    assert!((diag.p - 0.4).abs() < 1e-12);
    assert!((diag.i - 0.0004).abs() < 1e-12);
    assert!((out.torque + 0.8504).abs() < 1e-9);
    assert_eq!(diag.output, out.torque);
}

#[test]
fn test_output_bounded() {
    let mut params = e2e_params();
    params.steer_max = 0.7;
    let mut tc = linear_ctrl(params);

    let plan = constant_plan(1.0);

    for &speed in [0.0, 0.3, 2.0, 4.0, 9.0, 15.0, 25.0, 40.0].iter() {
        for &curvature in [-0.5, -0.01, 0.0, 0.002, 0.1, 3.0].iter() {
            let mut inp = input(speed, curvature, true);
            inp.vehicle.steering_angle_deg = -curvature * 20.0;
            inp.vehicle.steering_rate_deg_s = 50.0;
            inp.trajectory = Some(&plan);

            for _ in 0..20 {
                let out = tc.proc(&inp);
                assert!(out.torque.is_finite());
                assert!(out.torque.abs() <= 0.7);
            }
        }
    }
}

#[test]
fn test_saturation_flag() {
    let mut tc = linear_ctrl(e2e_params());

    let out = tc.proc(&input(20.0, 0.01, true));
    assert_eq!(out.torque, -1.0);
    assert!(out.diagnostics.saturated);
    assert!(!out.diagnostics.saturation_timeout);

    let out = tc.proc(&input(20.0, 0.0001, true));
    assert!(!out.diagnostics.saturated);
}

#[test]
fn test_inactive() {
    let mut tc = linear_ctrl(e2e_params());

    for _ in 0..10 {
        tc.proc(&input(20.0, 0.001, true));
    }
    let i = tc.pid().i();
    assert!(i > 0.0);

    let first = tc.proc(&input(20.0, 0.001, false));
    let second = tc.proc(&input(20.0, 0.001, false));

    assert_eq!(first.torque, 0.0);
    assert!(!first.diagnostics.active);
    assert_eq!(tc.pid().i(), i);

    // Identical apart from the cycle count
    assert_eq!(second.diagnostics.tick, first.diagnostics.tick + 1);
    let mut second = second;
    second.diagnostics.tick = first.diagnostics.tick;
    assert_eq!(first, second);
}

#[test]
fn test_integrator_freeze() {
    let mut tc = linear_ctrl(e2e_params());

    for _ in 0..10 {
        tc.proc(&input(20.0, 0.001, true));
    }
    let i = tc.pid().i();

    // Driver steering
    let mut inp = input(20.0, 0.001, true);
    inp.vehicle.steering_pressed = true;
    for _ in 0..10 {
        tc.proc(&inp);
        assert_eq!(tc.pid().i(), i);
    }

    // Actuator limited
    let mut inp = input(20.0, 0.001, true);
    inp.steer_limited = true;
    for _ in 0..10 {
        tc.proc(&inp);
        assert_eq!(tc.pid().i(), i);
    }

    // Stationary
    for _ in 0..10 {
        tc.proc(&input(0.4, 0.001, true));
        assert_eq!(tc.pid().i(), i);
    }

    // Released
    tc.proc(&input(20.0, 0.001, true));
    assert!(tc.pid().i() > i);
}

#[test]
fn test_model_fault_holds_output() {
    let mut tc = ctrl(
        e2e_params(),
        FeedforwardModel::AnalyticLinear(Box::new(FailsAboveTen)),
        Box::new(StaticTuning)
    );

    let good = tc.proc(&input(20.0, 0.001, true));
    let i = tc.pid().i();
    assert!(!good.diagnostics.model_fault);

    // 0.1 * 400 = 40 m/s^2, out of the model's range
    let bad = tc.proc(&input(20.0, 0.1, true));
    assert!(bad.diagnostics.active);
    assert!(bad.diagnostics.model_fault);
    assert_eq!(bad.torque, good.torque);
    assert_eq!(bad.diagnostics.output, good.torque);
    assert_eq!(tc.pid().i(), i);

    // Nothing was fed to the PID this cycle
    assert!(good.diagnostics.error > 0.0);
    assert_eq!(bad.diagnostics.error, 0.0);
    assert_eq!(bad.diagnostics.friction_input, 0.0);
    assert!(!bad.diagnostics.saturation_timeout);

    // Non-finite inputs are also held
    let bad = tc.proc(&input(20.0, std::f64::NAN, true));
    assert!(bad.diagnostics.model_fault);
    assert_eq!(bad.torque, good.torque);
}

#[test]
fn test_tuning_refresh() {
    let mut store = MemStore::new();
    store.set(KEY_TORQUED_OVERRIDE, "1");
    store.set(KEY_TORQUE_MAX_LAT_ACCEL, "300");
    store.set(KEY_TORQUE_FRICTION, "10");

    let mut tc = ctrl(
        Params::default(),
        FeedforwardModel::AnalyticLinear(Box::new(LinearTorqueModel)),
        Box::new(KeyValueTuningStore::new(store))
    );

    for tick in 1..TUNING_REFRESH_PERIOD {
        // Refresh happens on inactive cycles too
        tc.proc(&input(20.0, 0.001, tick % 2 == 0));
    }
    assert_eq!(tc.tuning().lat_accel_factor, 2.5);

    let out = tc.proc(&input(20.0, 0.001, false));
    assert!(tc.tuning().override_enabled);
    assert!((tc.tuning().lat_accel_factor - 3.0).abs() < 1e-12);
    assert!((tc.tuning().friction - 0.1).abs() < 1e-12);
    assert!((out.diagnostics.lat_accel_factor - 3.0).abs() < 1e-12);
}

#[test]
fn test_live_torque_params() {
    let mut tc = linear_ctrl(Params::default());

    tc.update_live_torque_params(1.8, 0.05, 0.12).unwrap();
    assert_eq!(tc.tuning().lat_accel_factor, 1.8);
    assert_eq!(tc.tuning().lat_accel_offset, 0.05);
    assert_eq!(tc.tuning().friction, 0.12);

    assert!(tc.update_live_torque_params(0.0, 0.0, 0.1).is_err());
    assert_eq!(tc.tuning().lat_accel_factor, 1.8);
}

#[test]
fn test_neural_path() {
    let mut tc = ctrl(
        e2e_params(),
        FeedforwardModel::NeuralFeedforward {
            nn: Box::new(AccelNn { size: NN_INPUT_SIZE }),
            analytic: Box::new(LinearTorqueModel)
        },
        Box::new(StaticTuning)
    );

    let plan = constant_plan(0.4);
    let mut inp = input(20.0, 0.001, true);
    inp.trajectory = Some(&plan);

    let out = tc.proc(&inp);
    let diag = &out.diagnostics;
    assert!(diag.used_nn);
    assert_eq!(diag.nn_log.as_ref().map(|l| l.len()), Some(3 * NN_INPUT_SIZE));

    // The stub returns the acceleration input: setpoint minus measurement,
    // and the desired acceleration as feedforward
    assert!((diag.error - 0.4).abs() < 1e-12);
    assert!((diag.f - 0.4).abs() < 1e-12);

    // Without a plan the analytic model takes over
    let out = tc.proc(&input(20.0, 0.001, true));
    assert!(!out.diagnostics.used_nn);
    assert!(out.diagnostics.nn_log.is_none());
    assert!((out.diagnostics.f - 0.45).abs() < 1e-12);
}

#[test]
fn test_lateral_jerk_friction() {
    let mut params = yaw_rate_params();
    params.use_lateral_jerk = true;
    let mut tc = linear_ctrl(params);

    // A steady 0.5 m/s^3 ramp persists over the lookahead window
    let ramp = plan(|t| 0.4 + 0.5 * t);
    let mut inp = input(20.0, 0.001, true);
    inp.trajectory = Some(&ramp);

    let out = tc.proc(&inp);
    let diag = &out.diagnostics;
    assert!((diag.desired_lateral_jerk - 0.5).abs() < 1e-9);
    assert!((diag.lookahead_lateral_jerk - 0.5).abs() < 1e-9);

    // 0.7 * 0.4 m/s^2 error + 0.4 * 0.5 m/s^3 lookahead
    assert!((diag.friction_input - 0.48).abs() < 1e-9);

    // The setpoint torque carries friction for 0.4 * 0.5 of jerk
    assert!((diag.error - (0.4 + 0.05 * 0.2 / 0.3)).abs() < 1e-9);

    // With a flat plan the jerk terms vanish and the full error is used
    let flat = constant_plan(0.4);
    inp.trajectory = Some(&flat);

    let out = tc.proc(&inp);
    let diag = &out.diagnostics;
    assert_eq!(diag.lookahead_lateral_jerk, 0.0);
    assert!((diag.friction_input - 0.4).abs() < 1e-9);
    assert!((diag.error - 0.4).abs() < 1e-9);

    // Without the flag the plan is not consulted
    let mut tc = linear_ctrl(yaw_rate_params());
    inp.trajectory = Some(&ramp);

    let out = tc.proc(&inp);
    assert_eq!(out.diagnostics.lookahead_lateral_jerk, 0.0);
    assert!((out.diagnostics.friction_input - 0.4).abs() < 1e-9);
    assert!((out.diagnostics.error - 0.4).abs() < 1e-9);
}

#[test]
fn test_neural_friction_override() {
    let flat = constant_plan(0.4);
    let mut inp = input(20.0, 0.001, true);
    inp.trajectory = Some(&flat);

    // The model asks for the analytic friction, saturated at 0.05 for a
    // 0.4 m/s^2 error
    let mut tc = neural_ctrl(e2e_params(), Box::new(WeakFrictionNn), Box::new(StaticTuning));

    let out = tc.proc(&inp);
    assert!(out.diagnostics.used_nn);
    assert!((out.diagnostics.friction_input - 0.4).abs() < 1e-9);
    assert!((out.diagnostics.error - 0.45).abs() < 1e-9);

    // The override key enables it for any model once the tuning refreshes
    let mut store = MemStore::new();
    store.set(KEY_TORQUED_OVERRIDE, "1");
    store.set(KEY_TORQUE_MAX_LAT_ACCEL, "100");
    store.set(KEY_TORQUE_FRICTION, "5");

    let mut tc = neural_ctrl(
        e2e_params(),
        Box::new(AccelNn { size: NN_INPUT_SIZE }),
        Box::new(KeyValueTuningStore::new(store))
    );

    for _ in 1..TUNING_REFRESH_PERIOD {
        let out = tc.proc(&inp);
        assert!((out.diagnostics.error - 0.4).abs() < 1e-9);
    }

    let out = tc.proc(&inp);
    assert!(tc.tuning().override_enabled);
    assert!((out.diagnostics.error - 0.45).abs() < 1e-9);
}

#[test]
fn test_delay_estimate_sets_jerk_time() {
    let mut params = yaw_rate_params();
    params.use_lateral_jerk = true;
    params.enable_dsad = true;
    params.steer_actuator_delay_s = 0.2;
    let mut tc = linear_ctrl(params);

    let curve = plan(|t| 0.4 + 0.5 * t * t);
    let mut inp = input(20.0, 0.001, true);
    inp.trajectory = Some(&curve);

    let expected_jerk = |jerk_time: f64, desired: f64| {
        (interp(jerk_time, &curve.t_s, &curve.lat_accel_mss) - desired) / jerk_time
    };

    // Static delay plus the jerk margin
    let out = tc.proc(&inp);
    let desired = out.diagnostics.desired_lateral_accel;
    assert!((out.diagnostics.desired_lateral_jerk - expected_jerk(0.5, desired)).abs() < 1e-9);

    // The first feedback updates the estimate after this cycle's lookahead
    inp.actuator = Some(ActuatorFeedback { steer_torque: 0.0 });
    let out = tc.proc(&inp);
    assert_eq!(out.diagnostics.actuator_delay_s, 0.5);
    assert!((out.diagnostics.desired_lateral_jerk - expected_jerk(0.5, desired)).abs() < 1e-9);

    // The next cycle looks 0.5 + 0.3 s ahead
    inp.actuator = None;
    let out = tc.proc(&inp);
    assert!((out.diagnostics.desired_lateral_jerk - expected_jerk(0.8, desired)).abs() < 1e-9);
    assert!((expected_jerk(0.8, desired) - expected_jerk(0.5, desired)).abs() > 0.1);
}

#[test]
fn test_delay_estimate_sets_neural_future_times() {
    let mut params = e2e_params();
    params.enable_dsad = true;
    params.steer_actuator_delay_s = 0.2;
    let mut tc = neural_ctrl(
        params,
        Box::new(AccelNn { size: NN_INPUT_SIZE }),
        Box::new(StaticTuning)
    );

    let curve = plan(|t| 0.4 + 0.5 * t * t);
    let mut inp = input(20.0, 0.001, true);
    inp.trajectory = Some(&curve);

    // First planned acceleration in the feedforward vector, sampled 0.3 s
    // past the delay plus a 0.2 s margin
    let planned = |t: f64| interp(t, &curve.t_s[..CONTROL_N], &curve.lat_accel_mss);
    let first_planned = |out: &OutputData| out.diagnostics.nn_log.as_ref().map(|l| l[7]);

    let out = tc.proc(&inp);
    assert!((first_planned(&out).unwrap() - planned(0.7)).abs() < 1e-9);

    inp.actuator = Some(ActuatorFeedback { steer_torque: 0.0 });
    let out = tc.proc(&inp);
    assert_eq!(tc.actuator_delay_s(), 0.5);
    assert!((first_planned(&out).unwrap() - planned(0.7)).abs() < 1e-9);

    inp.actuator = None;
    let out = tc.proc(&inp);
    assert!((first_planned(&out).unwrap() - planned(1.0)).abs() < 1e-9);
}

#[test]
fn test_neural_input_size_checked() {
    let result = TorqueCtrl::new(
        Params::default(),
        Capabilities {
            curvature_model: Box::new(UnitModel),
            torque_model: FeedforwardModel::NeuralFeedforward {
                nn: Box::new(AccelNn { size: 12 }),
                analytic: Box::new(LinearTorqueModel)
            },
            low_speed_factor: Box::new(NoLowSpeedFactor),
            tuning_store: Box::new(StaticTuning)
        }
    );

    match result {
        Err(TorqueCtrlError::ModelInputSize { expected, found }) => {
            assert_eq!(expected, NN_INPUT_SIZE);
            assert_eq!(found, 12);
        },
        r => panic!("Expected an input size error, got {:?}", r.map(|_| ()))
    }
}

#[test]
fn test_dynamic_delay() {
    let mut params = e2e_params();
    params.enable_dsad = true;
    params.steer_actuator_delay_s = 0.2;
    let mut tc = linear_ctrl(params);

    // No feedback yet, the static delay is used
    tc.proc(&input(20.0, 0.001, true));
    assert_eq!(tc.actuator_delay_s(), 0.2);

    // A realised torque of zero is the low torque case
    let mut inp = input(20.0, 0.001, true);
    inp.actuator = Some(ActuatorFeedback { steer_torque: 0.0 });
    let out = tc.proc(&inp);
    assert_eq!(tc.actuator_delay_s(), 0.5);
    assert_eq!(out.diagnostics.actuator_delay_s, 0.5);

    // Realised torque tracking the demand shortens the delay
    for _ in 0..500 {
        inp.actuator = Some(ActuatorFeedback { steer_torque: tc.report().output });
        tc.proc(&inp);
    }
    assert!(tc.actuator_delay_s() < 0.2);
}

#[test]
fn test_reset() {
    let mut tc = linear_ctrl(e2e_params());

    for _ in 0..10 {
        tc.proc(&input(20.0, 0.001, true));
    }
    assert!(tc.pid().i() > 0.0);

    tc.reset();
    assert_eq!(tc.pid().i(), 0.0);
    assert_eq!(tc.tick(), 10);
}

#[test]
fn test_init_from_params_file() {
    std::env::set_var(
        util::host::SW_ROOT_ENV_VAR,
        concat!(env!("CARGO_MANIFEST_DIR"), "/..")
    );

    let mut tc = TorqueCtrl::init(
        "torque_ctrl.toml",
        Capabilities {
            curvature_model: Box::new(UnitModel),
            torque_model: FeedforwardModel::AnalyticLinear(Box::new(LinearTorqueModel)),
            low_speed_factor: Box::new(NoLowSpeedFactor),
            tuning_store: Box::new(StaticTuning)
        }
    ).unwrap();

    assert_eq!(tc.params().steer_max, tc.pid().limit());
    assert_eq!(tc.params().dt_s(), 0.01);

    let out = tc.proc(&input(20.0, 0.001, true));
    assert_eq!(out.torque, -tc.pid().control());

    match TorqueCtrl::init("no_such_file.toml", Capabilities {
        curvature_model: Box::new(UnitModel),
        torque_model: FeedforwardModel::AnalyticLinear(Box::new(LinearTorqueModel)),
        low_speed_factor: Box::new(NoLowSpeedFactor),
        tuning_store: Box::new(StaticTuning)
    }) {
        Err(TorqueCtrlError::ParamLoadError(_)) => (),
        r => panic!("Expected a load error, got {:?}", r.map(|_| ()))
    }
}

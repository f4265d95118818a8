//! Torque control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};
use util::{
    params,
    archive::{ArchiveError, Archived, Archiver},
    session::Session
};
use vehicle_if::{
    traj::Trajectory,
    vehicle::{ActuatorFeedback, DesiredMotion, RoadGeometry, VehicleState}
};

// Internal
use super::*;
use super::features::{FeatureInputs, NN_INPUT_SIZE, NN_TIME_OFFSET_MARGIN_S};
use super::lookahead::{self, JerkEstimate};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The external collaborators of the controller, injected at construction.
pub struct Capabilities {
    /// Maps steering angle to path curvature.
    pub curvature_model: Box<dyn CurvatureModel>,

    /// Maps lateral acceleration to torque.
    pub torque_model: FeedforwardModel,

    /// The vehicle's low speed factor law.
    pub low_speed_factor: Box<dyn LowSpeedFactor>,

    /// Source of runtime tuning overrides.
    pub tuning_store: Box<dyn TuningStore>
}

/// Torque control module state
pub struct TorqueCtrl {
    params: Params,

    /// Tuning in use, assembled once at the start of each cycle.
    tuning: TuningParams,

    curvature_model: Box<dyn CurvatureModel>,
    torque_model: FeedforwardModel,
    low_speed_law: Box<dyn LowSpeedFactor>,
    tuning_store: Box<dyn TuningStore>,

    pid: PidController,
    low_speed: LowSpeedScheduler,
    dsad: DelayEstimator,
    nn_ctx: NnContext,
    saturation: SaturationMonitor,

    /// Number of cycles processed.
    tick: u64,

    /// Torque returned on the previous cycle, in the actuator's convention.
    output: f64,

    report: Diagnostics,
    arch_report: Archiver
}

/// Input data for one cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputData<'a> {
    /// True if the controller is engaged.
    pub active: bool,

    pub vehicle: VehicleState,

    pub road: RoadGeometry,

    pub desired: DesiredMotion,

    /// Planned trajectory, `None` if the planner has not provided one.
    pub trajectory: Option<&'a Trajectory>,

    /// Realised actuator torque, `None` if no feedback is available.
    pub actuator: Option<ActuatorFeedback>,

    /// True if the actuator is rate or magnitude limited by the host.
    pub steer_limited: bool
}

/// Output of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputData {
    /// Torque demand, normalised to the actuator's maximum, positive to the
    /// left.
    pub torque: f64,

    pub diagnostics: Diagnostics
}

/// The torque error and feedforward computed by the torque model.
struct ModelTorques {
    error: f64,
    feedforward: f64,
    friction_input: f64,
    nn_log: Option<Vec<f64>>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TorqueCtrl {
    /// Initialise the controller from a parameter file relative to the
    /// software root's `params` directory.
    pub fn init(params_path: &str, caps: Capabilities) -> Result<Self, TorqueCtrlError> {
        let params: Params = params::load(params_path)
            .map_err(TorqueCtrlError::ParamLoadError)?;

        Self::new(params, caps)
    }

    /// Create a new controller.
    pub fn new(params: Params, caps: Capabilities) -> Result<Self, TorqueCtrlError> {
        params.validate()?;

        if let Some(nn) = caps.torque_model.neural() {
            if nn.input_size() != NN_INPUT_SIZE {
                return Err(TorqueCtrlError::ModelInputSize {
                    expected: NN_INPUT_SIZE,
                    found: nn.input_size()
                })
            }
        }

        let dt_s = params.dt_s();

        Ok(Self {
            tuning: params.tuning,
            pid: PidController::new(
                params.k_p.clone(),
                params.k_i.clone(),
                params.k_d.clone(),
                params.k_f.clone(),
                params.steer_max,
                dt_s
            ),
            low_speed: LowSpeedScheduler::new(),
            dsad: DelayEstimator::new(params.enable_dsad, params.steer_actuator_delay_s, dt_s),
            nn_ctx: NnContext::new(dt_s),
            saturation: SaturationMonitor::new(params.steer_limit_timer_s, dt_s),
            curvature_model: caps.curvature_model,
            torque_model: caps.torque_model,
            low_speed_law: caps.low_speed_factor,
            tuning_store: caps.tuning_store,
            tick: 0,
            output: 0.0,
            report: Diagnostics::default(),
            arch_report: Archiver::default(),
            params
        })
    }

    /// Start archiving the diagnostics into the session's archive directory.
    pub fn init_archive(&mut self, session: &Session) -> Result<(), ArchiveError> {
        self.arch_report = Archiver::from_path(session, "torque_ctrl/diagnostics.csv")?;
        Ok(())
    }

    /// Process one control cycle.
    ///
    /// Processing never fails. The returned torque is always finite and
    /// within `[-steer_max, steer_max]`, and a diagnostics record is produced
    /// whether or not the controller is active.
    pub fn proc(&mut self, input: &InputData) -> OutputData {
        self.tick += 1;

        if let Some(tuning) = self.tuning_store.refresh(self.tick, &self.tuning) {
            self.tuning = tuning;
        }

        self.report = Diagnostics {
            tick: self.tick,
            lat_accel_factor: self.tuning.lat_accel_factor,
            lat_accel_offset: self.tuning.lat_accel_offset,
            friction: self.tuning.friction,
            actuator_delay_s: self.dsad.delay_s(),
            low_speed_factor: self.low_speed.last_factor(),
            ..Default::default()
        };

        if input.active {
            self.proc_active(input);
        }
        else {
            self.output = 0.0;
        }

        trace!(
            "TorqueCtrl {}: active {}, torque {:.4}, error {:.4}, ff {:.4}",
            self.tick,
            self.report.active,
            self.output,
            self.report.error,
            self.report.f
        );

        OutputData {
            torque: self.output,
            diagnostics: self.report.clone()
        }
    }

    /// Overwrite the torque model parameters from a live estimate.
    pub fn update_live_torque_params(
        &mut self,
        lat_accel_factor: f64,
        lat_accel_offset: f64,
        friction: f64
    ) -> Result<(), TorqueCtrlError> {
        if !(lat_accel_factor > 0.0) || !lat_accel_offset.is_finite() || !friction.is_finite() {
            return Err(TorqueCtrlError::InvalidParam(format!(
                "live torque parameters must be finite with a positive factor, found \
                factor {}, offset {}, friction {}",
                lat_accel_factor, lat_accel_offset, friction
            )))
        }

        self.tuning.lat_accel_factor = lat_accel_factor;
        self.tuning.lat_accel_offset = lat_accel_offset;
        self.tuning.friction = friction;

        Ok(())
    }

    /// Clear the integrator, derivative and history memory.
    ///
    /// The actuator delay estimate and tuning are kept.
    pub fn reset(&mut self) {
        self.pid.reset();
        self.low_speed.reset();
        self.nn_ctx.reset();
        self.saturation.reset();
        self.output = 0.0;
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn tuning(&self) -> &TuningParams {
        &self.tuning
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Actuator delay used by the next cycle.
    ///
    /// Units: seconds
    pub fn actuator_delay_s(&self) -> f64 {
        self.dsad.delay_s()
    }

    /// Diagnostics from the most recent cycle.
    pub fn report(&self) -> &Diagnostics {
        &self.report
    }
}

impl TorqueCtrl {
    /// Run the full pipeline, filling in the report and output.
    fn proc_active(&mut self, input: &InputData) {
        let vehicle = &input.vehicle;
        let speed_ms = vehicle.speed_ms;
        let actuator_delay_s = self.dsad.delay_s();

        let freeze_integrator = input.steer_limited
            || vehicle.steering_pressed
            || speed_ms < FREEZE_INTEGRATOR_SPEED_MS;

        self.report.active = true;

        // ---- SIGNALS ----

        let sig = build_signals(
            vehicle,
            &input.road,
            &input.desired,
            &self.tuning,
            self.curvature_model.as_ref()
        );

        self.report.actual_lateral_accel = sig.actual_lateral_accel;
        self.report.desired_lateral_accel = sig.desired_lateral_accel;

        // ---- LOW SPEED FACTOR ----

        let use_nn = self.torque_model.neural().is_some();
        let suppress = use_nn
            || self.params.use_lateral_jerk
            || !self.torque_model.analytic().is_linear();

        let low_speed_factor = self.low_speed.update(
            self.low_speed_law.as_ref(),
            &self.tuning,
            LowSpeedInputs {
                previous_factor: 0.0,
                desired_lateral_accel: sig.desired_lateral_accel,
                actual_lateral_accel: sig.actual_lateral_accel,
                speed_ms,
                actual_lateral_jerk: sig.actual_lateral_jerk,
                suppress,
                freeze_integrator
            }
        );
        self.report.low_speed_factor = low_speed_factor;

        let setpoint = sig.desired_lateral_accel + low_speed_factor * input.desired.curvature_m;
        let measurement = sig.actual_lateral_accel + low_speed_factor * sig.actual_curvature;

        // ---- LOOKAHEAD ----

        let trajectory = input.trajectory.filter(|t| t.is_good());

        let jerk = match trajectory {
            Some(traj) if use_nn || self.params.use_lateral_jerk => lookahead::estimate(
                traj,
                speed_ms,
                sig.desired_lateral_accel,
                sig.actual_lateral_jerk,
                actuator_delay_s,
                self.tuning.use_steering_angle,
                self.params.lat_jerk_friction_factor,
                self.params.lat_accel_friction_factor
            ),
            _ => JerkEstimate::none(self.params.lat_accel_friction_factor)
        };
        self.report.desired_lateral_jerk = jerk.desired_lateral_jerk;
        self.report.lookahead_lateral_jerk = jerk.lookahead_lateral_jerk;

        // ---- TORQUE MODEL ----

        let model_result = match trajectory {
            Some(traj) if use_nn => {
                self.report.used_nn = true;
                self.neural_torques(
                    input, &sig, &jerk, setpoint, measurement, actuator_delay_s, traj
                )
            },
            _ => self.analytic_torques(input, &sig, &jerk, setpoint, measurement)
        };

        let torques = match model_result {
            Ok(t) if t.error.is_finite() && t.feedforward.is_finite() => t,
            Ok(t) => {
                warn!(
                    "Torque model gave a non-finite error ({}) or feedforward ({}), \
                    holding the previous output",
                    t.error, t.feedforward
                );
                self.hold_output();
                return
            },
            Err(e) => {
                warn!("Torque model evaluation failed, holding the previous output: {}", e);
                self.hold_output();
                return
            }
        };

        // ---- PID ----

        let output_torque = self.pid.update(
            torques.error,
            torques.feedforward,
            speed_ms,
            freeze_integrator
        );

        // ---- DELAY ESTIMATE ----

        self.report.actuator_delay_s = self.dsad.update(
            input.actuator.map(|a| a.steer_torque),
            output_torque,
            self.tick
        );

        // ---- REPORT ----

        let saturated = is_saturated(output_torque, self.params.steer_max);

        self.output = -output_torque;

        self.report.p = self.pid.p();
        self.report.i = self.pid.i();
        self.report.d = self.pid.d();
        self.report.f = self.pid.f();
        self.report.error = torques.error;
        self.report.friction_input = torques.friction_input;
        self.report.output = self.output;
        self.report.saturated = saturated;
        self.report.saturation_timeout = self.saturation.update(
            saturated,
            speed_ms,
            input.steer_limited,
            vehicle.steering_pressed
        );
        self.report.nn_log = torques.nn_log;
    }

    /// Torques from the neural model with its feature context.
    fn neural_torques(
        &mut self,
        input: &InputData,
        sig: &LateralSignals,
        jerk: &JerkEstimate,
        setpoint: f64,
        measurement: f64,
        actuator_delay_s: f64,
        traj: &Trajectory
    ) -> Result<ModelTorques, ModelError> {
        let nn = match self.torque_model.neural() {
            Some(nn) => nn,
            None => return self.analytic_torques(input, sig, jerk, setpoint, measurement)
        };
        let speed_ms = input.vehicle.speed_ms;

        let friction_input = (
            jerk.lat_accel_friction_factor * (setpoint - measurement)
            + self.params.lat_jerk_friction_factor * jerk.lookahead_lateral_jerk
        ) * nn.friction_factor();

        let features = self.nn_ctx.assemble(
            &FeatureInputs {
                speed_ms,
                long_accel_mss: input.vehicle.long_accel_mss,
                setpoint,
                measurement,
                jerk_setpoint: jerk.jerk_setpoint,
                jerk_measurement: jerk.jerk_measurement,
                desired_lateral_accel: sig.desired_lateral_accel,
                friction_input,
                roll_rad: input.road.roll_rad,
                pitch_rad: input.road.pitch_rad,
                time_offset_s: actuator_delay_s + NN_TIME_OFFSET_MARGIN_S
            },
            traj
        );

        let mut error = nn.evaluate(&features.setpoint)? - nn.evaluate(&features.measurement)?;
        let feedforward = nn.evaluate(&features.feedforward)?;

        // Models with a weak learned friction response get the analytic
        // friction on top
        if nn.friction_override() || self.tuning.override_enabled {
            error += self.torque_model.analytic().torque_from_lateral_accel(
                &LatControlInputs {
                    lateral_acceleration: 0.0,
                    roll_compensation: 0.0,
                    speed_ms,
                    long_accel_mss: input.vehicle.long_accel_mss
                },
                &self.tuning,
                friction_input,
                sig.lateral_accel_deadzone,
                true,
                false
            )?;
        }

        Ok(ModelTorques {
            error,
            feedforward,
            friction_input,
            nn_log: Some(features.to_log())
        })
    }

    /// Torques from the analytic model, also the fallback when there is no
    /// usable trajectory.
    fn analytic_torques(
        &self,
        input: &InputData,
        sig: &LateralSignals,
        jerk: &JerkEstimate,
        setpoint: f64,
        measurement: f64
    ) -> Result<ModelTorques, ModelError> {
        let model = self.torque_model.analytic();
        let speed_ms = input.vehicle.speed_ms;
        let long_accel_mss = input.vehicle.long_accel_mss;
        let roll_compensation = sig.roll_compensation;

        let torque_from_setpoint = model.torque_from_lateral_accel(
            &LatControlInputs {
                lateral_acceleration: setpoint,
                roll_compensation,
                speed_ms,
                long_accel_mss
            },
            &self.tuning,
            jerk.jerk_setpoint,
            sig.lateral_accel_deadzone,
            self.params.use_lateral_jerk,
            false
        )?;
        let torque_from_measurement = model.torque_from_lateral_accel(
            &LatControlInputs {
                lateral_acceleration: measurement,
                roll_compensation,
                speed_ms,
                long_accel_mss
            },
            &self.tuning,
            jerk.jerk_measurement,
            sig.lateral_accel_deadzone,
            self.params.use_lateral_jerk,
            false
        )?;

        let lat_accel_error = sig.desired_lateral_accel - sig.actual_lateral_accel;
        let friction_input = if self.params.use_lateral_jerk {
            jerk.lat_accel_friction_factor * lat_accel_error
                + self.params.lat_jerk_friction_factor * jerk.lookahead_lateral_jerk
        }
        else {
            lat_accel_error
        };

        let feedforward = model.torque_from_lateral_accel(
            &LatControlInputs {
                lateral_acceleration: sig.desired_lateral_accel - roll_compensation,
                roll_compensation,
                speed_ms,
                long_accel_mss
            },
            &self.tuning,
            friction_input,
            sig.lateral_accel_deadzone,
            true,
            true
        )?;

        Ok(ModelTorques {
            error: torque_from_setpoint - torque_from_measurement,
            feedforward,
            friction_input,
            nn_log: None
        })
    }

    /// Keep the previous output after a torque model fault.
    ///
    /// Neither the PID controller nor the saturation timer is advanced. The
    /// report's error and friction input are zero for the cycle.
    fn hold_output(&mut self) {
        self.report.model_fault = true;
        self.report.error = 0.0;
        self.report.friction_input = 0.0;
        self.report.output = self.output;
        self.report.p = self.pid.p();
        self.report.i = self.pid.i();
        self.report.d = self.pid.d();
        self.report.f = self.pid.f();
        self.report.saturated = is_saturated(self.output, self.params.steer_max);
    }
}

impl Archived for TorqueCtrl {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(&self.report)
    }
}

impl std::fmt::Debug for TorqueCtrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorqueCtrl")
            .field("params", &self.params)
            .field("tuning", &self.tuning)
            .field("torque_model", &self.torque_model)
            .field("tick", &self.tick)
            .field("output", &self.output)
            .finish()
    }
}

//! Steering torque control executable entry point.
//!
//! # Architecture
//!
//! The executable hosts the torque controller in a fixed rate closed loop
//! against a simulated steering plant:
//!
//!     - Initialise the session, logging and the controller
//!     - Main loop:
//!         - Desired curvature and plan from the scripted profile
//!         - Vehicle state sensing from the plant
//!         - Torque control processing
//!         - Plant update with the torque demand
//!         - Archive writing

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod sim;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::WrapErr};
use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

// Internal
use sim::{SimParams, SteerPlant};
use steer_lib::torque_ctrl::{
    Capabilities, DirStore, FeedforwardModel, InputData, KeyValueTuningStore,
    LinearTorqueModel, MlpTorqueModel, Params, StaticTuning, TableLowSpeedFactor,
    TorqueCtrl, TorqueCtrlError, TuningStore
};
use util::{
    archive::Archived,
    logger::{logger_init, LevelFilter},
    session::Session
};
use vehicle_if::vehicle::{DesiredMotion, RoadGeometry};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    let session = Session::new(
        "steer_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Info, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Steering Torque Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let sim_params: SimParams = util::params::load("sim.toml")
        .wrap_err("Could not load sim params")?;
    let ctrl_params: Params = util::params::load("torque_ctrl.toml")
        .wrap_err("Could not load torque control params")?;

    info!("Exec parameters loaded");

    if let Err(e) = session.snapshot_params(&["sim.toml", "torque_ctrl.toml"]) {
        warn!("Parameters not copied into the session: {}", e);
    }

    // ---- INITIALISE CONTROLLER ----

    let torque_model = match sim_params.nn_model_path {
        Some(ref path) => {
            let nn = MlpTorqueModel::load(path)
                .map_err(TorqueCtrlError::ModelLoadError)
                .wrap_err_with(|| format!("Failed to load the neural model from {}", path))?;
            info!("Neural torque model loaded from {}", path);

            FeedforwardModel::NeuralFeedforward {
                nn: Box::new(nn),
                analytic: Box::new(LinearTorqueModel)
            }
        },
        None => FeedforwardModel::AnalyticLinear(Box::new(LinearTorqueModel))
    };

    let tuning_store: Box<dyn TuningStore> = match sim_params.tuning_store_dir {
        Some(ref dir) => {
            info!("Tuning overrides read from {}", dir);
            Box::new(KeyValueTuningStore::new(DirStore::new(dir)))
        },
        None => Box::new(StaticTuning)
    };

    let rate_hz = ctrl_params.rate_hz;
    let dt_s = ctrl_params.dt_s();

    let mut torque_ctrl = TorqueCtrl::new(
        ctrl_params,
        Capabilities {
            curvature_model: Box::new(sim_params.vehicle),
            torque_model,
            low_speed_factor: Box::new(TableLowSpeedFactor::default()),
            tuning_store
        }
    ).wrap_err("Failed to initialise TorqueCtrl")?;

    torque_ctrl.init_archive(&session)
        .wrap_err("Failed to initialise the TorqueCtrl archive")?;

    info!("TorqueCtrl init complete: {:?}\n", torque_ctrl);

    let mut plant = SteerPlant::new(&sim_params, dt_s);
    let mut actuator = None;

    let num_cycles = (sim_params.duration_s * rate_hz).round() as u64;
    let log_period = rate_hz.round().max(1.0) as u64;

    // ---- MAIN LOOP ----

    info!("Begining main loop of {} cycles\n", num_cycles);

    for cycle in 0..num_cycles {

        let cycle_start_instant = Instant::now();
        let sim_time_s = cycle as f64 * dt_s;

        // ---- DATA INPUT ----

        let traj = sim_params.planned_trajectory(sim_time_s);

        let input = InputData {
            active: sim_time_s >= sim_params.engage_s,
            vehicle: plant.vehicle_state(),
            road: RoadGeometry {
                roll_rad: sim_params.roll_rad,
                pitch_rad: Some(0.0),
                angle_offset_deg: 0.0
            },
            desired: DesiredMotion {
                curvature_m: sim_params.curvature_at(sim_time_s),
                curvature_rate_m_s: None
            },
            trajectory: Some(&traj),
            actuator,
            steer_limited: false
        };

        // ---- CONTROL ALGORITHM PROCESSING ----

        let output = torque_ctrl.proc(&input);

        actuator = Some(plant.step(output.torque));

        if cycle % log_period == 0 {
            info!(
                "t = {:.2} s: desired {:.3} m/s^2, actual {:.3} m/s^2, torque {:.3}, delay {:.3} s",
                sim_time_s,
                output.diagnostics.desired_lateral_accel,
                plant.lat_accel_mss(),
                output.torque,
                output.diagnostics.actuator_delay_s
            );
        }

        // ---- WRITE ARCHIVES ----

        if let Err(e) = torque_ctrl.write() {
            warn!("Could not write the TorqueCtrl archive: {}", e);
        }

        // ---- CYCLE MANAGEMENT ----

        if !sim_params.realtime {
            continue
        }

        let cycle_dur = Instant::now() - cycle_start_instant;

        match Duration::from_secs_f64(dt_s).checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - dt_s
            )
        }
    }

    // ---- SHUTDOWN ----

    info!("End of execution");

    Ok(())
}

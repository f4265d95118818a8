//! # Sessions
//!
//! Each execution gets its own session directory under the software root:
//!
//! ```text
//! sessions/
//!     steer_exec_20260101_120000/
//!         steer_exec.log
//!         arch/           csv archives
//!         params/         snapshot of the parameter files used
//! ```
//!
//! Creating a session also sets the process-wide epoch that log timestamps
//! are measured from.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// chrono strftime format of the timestamp in session directory names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Paths belonging to the current session.
#[derive(Clone, Debug)]
pub struct Session {
    pub session_root: PathBuf,

    /// Directory holding the csv archives.
    pub arch_root: PathBuf,

    pub log_file_path: PathBuf
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable (STEER_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error("A session has already been started in this process ({0})")]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot copy parameter file {file} into the session: {source}")]
    CannotCopyParams {
        file: String,
        source: std::io::Error
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a new session in `sessions_dir` under the software root.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        let root = crate::host::get_sw_root()
            .map_err(|_| SessionError::SwRootNotSet)?
            .join(sessions_dir);

        Self::in_dir(exec_name, root)
    }

    /// Start a new session named `{exec_name}_{timestamp}` inside an explicit
    /// directory.
    ///
    /// Only one session may be started per process.
    pub fn in_dir(exec_name: &str, sessions_dir: PathBuf) -> Result<Self, SessionError> {
        SESSION_EPOCH.try_init_once(Utc::now)
            .map_err(SessionError::CannotInitEpoch)?;

        let timestamp = get_epoch()
            .map(|e| e.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default();

        let session_root = sessions_dir.join(format!("{}_{}", exec_name, timestamp));
        let arch_root = session_root.join("arch");

        // Creates the session root as well
        fs::create_dir_all(&arch_root).map_err(SessionError::CannotCreateDir)?;

        Ok(Session {
            log_file_path: session_root.join(format!("{}.log", exec_name)),
            session_root,
            arch_root
        })
    }

    /// Copy parameter files from the software root's `params` directory into
    /// the session, so that a run can be reproduced from its session alone.
    pub fn snapshot_params(&self, param_files: &[&str]) -> Result<(), SessionError> {
        let src = crate::host::get_sw_root()
            .map_err(|_| SessionError::SwRootNotSet)?
            .join("params");
        let dst = self.session_root.join("params");

        fs::create_dir_all(&dst).map_err(SessionError::CannotCreateDir)?;

        for file in param_files.iter() {
            fs::copy(src.join(file), dst.join(file))
                .map_err(|e| SessionError::CannotCopyParams {
                    file: file.to_string(),
                    source: e
                })?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Seconds elapsed since the start of the session, `NAN` before a session
/// has been started.
pub fn get_elapsed_seconds() -> f64 {
    get_epoch()
        .and_then(|e| time::duration_to_seconds(Utc::now() - *e))
        .unwrap_or(std::f64::NAN)
}

/// The session's epoch, or `None` if no session has been started.
pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}

//! Logging initialisation
//!
//! Messages go to two sinks: the terminal at the requested level with coloured
//! level tags, and the session's log file, which always records at least
//! debug messages so that tuning refreshes and actuator delay estimates are
//! available when reviewing a session.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, Level};
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The log file records at least this level, whatever the terminal shows.
pub const FILE_MIN_LEVEL: LevelFilter = LevelFilter::Debug;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Warnings must be logged, found a terminal level of `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// `min_level` is the level shown on the terminal and must include warnings,
/// since torque model faults and tuning read failures are only reported as
/// warnings.
///
/// Only one logger may be set per process, a second call returns
/// `LoggerInitError::FernInitError`.
pub fn logger_init(
    min_level: LevelFilter,
    session: &Session
) -> Result<(), LoggerInitError> {

    if min_level < LevelFilter::Warn {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level))
    }

    let file_level = min_level.max(FILE_MIN_LEVEL);

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    let terminal = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{:10.6} {}] {}",
                session::get_elapsed_seconds(),
                level_tag(record.level()),
                message
            ))
        })
        .level(min_level)
        .chain(std::io::stdout());

    // The file is plain text and always carries the message target
    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{:10.6} {:5}] {}: {}",
                session::get_elapsed_seconds(),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(file_level)
        .chain(log_file);

    fern::Dispatch::new()
        .level(file_level)
        .chain(terminal)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Terminal level: {:?}, file level: {:?}", min_level, file_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Coloured terminal tag for a log level.
fn level_tag(level: Level) -> ColoredString {
    match level {
        Level::Trace => "TRC".dimmed(),
        Level::Debug => "DBG".cyan(),
        Level::Info  => "INF".green(),
        Level::Warn  => "WRN".yellow().bold(),
        Level::Error => "ERR".red().bold()
    }
}

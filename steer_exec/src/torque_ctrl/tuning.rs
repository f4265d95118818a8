//! # Tuning parameters and the tuning store
//!
//! Some tuning parameters may be overridden at runtime through a persisted
//! key/value store. The store is polled on a fixed cadence rather than every
//! cycle, and a failed or partial read leaves the current values in place.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of cycles between tuning store reads.
pub const TUNING_REFRESH_PERIOD: u64 = 250;

/// Store key enabling the runtime overrides.
pub const KEY_TORQUED_OVERRIDE: &str = "TorquedOverride";

/// Store key for the lateral acceleration factor override, in percent.
pub const KEY_TORQUE_MAX_LAT_ACCEL: &str = "TorqueMaxLatAccel";

/// Store key for the friction override, in percent.
pub const KEY_TORQUE_FRICTION: &str = "TorqueFriction";

/// Conversion from the percentage values in the store.
const PERCENT: f64 = 0.01;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Mutable tuning of the torque controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningParams {
    /// Lateral acceleration produced per unit of torque.
    ///
    /// Units: meters/second^2
    pub lat_accel_factor: f64,

    /// Lateral acceleration offset of the torque response.
    ///
    /// Units: meters/second^2
    pub lat_accel_offset: f64,

    /// Torque required to overcome the steering rack friction.
    pub friction: f64,

    /// Measure curvature from the steering angle rather than the yaw rate.
    pub use_steering_angle: bool,

    /// Steering angle deadzone within which friction is not compensated.
    ///
    /// Units: degrees
    pub steering_angle_deadzone_deg: f64,

    /// True if the runtime overrides from the tuning store are active.
    #[serde(default)]
    pub override_enabled: bool
}

/// A key/value store read from a directory, one file per key.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf
}

/// An in-memory key/value store.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    values: HashMap<String, String>
}

/// Tuning store which reads the override keys from a key/value store every
/// `TUNING_REFRESH_PERIOD` cycles.
#[derive(Debug, Clone)]
pub struct KeyValueTuningStore<S: KeyValueStore> {
    store: S,
    period: u64
}

/// A tuning store which never provides new values.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticTuning;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while reading the key/value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot read key {key}: {source}")]
    ReadError {
        key: String,
        source: std::io::Error
    },

    #[error("Key {key} has an invalid value {value:?}")]
    InvalidValue {
        key: String,
        value: String
    }
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Read access to a persisted key/value store.
pub trait KeyValueStore {
    /// Read a key, `None` if the key isn't present.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Read a boolean key. A key is true only if its value is `1`, a missing
    /// key is false.
    fn get_bool(&self, key: &str) -> Result<bool, StoreError> {
        Ok(matches!(self.get(key)?.as_deref().map(str::trim), Some("1")))
    }

    /// Read a floating point key.
    fn get_f64(&self, key: &str) -> Result<Option<f64>, StoreError> {
        match self.get(key)? {
            Some(v) => match v.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Some(f)),
                _ => Err(StoreError::InvalidValue {
                    key: key.to_string(),
                    value: v
                })
            },
            None => Ok(None)
        }
    }
}

/// Source of refreshed tuning parameters.
pub trait TuningStore {
    /// Called once per cycle with the cycle count and the tuning currently in
    /// use. Returns the new tuning if it has changed, or `None` to keep the
    /// current tuning.
    fn refresh(&mut self, tick: u64, current: &TuningParams) -> Option<TuningParams>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for TuningParams {
    fn default() -> Self {
        Self {
            lat_accel_factor: 2.5,
            lat_accel_offset: 0.0,
            friction: 0.1,
            use_steering_angle: true,
            steering_angle_deadzone_deg: 0.0,
            override_enabled: false
        }
    }
}

impl DirStore {
    /// Create a new store reading keys from files in `root`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into()
        }
    }
}

impl KeyValueStore for DirStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.root.join(key)) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::ReadError {
                key: key.to_string(),
                source: e
            })
        }
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of a key.
    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Remove a key from the store.
    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

impl KeyValueStore for MemStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }
}

impl<S: KeyValueStore> KeyValueTuningStore<S> {
    /// Create a new tuning store refreshing every `TUNING_REFRESH_PERIOD`
    /// cycles.
    pub fn new(store: S) -> Self {
        Self {
            store,
            period: TUNING_REFRESH_PERIOD
        }
    }

    /// Access the underlying key/value store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Read all override keys. Any failure discards the whole read so that
    /// partial updates are never applied.
    fn read(&self, current: &TuningParams) -> Result<TuningParams, StoreError> {
        let override_enabled = self.store.get_bool(KEY_TORQUED_OVERRIDE)?;

        let mut tuning = *current;
        tuning.override_enabled = override_enabled;

        if !override_enabled {
            return Ok(tuning)
        }

        let max_lat_accel = self.store.get_f64(KEY_TORQUE_MAX_LAT_ACCEL)?
            .ok_or_else(|| StoreError::InvalidValue {
                key: KEY_TORQUE_MAX_LAT_ACCEL.to_string(),
                value: String::new()
            })?;
        let friction = self.store.get_f64(KEY_TORQUE_FRICTION)?
            .ok_or_else(|| StoreError::InvalidValue {
                key: KEY_TORQUE_FRICTION.to_string(),
                value: String::new()
            })?;

        // A zero factor would make the analytic model divide by zero
        if !(max_lat_accel > 0.0) {
            return Err(StoreError::InvalidValue {
                key: KEY_TORQUE_MAX_LAT_ACCEL.to_string(),
                value: max_lat_accel.to_string()
            })
        }

        tuning.lat_accel_factor = max_lat_accel * PERCENT;
        tuning.friction = friction * PERCENT;

        Ok(tuning)
    }
}

impl<S: KeyValueStore> TuningStore for KeyValueTuningStore<S> {
    fn refresh(&mut self, tick: u64, current: &TuningParams) -> Option<TuningParams> {
        if self.period == 0 || tick % self.period != 0 {
            return None
        }

        match self.read(current) {
            Ok(tuning) if tuning != *current => {
                debug!(
                    "Tuning refreshed: override {}, lat accel factor {:.3}, friction {:.3}",
                    tuning.override_enabled,
                    tuning.lat_accel_factor,
                    tuning.friction
                );
                Some(tuning)
            },
            Ok(_) => None,
            Err(e) => {
                warn!("Could not refresh tuning, keeping previous values: {}", e);
                None
            }
        }
    }
}

impl TuningStore for StaticTuning {
    fn refresh(&mut self, _tick: u64, _current: &TuningParams) -> Option<TuningParams> {
        None
    }
}

//! # Torque models
//!
//! A torque model maps a lateral acceleration (plus context) onto the steering
//! torque needed to achieve it. Two kinds are supported:
//!
//! - An analytic model, a per-vehicle function of the acceleration, friction
//!   input and deadzone. `LinearTorqueModel` is the standard linear law.
//! - A neural model, a trained feed-forward network taking a feature vector of
//!   current, past and future context. `MlpTorqueModel` evaluates such a
//!   network loaded from a JSON file.
//!
//! The model in use is chosen once at construction as a `FeedforwardModel`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use util::maths::interp;

// Internal
use super::TuningParams;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Lateral acceleration error at which the full friction torque is applied.
///
/// Units: meters/second^2
pub const FRICTION_THRESHOLD: f64 = 0.3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Inputs to an analytic torque model evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatControlInputs {
    /// Units: meters/second^2
    pub lateral_acceleration: f64,

    /// Units: meters/second^2
    pub roll_compensation: f64,

    /// Units: meters/second
    pub speed_ms: f64,

    /// Units: meters/second^2
    pub long_accel_mss: f64
}

/// The linear analytic model, `torque = accel / lat_accel_factor + friction`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTorqueModel;

/// A dense feed-forward network.
#[derive(Debug, Clone)]
pub struct MlpTorqueModel {
    input_mean: DVector<f64>,
    input_std: DVector<f64>,
    layers: Vec<DenseLayer>,
    friction_override: bool,
    friction_factor: f64
}

#[derive(Debug, Clone)]
struct DenseLayer {
    weights: DMatrix<f64>,
    bias: DVector<f64>,
    activation: Activation
}

/// On-disk description of a network.
#[derive(Debug, Deserialize)]
struct MlpDescription {
    input_mean: Vec<f64>,
    input_std: Vec<f64>,
    layers: Vec<LayerDescription>,
    #[serde(default)]
    friction_override: bool,
    #[serde(default = "default_friction_factor")]
    friction_factor: f64
}

#[derive(Debug, Deserialize)]
struct LayerDescription {
    /// One row per output, one column per input.
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    activation: Activation
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur when loading or evaluating a torque model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Could not read the model file: {0}")]
    FileError(std::io::Error),

    #[error("Could not parse the model: {0}")]
    ParseError(serde_json::Error),

    #[error("Malformed model: {0}")]
    Malformed(String),

    #[error("Expected {expected} model inputs but got {found}")]
    InputSize {
        expected: usize,
        found: usize
    },

    #[error("The model produced a non-finite output")]
    NonFiniteOutput
}

/// Layer activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh
}

/// The torque model used by the controller.
pub enum FeedforwardModel {
    /// Only an analytic model is used.
    AnalyticLinear(Box<dyn AnalyticTorqueModel>),

    /// A neural model provides the feedforward and error torques. The
    /// analytic model is kept for friction override and as the fallback
    /// when no trajectory is available.
    NeuralFeedforward {
        nn: Box<dyn NeuralTorqueModel>,
        analytic: Box<dyn AnalyticTorqueModel>
    }
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A per-vehicle analytic torque model.
pub trait AnalyticTorqueModel {
    /// Compute the torque needed for the given lateral acceleration.
    ///
    /// # Inputs
    /// - `inputs`: the acceleration and vehicle state
    /// - `tuning`: current tuning parameters
    /// - `friction_input`: the lateral acceleration error (or jerk shaped
    ///   equivalent) driving the friction term
    /// - `lateral_accel_deadzone`: error below which no friction is applied
    /// - `friction_compensation`: add the friction term
    /// - `gravity_adjusted`: the acceleration already has the roll
    ///   compensation removed
    fn torque_from_lateral_accel(
        &self,
        inputs: &LatControlInputs,
        tuning: &TuningParams,
        friction_input: f64,
        lateral_accel_deadzone: f64,
        friction_compensation: bool,
        gravity_adjusted: bool
    ) -> Result<f64, ModelError>;

    /// True if this is the linear law, which needs the full low speed factor.
    fn is_linear(&self) -> bool {
        false
    }
}

/// A learned torque model evaluated on a feature vector.
pub trait NeuralTorqueModel {
    /// Length of the feature vector the model expects.
    fn input_size(&self) -> usize;

    /// Evaluate the model.
    fn evaluate(&self, input: &[f64]) -> Result<f64, ModelError>;

    /// True if the model's learned friction response is too weak, so the
    /// analytic friction term must be added on top of it.
    fn friction_override(&self) -> bool {
        false
    }

    /// Scaling of the friction input fed to the model.
    fn friction_factor(&self) -> f64 {
        1.0
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AnalyticTorqueModel for LinearTorqueModel {
    fn torque_from_lateral_accel(
        &self,
        inputs: &LatControlInputs,
        tuning: &TuningParams,
        friction_input: f64,
        lateral_accel_deadzone: f64,
        friction_compensation: bool,
        _gravity_adjusted: bool
    ) -> Result<f64, ModelError> {
        let friction = get_friction(
            friction_input,
            lateral_accel_deadzone,
            FRICTION_THRESHOLD,
            tuning,
            friction_compensation
        );

        Ok(inputs.lateral_acceleration / tuning.lat_accel_factor + friction)
    }

    fn is_linear(&self) -> bool {
        true
    }
}

impl MlpTorqueModel {
    /// Load a network from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let s = std::fs::read_to_string(path).map_err(ModelError::FileError)?;
        Self::from_json(&s)
    }

    /// Build a network from its JSON description.
    pub fn from_json(s: &str) -> Result<Self, ModelError> {
        let desc: MlpDescription = serde_json::from_str(s).map_err(ModelError::ParseError)?;

        let input_size = desc.input_mean.len();
        if input_size == 0 || desc.input_std.len() != input_size {
            return Err(ModelError::Malformed(format!(
                "input_mean has {} values and input_std {}",
                input_size,
                desc.input_std.len()
            )))
        }

        if desc.layers.is_empty() {
            return Err(ModelError::Malformed("the model has no layers".into()))
        }

        let mut layers = Vec::with_capacity(desc.layers.len());
        let mut width = input_size;

        for (i, layer) in desc.layers.into_iter().enumerate() {
            let rows = layer.weights.len();

            if rows == 0 || layer.bias.len() != rows {
                return Err(ModelError::Malformed(format!(
                    "layer {} has {} weight rows and {} biases",
                    i, rows, layer.bias.len()
                )))
            }
            if layer.weights.iter().any(|r| r.len() != width) {
                return Err(ModelError::Malformed(format!(
                    "layer {} weights must have {} columns",
                    i, width
                )))
            }

            let flat: Vec<f64> = layer.weights.into_iter().flatten().collect();
            layers.push(DenseLayer {
                weights: DMatrix::from_row_slice(rows, width, &flat),
                bias: DVector::from_vec(layer.bias),
                activation: layer.activation
            });

            width = rows;
        }

        if width != 1 {
            return Err(ModelError::Malformed(format!(
                "the model must have a single output, found {}",
                width
            )))
        }

        // A zero deviation would divide by zero, leave those inputs unscaled
        let input_std = DVector::from_vec(desc.input_std)
            .map(|s| if s.abs() > std::f64::EPSILON { s } else { 1.0 });

        Ok(Self {
            input_mean: DVector::from_vec(desc.input_mean),
            input_std,
            layers,
            friction_override: desc.friction_override,
            friction_factor: desc.friction_factor
        })
    }
}

impl NeuralTorqueModel for MlpTorqueModel {
    fn input_size(&self) -> usize {
        self.input_mean.len()
    }

    fn evaluate(&self, input: &[f64]) -> Result<f64, ModelError> {
        if input.len() != self.input_size() {
            return Err(ModelError::InputSize {
                expected: self.input_size(),
                found: input.len()
            })
        }

        let mut x = (DVector::from_column_slice(input) - &self.input_mean)
            .component_div(&self.input_std);

        for layer in self.layers.iter() {
            x = (&layer.weights * x + &layer.bias).map(|v| layer.activation.apply(v));
        }

        let out = x[0];
        if out.is_finite() {
            Ok(out)
        }
        else {
            Err(ModelError::NonFiniteOutput)
        }
    }

    fn friction_override(&self) -> bool {
        self.friction_override
    }

    fn friction_factor(&self) -> f64 {
        self.friction_factor
    }
}

impl Activation {
    fn apply(self, v: f64) -> f64 {
        match self {
            Activation::Linear => v,
            Activation::Relu => v.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-v).exp()),
            Activation::Tanh => v.tanh()
        }
    }
}

impl FeedforwardModel {
    /// The analytic model, present for both variants.
    pub fn analytic(&self) -> &dyn AnalyticTorqueModel {
        match self {
            FeedforwardModel::AnalyticLinear(a) => a.as_ref(),
            FeedforwardModel::NeuralFeedforward { analytic, .. } => analytic.as_ref()
        }
    }

    /// The neural model, if one is in use.
    pub fn neural(&self) -> Option<&dyn NeuralTorqueModel> {
        match self {
            FeedforwardModel::AnalyticLinear(_) => None,
            FeedforwardModel::NeuralFeedforward { nn, .. } => Some(nn.as_ref())
        }
    }
}

impl std::fmt::Debug for FeedforwardModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedforwardModel::AnalyticLinear(a) => write!(
                f, "AnalyticLinear {{ linear: {} }}", a.is_linear()
            ),
            FeedforwardModel::NeuralFeedforward { nn, .. } => write!(
                f, "NeuralFeedforward {{ input_size: {} }}", nn.input_size()
            )
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Zero the error if it lies strictly inside the deadzone.
pub fn apply_center_deadzone(error: f64, deadzone: f64) -> f64 {
    if error > -deadzone && error < deadzone {
        0.0
    }
    else {
        error
    }
}

/// Friction torque for the given lateral acceleration error.
///
/// The friction ramps linearly from zero to the full tuned friction as the
/// error (outside the deadzone) reaches `friction_threshold`.
pub fn get_friction(
    error: f64,
    deadzone: f64,
    friction_threshold: f64,
    tuning: &TuningParams,
    friction_compensation: bool
) -> f64 {
    if !friction_compensation {
        return 0.0
    }

    interp(
        apply_center_deadzone(error, deadzone),
        &[-friction_threshold, friction_threshold],
        &[-tuning.friction, tuning.friction]
    )
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn default_friction_factor() -> f64 {
    1.0
}

#[cfg(test)]
mod test {
    use super::*;

    fn tuning(factor: f64, friction: f64) -> TuningParams {
        TuningParams {
            lat_accel_factor: factor,
            friction,
            ..Default::default()
        }
    }

    #[test]
    fn test_center_deadzone() {
        assert_eq!(apply_center_deadzone(0.05, 0.1), 0.0);
        assert_eq!(apply_center_deadzone(-0.05, 0.1), 0.0);
        assert_eq!(apply_center_deadzone(0.1, 0.1), 0.1);
        assert_eq!(apply_center_deadzone(-0.3, 0.0), -0.3);
    }

    #[test]
    fn test_friction() {
        let t = tuning(1.0, 0.05);

        assert_eq!(get_friction(0.4, 0.0, FRICTION_THRESHOLD, &t, true), 0.05);
        assert_eq!(get_friction(-0.4, 0.0, FRICTION_THRESHOLD, &t, true), -0.05);
        assert!((get_friction(0.15, 0.0, FRICTION_THRESHOLD, &t, true) - 0.025).abs() < 1e-12);
        assert_eq!(get_friction(0.15, 0.2, FRICTION_THRESHOLD, &t, true), 0.0);
        assert_eq!(get_friction(0.4, 0.0, FRICTION_THRESHOLD, &t, false), 0.0);
    }

    #[test]
    fn test_linear_feedforward() {
        let inputs = LatControlInputs {
            lateral_acceleration: 0.4,
            speed_ms: 20.0,
            ..Default::default()
        };

        let ff = LinearTorqueModel.torque_from_lateral_accel(
            &inputs, &tuning(1.0, 0.05), 0.4, 0.0, true, true
        ).unwrap();
        assert!((ff - 0.45).abs() < 1e-12);

        let ff = LinearTorqueModel.torque_from_lateral_accel(
            &inputs, &tuning(2.0, 0.05), 0.4, 0.0, false, false
        ).unwrap();
        assert!((ff - 0.2).abs() < 1e-12);
    }

    const SMALL_MLP: &str = r#"{
        "input_mean": [1.0, 0.0],
        "input_std": [2.0, 0.0],
        "layers": [
            { "weights": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0, 0.0], "activation": "relu" },
            { "weights": [[1.0, -1.0]], "bias": [0.5], "activation": "linear" }
        ],
        "friction_override": true
    }"#;

    #[test]
    fn test_mlp() {
        let mlp = MlpTorqueModel::from_json(SMALL_MLP).unwrap();

        assert_eq!(mlp.input_size(), 2);
        assert!(mlp.friction_override());
        assert_eq!(mlp.friction_factor(), 1.0);

        // ((5 - 1) / 2, 3 / 1) -> relu -> 2 - 3 + 0.5
        assert!((mlp.evaluate(&[5.0, 3.0]).unwrap() + 0.5).abs() < 1e-12);

        // Negative inputs clipped by the relu
        assert!((mlp.evaluate(&[-1.0, -3.0]).unwrap() - 0.5).abs() < 1e-12);

        match mlp.evaluate(&[1.0]) {
            Err(ModelError::InputSize { expected: 2, found: 1 }) => (),
            r => panic!("Unexpected result {:?}", r)
        }
    }

    #[test]
    fn test_mlp_malformed() {
        let bad = SMALL_MLP.replace("[[1.0, -1.0]]", "[[1.0, -1.0], [1.0, 1.0]]");
        assert!(MlpTorqueModel::from_json(&bad).is_err());

        let bad = SMALL_MLP.replace("\"input_std\": [2.0, 0.0]", "\"input_std\": [2.0]");
        assert!(MlpTorqueModel::from_json(&bad).is_err());

        assert!(MlpTorqueModel::from_json("{}").is_err());
    }
}

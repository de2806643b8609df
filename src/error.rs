//! Detection error types.

use thiserror::Error;

/// Errors surfaced by a detection call. None of them are retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("Degenerate distribution at timestep {timestep}, feature {feature}: std-dev {std_dev}")]
    DegenerateDistribution {
        timestep: usize,
        feature: usize,
        std_dev: f64,
    },

    #[error("Density overflow at timestep {timestep}: log-density {log_density}")]
    DensityOverflow { timestep: usize, log_density: f64 },

    #[error("Invalid threshold: {0} (must be in [0, 1))")]
    InvalidThreshold(f64),

    #[error("Insufficient data: required {required}, got {got}")]
    InsufficientData { required: usize, got: usize },

    #[error("Non-finite observation at timestep {timestep}, feature {feature}")]
    NonFiniteObservation { timestep: usize, feature: usize },

    #[error("Non-finite predicted mean at timestep {timestep}, feature {feature}")]
    NonFiniteParameter { timestep: usize, feature: usize },

    #[error("Invalid parameter: {name} - {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Device binding failed: {0}")]
    DeviceBinding(String),

    #[error("Predictor failed: {0}")]
    Predictor(String),
}

impl DetectionError {
    pub(crate) fn shape(expected: &[usize], got: &[usize]) -> Self {
        DetectionError::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}

/// Result type for detection operations.
pub type Result<T> = std::result::Result<T, DetectionError>;

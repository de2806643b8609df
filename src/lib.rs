//! Anomaly scoring of multivariate time series against a one-step-ahead
//! Gaussian forecaster.
//!
//! The forecaster is injected through [`Predictor`]; each observation is scored
//! by its density under the diagonal Gaussian predicted one step earlier and
//! flagged when that density falls below a threshold.

pub mod error;
pub mod models;
pub mod utils;

#[cfg(feature = "python")]
mod python;

pub use error::{DetectionError, Result};
pub use models::detector::{detect_anomalies, DetectionResult, DetectorConfig, ForecastAnomalyDetector};
pub use models::device::{ComputeDevice, Cpu, NamedDevice};
pub use models::gaussian::{diagonal_log_density, score_transitions, TransitionDensities};
pub use models::labels::{assign_labels, Threshold};
pub use models::params::GaussianParams;
pub use models::predictor::{FnPredictor, InferenceMode, Predictor, PredictorOutput};
pub use models::rolling::RollingGaussianPredictor;
pub use models::sequence::Sequence;
pub use utils::evaluation::{density_auroc, evaluate, threshold_metrics, Evaluation};
pub use utils::ss::StreamStatistic;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::device::ComputeDevice;
use crate::models::gaussian::score_transitions;
use crate::models::labels::{assign_labels, Threshold};
use crate::models::params::GaussianParams;
use crate::models::predictor::{InferenceMode, Predictor};
use crate::models::sequence::Sequence;

/// Settings for [`ForecastAnomalyDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Density cutoff, see [`Threshold`].
    pub threshold: f64,
    /// Evaluate transitions on the rayon pool.
    pub parallel: bool,
    /// Below this many transitions scoring stays on the calling thread.
    pub parallel_min_len: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            threshold: 0.01,
            parallel: true,
            parallel_min_len: 256,
        }
    }
}

impl DetectorConfig {
    pub fn with_threshold(threshold: f64) -> Self {
        DetectorConfig {
            threshold,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<Threshold> {
        Threshold::new(self.threshold)
    }
}

/// Labels and densities for one sequence.
///
/// `outlier_label` has one entry per timestep (`T`), `probability` one per
/// transition (`T - 1`): `probability[i]` is the density of observation
/// `i + 1` and decides `outlier_label[i + 1]`. Use
/// [`aligned_probability`](Self::aligned_probability) for a per-timestep view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub outlier_label: Vec<bool>,
    pub probability: Vec<f64>,
    /// Indices into `probability` whose density underflowed to exactly `0.0`.
    #[serde(default)]
    pub underflowed: Vec<usize>,
}

impl DetectionResult {
    pub fn new(outlier_label: Vec<bool>, probability: Vec<f64>, underflowed: Vec<usize>) -> Self {
        DetectionResult {
            outlier_label,
            probability,
            underflowed,
        }
    }

    /// Timesteps labelled as outliers.
    pub fn anomaly_indices(&self) -> Vec<usize> {
        self.outlier_label
            .iter()
            .enumerate()
            .filter_map(|(i, &is_outlier)| if is_outlier { Some(i) } else { None })
            .collect()
    }

    pub fn anomaly_count(&self) -> usize {
        self.outlier_label.iter().filter(|&&x| x).count()
    }

    /// Densities padded to length `T`, `None` at timestep 0.
    pub fn aligned_probability(&self) -> Vec<Option<f64>> {
        std::iter::once(None)
            .chain(self.probability.iter().copied().map(Some))
            .collect()
    }
}

/// Scores a sequence against an injected one-step-ahead forecaster.
#[derive(Debug, Clone)]
pub struct ForecastAnomalyDetector {
    config: DetectorConfig,
    threshold: Threshold,
}

impl ForecastAnomalyDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let threshold = config.validate()?;
        Ok(ForecastAnomalyDetector { config, threshold })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run `predictor` over `sequence` and label every timestep.
    ///
    /// The predictor is called once, inside an inference-only scope that is
    /// released on every exit path. Either the whole result is returned or an
    /// error is; there are no partial results.
    pub fn detect<P>(
        &self,
        sequence: &Sequence,
        predictor: &P,
        device: &dyn ComputeDevice,
    ) -> Result<DetectionResult>
    where
        P: Predictor + ?Sized,
    {
        let (t, d) = (sequence.len(), sequence.n_features());
        tracing::debug!(
            t,
            d,
            threshold = self.threshold.value(),
            device = device.name(),
            "detecting anomalies"
        );
        if t < 2 {
            return Err(crate::error::DetectionError::InsufficientData {
                required: 2,
                got: t,
            });
        }

        let output = {
            let scope = InferenceMode::enter(predictor);
            let prepared = sequence.prepare(device)?;
            scope.predictor().predict(prepared.view(), device)?
        };

        let params = GaussianParams::extract(output.params.view(), t, d)?;
        let parallel = self.config.parallel && t - 1 >= self.config.parallel_min_len;
        let scored = score_transitions(&params, sequence, parallel)?;
        let outlier_label = assign_labels(&scored.densities, self.threshold);

        let result = DetectionResult::new(outlier_label, scored.densities, scored.underflowed);
        tracing::debug!(outliers = result.anomaly_count(), "detection finished");
        Ok(result)
    }
}

/// One-shot detection with default settings and the given threshold.
pub fn detect_anomalies<P>(
    sequence: &Sequence,
    predictor: &P,
    device: &dyn ComputeDevice,
    prob_threshold: f64,
) -> Result<DetectionResult>
where
    P: Predictor + ?Sized,
{
    ForecastAnomalyDetector::new(DetectorConfig::with_threshold(prob_threshold))?
        .detect(sequence, predictor, device)
}

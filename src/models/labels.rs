use serde::{Deserialize, Serialize};

use crate::error::{DetectionError, Result};

/// Density cutoff below which an observation is labelled an outlier.
///
/// The value must lie in `[0, 1)`, but it is compared against a raw
/// probability *density*, which is not bounded by 1. A narrow predicted
/// distribution can yield densities far above 1, so a threshold that looks
/// strict (e.g. `0.9`) may still flag almost nothing, and a wide one can push
/// every density under `0.01`. Pick it with the model's scale in mind.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&value) {
            return Err(DetectionError::InvalidThreshold(value));
        }
        Ok(Threshold(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Threshold {
    type Error = DetectionError;

    fn try_from(value: f64) -> Result<Self> {
        Threshold::new(value)
    }
}

impl From<Threshold> for f64 {
    fn from(threshold: Threshold) -> f64 {
        threshold.0
    }
}

/// Turn `T - 1` transition densities into `T` per-timestep labels.
///
/// `labels[0]` is always `false`: nothing predicts the first observation.
/// `labels[i + 1]` is `densities[i] < threshold`, so raising the threshold can
/// only add outliers, never remove them.
pub fn assign_labels(densities: &[f64], threshold: Threshold) -> Vec<bool> {
    let mut labels = Vec::with_capacity(densities.len() + 1);
    labels.push(false);
    labels.extend(densities.iter().map(|&p| p < threshold.value()));
    labels
}

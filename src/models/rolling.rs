use ndarray::{s, Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::{DetectionError, Result};
use crate::models::device::ComputeDevice;
use crate::models::predictor::{Predictor, PredictorOutput};
use crate::utils::ss::StreamStatistic;

/// Statistical reference forecaster.
///
/// Predicts observation `t + 1` as a Gaussian with the mean and variance of
/// the last `window` observations up to and including `t` (all of them when
/// `window` is `None`). Variances are floored at `min_variance` so a flat
/// stretch of data never produces a degenerate distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingGaussianPredictor {
    window: Option<usize>,
    min_variance: f64,
}

impl RollingGaussianPredictor {
    pub fn new(window: Option<usize>, min_variance: f64) -> Result<Self> {
        if window == Some(0) {
            return Err(DetectionError::InvalidParameter {
                name: "window".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(min_variance > 0.0) || !min_variance.is_finite() {
            return Err(DetectionError::InvalidParameter {
                name: "min_variance".to_string(),
                reason: format!("must be positive and finite, got {min_variance}"),
            });
        }
        Ok(RollingGaussianPredictor {
            window,
            min_variance,
        })
    }

    pub fn window(&self) -> Option<usize> {
        self.window
    }

    pub fn min_variance(&self) -> f64 {
        self.min_variance
    }
}

impl Default for RollingGaussianPredictor {
    fn default() -> Self {
        RollingGaussianPredictor {
            window: Some(32),
            min_variance: 1e-6,
        }
    }
}

impl Predictor for RollingGaussianPredictor {
    fn predict(
        &self,
        sequence: ArrayView3<'_, f64>,
        _device: &dyn ComputeDevice,
    ) -> Result<PredictorOutput> {
        let (batch, t_len, d) = sequence.dim();
        let mut params = Array3::<f64>::zeros((batch, t_len, 2 * d));

        for b in 0..batch {
            let mut stats = match self.window {
                Some(w) => StreamStatistic::windowed(d, w),
                None => StreamStatistic::global(d),
            };
            for t in 0..t_len {
                stats.update(sequence.slice(s![b, t, ..]));
                params.slice_mut(s![b, t, ..d]).assign(stats.mean());
                let log_var = stats.var().mapv(|v| v.max(self.min_variance).ln());
                params.slice_mut(s![b, t, d..]).assign(&log_var);
            }
        }

        Ok(PredictorOutput::new(params))
    }
}

use ndarray::{s, Array2, ArrayView1, ArrayView3};

use crate::error::{DetectionError, Result};

/// Per-timestep mean and standard deviation, batch axis removed.
///
/// `log_std` is kept next to `std_dev` so scoring never has to take the log of
/// a tiny or subnormal std-dev.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianParams {
    mean: Array2<f64>,
    std_dev: Array2<f64>,
    log_std: Array2<f64>,
}

impl GaussianParams {
    /// Split a `[1, T, 2D]` parameter tensor into mean and std-dev (`T x D` each).
    ///
    /// std-dev is `exp(log_var / 2)`, which never needs the raw variance. Any
    /// other shape, including a batch of more than one sequence, is rejected.
    pub fn extract(params: ArrayView3<'_, f64>, t: usize, d: usize) -> Result<Self> {
        let expected = [1, t, 2 * d];
        if params.shape() != expected {
            return Err(DetectionError::shape(&expected, params.shape()));
        }

        let params = params.index_axis(ndarray::Axis(0), 0);
        let mean = params.slice(s![.., ..d]).to_owned();
        let log_std = params.slice(s![.., d..]).mapv(|log_var| log_var / 2.0);
        let std_dev = log_std.mapv(f64::exp);

        Ok(GaussianParams {
            mean,
            std_dev,
            log_std,
        })
    }

    /// Build directly from mean and std-dev matrices of equal shape.
    pub fn from_parts(mean: Array2<f64>, std_dev: Array2<f64>) -> Result<Self> {
        if mean.shape() != std_dev.shape() {
            return Err(DetectionError::shape(mean.shape(), std_dev.shape()));
        }
        let log_std = std_dev.mapv(f64::ln);
        Ok(GaussianParams {
            mean,
            std_dev,
            log_std,
        })
    }

    pub fn len(&self) -> usize {
        self.mean.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.nrows() == 0
    }

    pub fn n_features(&self) -> usize {
        self.mean.ncols()
    }

    pub fn mean(&self, t: usize) -> ArrayView1<'_, f64> {
        self.mean.row(t)
    }

    pub fn std_dev(&self, t: usize) -> ArrayView1<'_, f64> {
        self.std_dev.row(t)
    }

    pub fn log_std(&self, t: usize) -> ArrayView1<'_, f64> {
        self.log_std.row(t)
    }
}

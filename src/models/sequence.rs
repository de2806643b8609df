use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::error::{DetectionError, Result};
use crate::models::device::ComputeDevice;

/// An ordered `T x D` matrix of observations.
///
/// Construction rejects empty feature dimensions and non-finite values, so
/// every downstream stage can assume clean input.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    values: Array2<f64>,
}

impl Sequence {
    pub fn new(values: Array2<f64>) -> Result<Self> {
        if values.ncols() == 0 {
            return Err(DetectionError::InsufficientData {
                required: 1,
                got: 0,
            });
        }
        for ((timestep, feature), v) in values.indexed_iter() {
            if !v.is_finite() {
                return Err(DetectionError::NonFiniteObservation { timestep, feature });
            }
        }
        Ok(Sequence { values })
    }

    /// Build from row vectors, e.g. `&[vec![0.0], vec![0.0], vec![5.0]]`.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let d = rows.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(rows.len() * d);
        for row in rows {
            if row.len() != d {
                return Err(DetectionError::shape(&[rows.len(), d], &[rows.len(), row.len()]));
            }
            flat.extend_from_slice(row);
        }
        let n = rows.len();
        let values = Array2::from_shape_vec((n, d), flat)
            .map_err(|_| DetectionError::shape(&[n, d], &[n * d]))?;
        Self::new(values)
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn row(&self, t: usize) -> ArrayView1<'_, f64> {
        self.values.row(t)
    }

    /// Add the leading batch axis and bind the result to `device`.
    pub fn prepare(&self, device: &dyn ComputeDevice) -> Result<Array3<f64>> {
        let batch = self.values.clone().insert_axis(Axis(0));
        let placed = device.place(batch)?;
        let expected = [1, self.len(), self.n_features()];
        if placed.shape() != expected {
            return Err(DetectionError::DeviceBinding(format!(
                "device {} changed shape {:?} to {:?}",
                device.name(),
                expected,
                placed.shape()
            )));
        }
        Ok(placed)
    }
}

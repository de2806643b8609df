use ndarray::{Array, Array2, Array3, ArrayView3, Dimension};
use numpy::{PyArray, PyReadonlyArray3, ToPyArray};
use pyo3::exceptions::{PyFloatingPointError, PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyDict};

use crate::error::DetectionError;
use crate::models::detector::{DetectionResult, DetectorConfig, ForecastAnomalyDetector};
use crate::models::device::{ComputeDevice, NamedDevice};
use crate::models::predictor::{Predictor, PredictorOutput};
use crate::models::rolling::RollingGaussianPredictor;
use crate::models::sequence::Sequence;
use crate::utils::evaluation::evaluate;

fn detection_error_to_pyerr(err: DetectionError) -> PyErr {
    match err {
        DetectionError::ShapeMismatch { .. }
        | DetectionError::InvalidThreshold(_)
        | DetectionError::InsufficientData { .. }
        | DetectionError::InvalidParameter { .. } => PyValueError::new_err(err.to_string()),
        DetectionError::DegenerateDistribution { .. }
        | DetectionError::NonFiniteObservation { .. }
        | DetectionError::NonFiniteParameter { .. }
        | DetectionError::DensityOverflow { .. } => PyFloatingPointError::new_err(err.to_string()),
        DetectionError::DeviceBinding(_) | DetectionError::Predictor(_) => {
            PyRuntimeError::new_err(err.to_string())
        }
    }
}

// Accepts float64 or float32 arrays, and torch tensors via `.detach().cpu().numpy()`.
fn extract_f64_array<D: Dimension>(obj: &PyAny, what: &str) -> PyResult<Array<f64, D>> {
    if let Ok(arr) = obj.extract::<&PyArray<f64, D>>() {
        return Ok(arr.readonly().as_array().to_owned());
    }
    if let Ok(arr) = obj.extract::<&PyArray<f32, D>>() {
        let casted = arr
            .cast::<f64>(false)
            .map_err(|e| PyTypeError::new_err(format!("Failed to cast {} to f64: {}", what, e)))?;
        return Ok(casted.readonly().as_array().to_owned());
    }
    if obj.hasattr("detach")? {
        let host = obj.call_method0("detach")?.call_method0("cpu")?.call_method0("numpy")?;
        return extract_f64_array(host, what);
    }
    Err(PyTypeError::new_err(format!(
        "Expected {} as a {}-d float64/float32 numpy array or tensor",
        what,
        D::NDIM.unwrap_or(0)
    )))
}

fn extract_sequence(obj: &PyAny) -> PyResult<Array2<f64>> {
    extract_f64_array(obj, "sequence")
}

fn extract_params(obj: &PyAny) -> PyResult<Array3<f64>> {
    extract_f64_array(obj, "params")
}

/// Wraps a Python callable `model(sequence, device) -> {"params": array}`.
///
/// Gradient tracking maps onto `torch.is_grad_enabled` / `torch.set_grad_enabled`
/// when torch is importable; otherwise it is a no-op.
struct PyPredictor {
    callable: PyObject,
}

impl Predictor for PyPredictor {
    fn predict(
        &self,
        sequence: ArrayView3<'_, f64>,
        device: &dyn ComputeDevice,
    ) -> crate::error::Result<PredictorOutput> {
        Python::with_gil(|py| {
            let input = sequence.to_pyarray(py);
            let output = self.callable.call1(py, (input, device.name()))?;
            let params = output.as_ref(py).get_item("params")?;
            extract_params(params)
        })
        .map(PredictorOutput::new)
        .map_err(|e| DetectionError::Predictor(e.to_string()))
    }

    fn tracking_enabled(&self) -> bool {
        Python::with_gil(|py| {
            py.import("torch")
                .and_then(|torch| torch.call_method0("is_grad_enabled")?.extract::<bool>())
                .unwrap_or(false)
        })
    }

    fn set_tracking_enabled(&self, enabled: bool) {
        Python::with_gil(|py| {
            if let Ok(torch) = py.import("torch") {
                if let Err(e) = torch.call_method1("set_grad_enabled", (enabled,)) {
                    tracing::warn!("failed to toggle torch grad mode: {}", e);
                }
            }
        });
    }
}

fn run_detection(
    py: Python<'_>,
    detector: &ForecastAnomalyDetector,
    sequence: &PyAny,
    predictor: &PyAny,
    device: &str,
) -> PyResult<PyObject> {
    let sequence = Sequence::new(extract_sequence(sequence)?).map_err(detection_error_to_pyerr)?;
    let device = NamedDevice::new(device);

    let result = if let Ok(rolling) = predictor.extract::<PyRef<RollingGaussian>>() {
        detector.detect(&sequence, &rolling.inner, &device)
    } else {
        let wrapped = PyPredictor {
            callable: predictor.into(),
        };
        detector.detect(&sequence, &wrapped, &device)
    };

    result_to_dict(py, &result.map_err(detection_error_to_pyerr)?)
}

fn result_to_dict(py: Python<'_>, result: &DetectionResult) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("outlier_label", result.outlier_label.clone())?;
    dict.set_item("probability", result.probability.clone())?;
    dict.set_item("underflowed", result.underflowed.clone())?;
    Ok(dict.into())
}

/// Score `sequence` (T x D, float64/float32 array or tensor) with `predictor` and flag densities below `prob_threshold`.
#[pyfunction]
#[pyo3(signature = (sequence, predictor, device = "cpu", prob_threshold = 0.01))]
fn detect_anomalies<'py>(
    py: Python<'py>,
    sequence: &'py PyAny,
    predictor: &'py PyAny,
    device: &str,
    prob_threshold: f64,
) -> PyResult<PyObject> {
    let detector = ForecastAnomalyDetector::new(DetectorConfig::with_threshold(prob_threshold))
        .map_err(detection_error_to_pyerr)?;
    run_detection(py, &detector, sequence, predictor, device)
}

/// Python-exposed wrapper around ForecastAnomalyDetector
#[pyclass(name = "ForecastAnomalyDetector")]
pub struct PyForecastAnomalyDetector {
    inner: ForecastAnomalyDetector,
}

#[pymethods]
impl PyForecastAnomalyDetector {
    #[new]
    #[pyo3(signature = (threshold = 0.01, parallel = true, parallel_min_len = 256))]
    fn new(threshold: f64, parallel: bool, parallel_min_len: usize) -> PyResult<Self> {
        let config = DetectorConfig {
            threshold,
            parallel,
            parallel_min_len,
        };
        let inner = ForecastAnomalyDetector::new(config).map_err(detection_error_to_pyerr)?;
        Ok(PyForecastAnomalyDetector { inner })
    }

    #[getter]
    fn threshold(&self) -> f64 {
        self.inner.config().threshold
    }

    #[pyo3(signature = (sequence, predictor, device = "cpu"))]
    fn detect<'py>(
        &self,
        py: Python<'py>,
        sequence: &'py PyAny,
        predictor: &'py PyAny,
        device: &str,
    ) -> PyResult<PyObject> {
        run_detection(py, &self.inner, sequence, predictor, device)
    }
}

/// Rolling-window Gaussian forecaster, usable as a predictor.
#[pyclass]
pub struct RollingGaussian {
    inner: RollingGaussianPredictor,
}

#[pymethods]
impl RollingGaussian {
    #[new]
    #[pyo3(signature = (window = Some(32), min_variance = 1e-6))]
    fn new(window: Option<usize>, min_variance: f64) -> PyResult<Self> {
        let inner = RollingGaussianPredictor::new(window, min_variance).map_err(detection_error_to_pyerr)?;
        Ok(RollingGaussian { inner })
    }

    #[pyo3(signature = (sequence, device = "cpu"))]
    fn __call__<'py>(
        &self,
        py: Python<'py>,
        sequence: PyReadonlyArray3<'py, f64>,
        device: &str,
    ) -> PyResult<PyObject> {
        let output = self
            .inner
            .predict(sequence.as_array(), &NamedDevice::new(device))
            .map_err(detection_error_to_pyerr)?;
        let dict = PyDict::new(py);
        dict.set_item("params", output.params.to_pyarray(py))?;
        Ok(dict.into())
    }
}

/// Precision, recall, F1 and AUROC of a detection result against ground truth.
#[pyfunction]
fn evaluate_labels(
    py: Python<'_>,
    outlier_label: Vec<bool>,
    probability: Vec<f64>,
    truth: Vec<bool>,
) -> PyResult<PyObject> {
    let result = DetectionResult::new(outlier_label, probability, Vec::new());
    let eval = evaluate(&result, &truth).map_err(detection_error_to_pyerr)?;
    let dict = PyDict::new(py);
    dict.set_item("precision", eval.precision)?;
    dict.set_item("recall", eval.recall)?;
    dict.set_item("f1", eval.f1)?;
    dict.set_item("auroc", eval.auroc)?;
    Ok(dict.into())
}

/// A Python module implemented in Rust.
#[pymodule]
fn tsad_rust(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(detect_anomalies, m)?)?;
    m.add_function(wrap_pyfunction!(evaluate_labels, m)?)?;

    m.add_class::<PyForecastAnomalyDetector>()?;
    m.add_class::<RollingGaussian>()?;
    Ok(())
}

use ndarray::{Array3, ArrayView3};

use crate::error::Result;
use crate::models::device::ComputeDevice;

/// What a forecasting model hands back for one prepared sequence.
///
/// `params` is `batch x T x 2D`: the first `D` columns are the predicted mean,
/// the last `D` the predicted log-variance. Row `t` predicts observation `t + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorOutput {
    pub params: Array3<f64>,
}

impl PredictorOutput {
    pub fn new(params: Array3<f64>) -> Self {
        PredictorOutput { params }
    }
}

/// An externally supplied one-step-ahead forecaster.
///
/// Neural, statistical and mocked models all plug in here; the detector never
/// looks inside.
pub trait Predictor {
    /// Run the model on a prepared `batch x T x D` sequence.
    fn predict(
        &self,
        sequence: ArrayView3<'_, f64>,
        device: &dyn ComputeDevice,
    ) -> Result<PredictorOutput>;

    /// Whether the model currently records state for training (gradients etc.).
    fn tracking_enabled(&self) -> bool {
        false
    }

    /// Toggle training-state recording. Models without such state ignore this.
    fn set_tracking_enabled(&self, _enabled: bool) {}
}

impl<P: Predictor + ?Sized> Predictor for &P {
    fn predict(
        &self,
        sequence: ArrayView3<'_, f64>,
        device: &dyn ComputeDevice,
    ) -> Result<PredictorOutput> {
        (**self).predict(sequence, device)
    }

    fn tracking_enabled(&self) -> bool {
        (**self).tracking_enabled()
    }

    fn set_tracking_enabled(&self, enabled: bool) {
        (**self).set_tracking_enabled(enabled)
    }
}

/// Adapts a plain closure into a [`Predictor`].
pub struct FnPredictor<F> {
    f: F,
}

impl<F> FnPredictor<F>
where
    F: Fn(ArrayView3<'_, f64>, &dyn ComputeDevice) -> Result<Array3<f64>>,
{
    pub fn new(f: F) -> Self {
        FnPredictor { f }
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(ArrayView3<'_, f64>, &dyn ComputeDevice) -> Result<Array3<f64>>,
{
    fn predict(
        &self,
        sequence: ArrayView3<'_, f64>,
        device: &dyn ComputeDevice,
    ) -> Result<PredictorOutput> {
        (self.f)(sequence, device).map(PredictorOutput::new)
    }
}

/// Scoped inference-only mode.
///
/// Turns tracking off for the lifetime of the guard and puts back whatever
/// state the predictor had before, on every exit path.
pub struct InferenceMode<'a, P: Predictor + ?Sized> {
    predictor: &'a P,
    previous: bool,
}

impl<'a, P: Predictor + ?Sized> InferenceMode<'a, P> {
    pub fn enter(predictor: &'a P) -> Self {
        let previous = predictor.tracking_enabled();
        predictor.set_tracking_enabled(false);
        InferenceMode {
            predictor,
            previous,
        }
    }

    pub fn predictor(&self) -> &'a P {
        self.predictor
    }
}

impl<P: Predictor + ?Sized> Drop for InferenceMode<'_, P> {
    fn drop(&mut self) {
        self.predictor.set_tracking_enabled(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectionError;
    use crate::models::device::Cpu;
    use std::cell::Cell;

    struct Tracked {
        tracking: Cell<bool>,
        seen_during_predict: Cell<Option<bool>>,
    }

    impl Predictor for Tracked {
        fn predict(
            &self,
            sequence: ArrayView3<'_, f64>,
            _device: &dyn ComputeDevice,
        ) -> Result<PredictorOutput> {
            self.seen_during_predict.set(Some(self.tracking.get()));
            Err(DetectionError::Predictor(format!(
                "no model for shape {:?}",
                sequence.shape()
            )))
        }

        fn tracking_enabled(&self) -> bool {
            self.tracking.get()
        }

        fn set_tracking_enabled(&self, enabled: bool) {
            self.tracking.set(enabled);
        }
    }

    fn call_in_scope(p: &Tracked) -> Result<PredictorOutput> {
        let guard = InferenceMode::enter(p);
        let input = Array3::<f64>::zeros((1, 2, 1));
        guard.predictor().predict(input.view(), &Cpu)
    }

    #[test]
    fn test_inference_mode_restores_on_error() {
        let p = Tracked {
            tracking: Cell::new(true),
            seen_during_predict: Cell::new(None),
        };
        assert!(call_in_scope(&p).is_err());
        assert_eq!(p.seen_during_predict.get(), Some(false));
        assert!(p.tracking.get());
    }

    #[test]
    fn test_inference_mode_keeps_disabled_state() {
        let p = Tracked {
            tracking: Cell::new(false),
            seen_during_predict: Cell::new(None),
        };
        {
            let _guard = InferenceMode::enter(&p);
            assert!(!p.tracking.get());
        }
        assert!(!p.tracking.get());
    }

    #[test]
    fn test_fn_predictor() {
        let p = FnPredictor::new(|seq: ArrayView3<'_, f64>, _d: &dyn ComputeDevice| {
            let (b, t, d) = seq.dim();
            Ok(Array3::zeros((b, t, 2 * d)))
        });
        let input = Array3::<f64>::zeros((1, 4, 3));
        let out = p.predict(input.view(), &Cpu).unwrap();
        assert_eq!(out.params.shape(), &[1, 4, 6]);
        assert!(!p.tracking_enabled());
    }
}

//! Diagonal-covariance Gaussian likelihood of each next observation.
//!
//! Features are scored independently; cross-feature correlation is never
//! modelled. For a single transition the log-density is
//!
//! ```text
//! log p(x) = -0.5 * sum_d [ ((x_d - mu_d) / sigma_d)^2 + 2 ln(sigma_d) + ln(2 pi) ]
//! ```
//!
//! and the density is `exp(log p)`. With many features or tiny variances the
//! exponential can underflow to exactly `0.0`. That is a valid result meaning
//! "observation judged effectively impossible", not a failure; such indices
//! are reported separately so diagnostics can tell them apart. The opposite
//! case, a density too large for `f64` when the std-dev is extremely small, is
//! an error.

use ndarray::ArrayView1;
use rayon::prelude::*;

use crate::error::{DetectionError, Result};
use crate::models::params::GaussianParams;
use crate::models::sequence::Sequence;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Densities for transitions `t -> t + 1`, plus the indices that underflowed.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionDensities {
    pub densities: Vec<f64>,
    pub underflowed: Vec<usize>,
}

/// Closed-form log-density of `x` under `N(mean, diag(std_dev^2))`.
///
/// `timestep` only labels errors. A std-dev that is zero, negative or
/// non-finite has no density and is rejected instead of clamped.
pub fn diagonal_log_density(
    mean: ArrayView1<'_, f64>,
    std_dev: ArrayView1<'_, f64>,
    x: ArrayView1<'_, f64>,
    timestep: usize,
) -> Result<f64> {
    let log_std = std_dev.mapv(f64::ln);
    log_density_with_log_std(mean, std_dev, log_std.view(), x, timestep)
}

// `log_std` is taken as given so a std-dev from `exp(log_var / 2)` never
// round-trips through `ln`.
fn log_density_with_log_std(
    mean: ArrayView1<'_, f64>,
    std_dev: ArrayView1<'_, f64>,
    log_std: ArrayView1<'_, f64>,
    x: ArrayView1<'_, f64>,
    timestep: usize,
) -> Result<f64> {
    let d = x.len();
    if mean.len() != d || std_dev.len() != d || log_std.len() != d {
        return Err(DetectionError::shape(&[d, d], &[mean.len(), std_dev.len()]));
    }
    let mut acc = 0.0;
    for feature in 0..d {
        let (mu, sigma) = (mean[feature], std_dev[feature]);
        if !(sigma > 0.0) || !sigma.is_finite() {
            return Err(DetectionError::DegenerateDistribution {
                timestep,
                feature,
                std_dev: sigma,
            });
        }
        if !mu.is_finite() {
            return Err(DetectionError::NonFiniteParameter { timestep, feature });
        }
        let z = (x[feature] - mu) / sigma;
        acc += z * z + 2.0 * log_std[feature] + LN_2PI;
    }
    Ok(-0.5 * acc)
}

fn transition_density(params: &GaussianParams, sequence: &Sequence, t: usize) -> Result<f64> {
    let log_density = log_density_with_log_std(
        params.mean(t),
        params.std_dev(t),
        params.log_std(t),
        sequence.row(t + 1),
        t,
    )?;
    let density = log_density.exp();
    // Densities above f64::MAX are not representable and would otherwise
    // surface as `inf` in the output.
    if !density.is_finite() {
        return Err(DetectionError::DensityOverflow {
            timestep: t,
            log_density,
        });
    }
    tracing::trace!(t, log_density, density, "scored transition");
    Ok(density)
}

/// Score every transition of `sequence` against the one-step-ahead `params`.
///
/// Row `t` of `params` predicts observation `t + 1`, so the result has
/// `T - 1` entries and entry `i` belongs to timestep `i + 1`. The last row of
/// `params` has no target and is never inspected. When `parallel` is set the
/// transitions are evaluated on the rayon pool; the output is identical, and
/// on failure the error of the earliest failing transition is returned.
pub fn score_transitions(
    params: &GaussianParams,
    sequence: &Sequence,
    parallel: bool,
) -> Result<TransitionDensities> {
    let t_len = sequence.len();
    if t_len < 2 {
        return Err(DetectionError::InsufficientData {
            required: 2,
            got: t_len,
        });
    }
    if params.len() != t_len || params.n_features() != sequence.n_features() {
        return Err(DetectionError::shape(
            &[t_len, sequence.n_features()],
            &[params.len(), params.n_features()],
        ));
    }

    let densities: Vec<f64> = if parallel {
        let scored: Vec<Result<f64>> = (0..t_len - 1)
            .into_par_iter()
            .map(|t| transition_density(params, sequence, t))
            .collect();
        scored.into_iter().collect::<Result<_>>()?
    } else {
        (0..t_len - 1)
            .map(|t| transition_density(params, sequence, t))
            .collect::<Result<_>>()?
    };

    let underflowed: Vec<usize> = densities
        .iter()
        .enumerate()
        .filter_map(|(i, &p)| if p == 0.0 { Some(i) } else { None })
        .collect();
    if !underflowed.is_empty() {
        tracing::warn!(
            count = underflowed.len(),
            first = underflowed[0],
            "density underflowed to 0.0; observation judged effectively impossible"
        );
    }

    Ok(TransitionDensities {
        densities,
        underflowed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2, Array3};

    fn standard_normal_params(t: usize, d: usize) -> GaussianParams {
        GaussianParams::from_parts(Array2::zeros((t, d)), Array2::ones((t, d))).unwrap()
    }

    #[test]
    fn test_standard_normal_at_zero() {
        let lp = diagonal_log_density(
            array![0.0].view(),
            array![1.0].view(),
            array![0.0].view(),
            0,
        )
        .unwrap();
        assert!((lp.exp() - 0.398_942_280_401_432_7).abs() < 1e-12);
    }

    #[test]
    fn test_scaled_normal() {
        // N(1, 2^2) at x = 3 -> z = 1
        let lp = diagonal_log_density(
            array![1.0].view(),
            array![2.0].view(),
            array![3.0].view(),
            0,
        )
        .unwrap();
        let expected = (-0.5f64).exp() / (2.0 * (2.0 * std::f64::consts::PI).sqrt());
        assert!((lp.exp() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_features_multiply() {
        let joint = diagonal_log_density(
            array![0.0, 1.0].view(),
            array![1.0, 0.5].view(),
            array![0.3, 1.2].view(),
            0,
        )
        .unwrap();
        let a = diagonal_log_density(array![0.0].view(), array![1.0].view(), array![0.3].view(), 0).unwrap();
        let b = diagonal_log_density(array![1.0].view(), array![0.5].view(), array![1.2].view(), 0).unwrap();
        assert!((joint - (a + b)).abs() < 1e-12);
    }

    #[test]
    fn test_density_can_exceed_one() {
        let lp = diagonal_log_density(array![0.0].view(), array![0.01].view(), array![0.0].view(), 0).unwrap();
        assert!(lp.exp() > 1.0);
    }

    #[test]
    fn test_zero_std_is_degenerate() {
        let err = diagonal_log_density(
            array![0.0, 0.0].view(),
            array![1.0, 0.0].view(),
            array![0.0, 0.0].view(),
            7,
        )
        .unwrap_err();
        assert_eq!(
            err,
            DetectionError::DegenerateDistribution {
                timestep: 7,
                feature: 1,
                std_dev: 0.0
            }
        );
    }

    #[test]
    fn test_nan_std_is_degenerate() {
        let err = diagonal_log_density(array![0.0].view(), array![f64::NAN].view(), array![0.0].view(), 0);
        assert!(matches!(err, Err(DetectionError::DegenerateDistribution { .. })));
    }

    #[test]
    fn test_infinite_mean_rejected() {
        let err = diagonal_log_density(array![f64::INFINITY].view(), array![1.0].view(), array![0.0].view(), 2);
        assert_eq!(
            err,
            Err(DetectionError::NonFiniteParameter {
                timestep: 2,
                feature: 0
            })
        );
    }

    #[test]
    fn test_score_transitions_offset() {
        let seq = Sequence::new(array![[0.0], [0.0], [5.0]]).unwrap();
        let out = score_transitions(&standard_normal_params(3, 1), &seq, false).unwrap();
        assert_eq!(out.densities.len(), 2);
        assert!((out.densities[0] - 0.398_942_280_401_432_7).abs() < 1e-9);
        assert!((out.densities[1] - 1.486_719_514_734_297_7e-6).abs() < 1e-12);
        assert!(out.underflowed.is_empty());
    }

    #[test]
    fn test_last_row_is_ignored() {
        let seq = Sequence::new(array![[0.0], [0.0]]).unwrap();
        let params = GaussianParams::from_parts(array![[0.0], [0.0]], array![[1.0], [0.0]]).unwrap();
        let out = score_transitions(&params, &seq, false).unwrap();
        assert_eq!(out.densities.len(), 1);
    }

    #[test]
    fn test_underflow_is_reported_not_failed() {
        let seq = Sequence::new(array![[0.0], [1.0e6]]).unwrap();
        let out = score_transitions(&standard_normal_params(2, 1), &seq, false).unwrap();
        assert_eq!(out.densities, vec![0.0]);
        assert_eq!(out.underflowed, vec![0]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let rows: Vec<Vec<f64>> = (0..500).map(|i| vec![(i as f64 * 0.37).sin(), (i as f64).cos()]).collect();
        let seq = Sequence::from_rows(&rows).unwrap();
        let params = GaussianParams::from_parts(
            Array2::from_elem((500, 2), 0.1),
            Array2::from_elem((500, 2), 0.8),
        )
        .unwrap();
        let a = score_transitions(&params, &seq, false).unwrap();
        let b = score_transitions(&params, &seq, true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_degenerate_on_scoring_row_fails() {
        let seq = Sequence::new(array![[0.0], [0.0], [0.0]]).unwrap();
        let params =
            GaussianParams::from_parts(array![[0.0], [0.0], [0.0]], array![[1.0], [0.0], [1.0]]).unwrap();
        let err = score_transitions(&params, &seq, true).unwrap_err();
        assert!(matches!(
            err,
            DetectionError::DegenerateDistribution { timestep: 1, .. }
        ));
    }

    #[test]
    fn test_tiny_std_overflow_is_an_error() {
        let seq = Sequence::new(array![[0.0], [0.0]]).unwrap();
        let params = Array3::from_shape_vec((1, 2, 2), vec![0.0, -1427.0, 0.0, 0.0]).unwrap();
        let params = GaussianParams::extract(params.view(), 2, 1).unwrap();
        let err = score_transitions(&params, &seq, false).unwrap_err();
        match err {
            DetectionError::DensityOverflow {
                timestep,
                log_density,
            } => {
                assert_eq!(timestep, 0);
                assert!((log_density - (713.5 - 0.5 * LN_2PI)).abs() < 1e-9);
            }
            other => panic!("expected DensityOverflow, got {:?}", other),
        }
    }

    #[test]
    fn test_small_std_below_overflow_still_scores() {
        // log-density ~ 699, exp is large but finite
        let seq = Sequence::new(array![[0.0], [0.0]]).unwrap();
        let params = Array3::from_shape_vec((1, 2, 2), vec![0.0, -1400.0, 0.0, 0.0]).unwrap();
        let params = GaussianParams::extract(params.view(), 2, 1).unwrap();
        let out = score_transitions(&params, &seq, false).unwrap();
        assert!(out.densities[0].is_finite());
        assert!(out.densities[0] > 1.0e300);
    }

    #[test]
    fn test_parallel_reports_earliest_failure() {
        let t = 2000;
        let seq = Sequence::new(Array2::zeros((t, 1))).unwrap();
        let mut std_dev = Array2::ones((t, 1));
        std_dev[[3, 0]] = 0.0;
        std_dev[[1500, 0]] = 0.0;
        let params = GaussianParams::from_parts(Array2::zeros((t, 1)), std_dev).unwrap();
        for _ in 0..20 {
            let err = score_transitions(&params, &seq, true).unwrap_err();
            assert!(matches!(
                err,
                DetectionError::DegenerateDistribution { timestep: 3, .. }
            ));
        }
    }

    #[test]
    fn test_single_observation_is_insufficient() {
        let seq = Sequence::new(array![[0.0]]).unwrap();
        let err = score_transitions(&standard_normal_params(1, 1), &seq, false).unwrap_err();
        assert_eq!(
            err,
            DetectionError::InsufficientData {
                required: 2,
                got: 1
            }
        );
    }
}

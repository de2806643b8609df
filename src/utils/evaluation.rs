use serde::{Deserialize, Serialize};

use crate::error::{DetectionError, Result};
use crate::models::detector::DetectionResult;

/// Classification quality of a detection run against known labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// AUROC of `-density` as an anomaly score; 0.5 when only one class is present.
    pub auroc: f64,
}

/// Precision, recall and F1 of `predicted` against `truth`.
pub fn threshold_metrics(truth: &[bool], predicted: &[bool]) -> (f64, f64, f64) {
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut fn_count = 0.0;

    for (&label, &flag) in truth.iter().zip(predicted.iter()) {
        match (label, flag) {
            (true, true) => tp += 1.0,
            (false, true) => fp += 1.0,
            (true, false) => fn_count += 1.0,
            (false, false) => {}
        }
    }

    let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
    let recall = if tp + fn_count > 0.0 { tp / (tp + fn_count) } else { 0.0 };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    (precision, recall, f1)
}

/// Area under the ROC curve where a *lower* density means more anomalous.
///
/// Computed from the Mann-Whitney rank statistic with average ranks for ties.
pub fn density_auroc(truth: &[bool], densities: &[f64]) -> f64 {
    let n = truth.len().min(densities.len());
    let (truth, densities) = (&truth[..n], &densities[..n]);
    let n_pos = truth.iter().filter(|&&x| x).count();
    let n_neg = truth.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..densities.len()).collect();
    // descending density == ascending anomaly score
    order.sort_by(|&a, &b| densities[b].total_cmp(&densities[a]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && densities[order[j + 1]] == densities[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if truth[idx] {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    (rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

/// Compare a detection run with per-timestep ground truth (length `T`).
///
/// Timestep 0 has no density and is left out of the AUROC.
pub fn evaluate(result: &DetectionResult, truth: &[bool]) -> Result<Evaluation> {
    if truth.len() != result.outlier_label.len() {
        return Err(DetectionError::shape(
            &[result.outlier_label.len()],
            &[truth.len()],
        ));
    }
    let (precision, recall, f1) = threshold_metrics(truth, &result.outlier_label);
    let auroc = density_auroc(truth.get(1..).unwrap_or(&[]), &result.probability);
    Ok(Evaluation {
        precision,
        recall,
        f1,
        auroc,
    })
}

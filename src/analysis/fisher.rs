// FisherSelector - class separability ranking of (frequency, channel) features
//
//   score[j] = (mean_A[j] - mean_B[j])² / (var_A[j] + var_B[j] + ε)
//
// Variances are unbiased sample variances (zero for a single trial). When
// either class has no trials every score is zero and selection reports no
// discriminative features instead of failing.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::analysis::features::{split_feature_index, FeatureMatrix};
use crate::analysis::stats::{dense_mean, sample_variance};
use crate::signal::TaskClass;

/// One ranked feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectedFeature {
    /// Linear index, frequency fastest
    pub index: usize,
    pub freq_idx: usize,
    pub chan_idx: usize,
    pub freq_hz: f64,
    pub score: f64,
}

/// Scores of every feature in a (frequency, channel) grid
#[derive(Debug, Clone, PartialEq)]
pub struct FisherScores {
    scores: Vec<f64>,
    n_freqs: usize,
    n_channels: usize,
    degenerate: bool,
}

impl FisherScores {
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// True when one class was absent and all scores are zero
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Feature indices by descending score; ties keep ascending index order
    pub fn ranking(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.scores.len()).collect();
        order.sort_by(|&a, &b| {
            self.scores[b]
                .partial_cmp(&self.scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
    }

    /// Top `k` features mapped back to their grid position
    pub fn select(&self, k: usize, freqs: &[f64]) -> Vec<SelectedFeature> {
        let n_freqs = self.n_freqs.max(1);
        self.ranking()
            .into_iter()
            .take(k)
            .map(|index| {
                let (freq_idx, chan_idx) = split_feature_index(index, n_freqs);
                SelectedFeature {
                    index,
                    freq_idx,
                    chan_idx,
                    freq_hz: freqs.get(freq_idx).copied().unwrap_or(f64::NAN),
                    score: self.scores[index],
                }
            })
            .collect()
    }

    /// Highest-scoring feature, if any score is positive
    pub fn best(&self, freqs: &[f64]) -> Option<SelectedFeature> {
        self.select(1, freqs).into_iter().find(|f| f.score > 0.0)
    }

    /// Scores reshaped to a frequency × channel map
    pub fn as_map(&self) -> Array2<f64> {
        let n_freqs = self.n_freqs.max(1);
        Array2::from_shape_fn((self.n_freqs, self.n_channels), |(f, c)| {
            self.scores
                .get(c * n_freqs + f)
                .copied()
                .unwrap_or(0.0)
        })
    }
}

pub struct FisherSelector {
    epsilon: f64,
}

impl FisherSelector {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Score a trial feature matrix
    pub fn score(&self, features: &FeatureMatrix) -> FisherScores {
        let scores = self.score_columns(features.values.view(), &features.labels);
        let degenerate = features.labels.iter().all(|l| *l == TaskClass::Hands)
            || features.labels.iter().all(|l| *l == TaskClass::Feet);
        tracing::debug!(
            "[FisherSelector] scored {} features over {} trials",
            scores.len(),
            features.n_rows()
        );
        FisherScores {
            scores,
            n_freqs: features.n_freqs,
            n_channels: features.n_channels,
            degenerate,
        }
    }

    /// Per-column Fisher scores of a rows × features matrix
    pub fn score_columns(&self, x: ArrayView2<'_, f64>, labels: &[TaskClass]) -> Vec<f64> {
        let rows_a: Vec<usize> = (0..labels.len())
            .filter(|&i| labels[i] == TaskClass::Hands)
            .collect();
        let rows_b: Vec<usize> = (0..labels.len())
            .filter(|&i| labels[i] == TaskClass::Feet)
            .collect();

        if rows_a.is_empty() || rows_b.is_empty() {
            return vec![0.0; x.ncols()];
        }

        x.columns()
            .into_iter()
            .map(|column| {
                let a: Vec<f64> = rows_a.iter().map(|&i| column[i]).collect();
                let b: Vec<f64> = rows_b.iter().map(|&i| column[i]).collect();
                let (mean_a, mean_b) = match (dense_mean(&a), dense_mean(&b)) {
                    (Some(ma), Some(mb)) => (ma, mb),
                    _ => return 0.0,
                };
                let denominator = sample_variance(&a) + sample_variance(&b) + self.epsilon;
                let score = (mean_a - mean_b).powi(2) / denominator;
                if score.is_finite() {
                    score
                } else {
                    0.0
                }
            })
            .collect()
    }
}

// Features - trial and per-window feature vectors from the activity tensor
//
// Feature j of a (frequency, channel) grid is j = channel × n_freqs + freq,
// so frequency varies fastest. Trial features average the transformed power
// over the valid windows of the active phase; sample features keep one row
// per valid active window and only the selected feature columns.

use ndarray::Array2;

use crate::analysis::tensor::ActivityTensor;
use crate::config::FeatureTransform;
use crate::signal::TaskClass;
use crate::telemetry::{Diagnostics, SkipReason, SkipScope};

/// Apply the configured power transform
///
/// Log power is clamped at the smallest positive double so silent bins stay
/// finite.
pub fn transform_power(power: f64, transform: FeatureTransform) -> f64 {
    match transform {
        FeatureTransform::Log => power.max(f64::MIN_POSITIVE).ln(),
        FeatureTransform::Linear => power,
    }
}

/// Linear feature index of a (frequency, channel) pair
pub fn feature_index(freq_idx: usize, chan_idx: usize, n_freqs: usize) -> usize {
    chan_idx * n_freqs + freq_idx
}

/// (frequency, channel) pair of a linear feature index
pub fn split_feature_index(index: usize, n_freqs: usize) -> (usize, usize) {
    (index % n_freqs, index / n_freqs)
}

/// Trials × (frequency, channel) features
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub values: Array2<f64>,
    pub labels: Vec<TaskClass>,
    /// Tensor trial index of each row
    pub trials: Vec<usize>,
    pub n_freqs: usize,
    pub n_channels: usize,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }
}

/// Per-window samples over selected features
#[derive(Debug, Clone)]
pub struct SampleSet {
    /// Windows × selected features
    pub values: Array2<f64>,
    pub labels: Vec<TaskClass>,
    /// Tensor trial index of each row
    pub trials: Vec<usize>,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }
}

/// Builds feature matrices from an activity tensor
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    transform: FeatureTransform,
}

impl FeatureExtractor {
    pub fn new(transform: FeatureTransform) -> Self {
        Self { transform }
    }

    fn active_windows<'a>(
        tensor: &'a ActivityTensor,
        trial: usize,
    ) -> impl Iterator<Item = usize> + 'a {
        tensor
            .active_range(trial)
            .filter(move |&t| tensor.is_valid(t, trial))
    }

    /// One row per trial with a non-empty active phase
    ///
    /// Trials whose active phase has no valid window are dropped and recorded.
    pub fn trial_features(&self, tensor: &ActivityTensor, diagnostics: &Diagnostics) -> FeatureMatrix {
        let n_freqs = tensor.n_freqs();
        let n_channels = tensor.n_channels();
        let n_features = n_freqs * n_channels;

        let mut rows: Vec<f64> = Vec::with_capacity(tensor.n_trials() * n_features);
        let mut labels = Vec::new();
        let mut trials = Vec::new();

        for trial in 0..tensor.n_trials() {
            let windows: Vec<usize> = Self::active_windows(tensor, trial).collect();
            if windows.is_empty() {
                diagnostics.record(
                    SkipScope::Trial {
                        cue_event: tensor.cue_events()[trial],
                    },
                    SkipReason::EmptyActivePhase,
                );
                continue;
            }

            let values = tensor.values();
            let mut row = vec![0.0; n_features];
            for c in 0..n_channels {
                for f in 0..n_freqs {
                    let sum: f64 = windows
                        .iter()
                        .map(|&t| transform_power(values[[t, f, c, trial]], self.transform))
                        .sum();
                    row[feature_index(f, c, n_freqs)] = sum / windows.len() as f64;
                }
            }
            rows.extend(row);
            labels.push(tensor.labels()[trial]);
            trials.push(trial);
        }

        let values = Array2::from_shape_vec((labels.len(), n_features), rows)
            .unwrap_or_else(|_| Array2::zeros((0, n_features)));

        FeatureMatrix {
            values,
            labels,
            trials,
            n_freqs,
            n_channels,
        }
    }

    /// Selected features of every valid active window of one trial
    pub fn trial_samples(&self, tensor: &ActivityTensor, trial: usize, selected: &[usize]) -> Array2<f64> {
        let n_freqs = tensor.n_freqs().max(1);
        let values = tensor.values();
        let windows: Vec<usize> = Self::active_windows(tensor, trial).collect();
        Array2::from_shape_fn((windows.len(), selected.len()), |(row, k)| {
            let (f, c) = split_feature_index(selected[k], n_freqs);
            transform_power(values[[windows[row], f, c, trial]], self.transform)
        })
    }

    /// Per-window samples of all trials, in trial order
    pub fn samples(&self, tensor: &ActivityTensor, selected: &[usize]) -> SampleSet {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        let mut trials = Vec::new();
        for trial in 0..tensor.n_trials() {
            let block = self.trial_samples(tensor, trial, selected);
            for row in block.rows() {
                rows.extend(row.iter().copied());
                labels.push(tensor.labels()[trial]);
                trials.push(trial);
            }
        }
        let values = Array2::from_shape_vec((labels.len(), selected.len()), rows)
            .unwrap_or_else(|_| Array2::zeros((0, selected.len())));
        SampleSet {
            values,
            labels,
            trials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tensor::TrialBlock;
    use crate::signal::ChannelAxis;
    use ndarray::Array3;

    fn tensor() -> ActivityTensor {
        // 2 freqs × 2 channels; value encodes (f, c) plus a post-cue boost
        let make = |label, len: usize, cue_onset, boost: f64| {
            let power = Array3::from_shape_fn((len, 2, 2), |(t, f, c)| {
                let base = 1.0 + f as f64 + 10.0 * c as f64;
                if t >= cue_onset {
                    base * boost
                } else {
                    base
                }
            });
            TrialBlock {
                label,
                cue_onset,
                cue_event: 0,
                power,
            }
        };
        ActivityTensor::from_blocks(
            vec![
                make(TaskClass::Hands, 6, 2, 2.0),
                make(TaskClass::Feet, 4, 1, 1.0),
                make(TaskClass::Feet, 3, 3, 1.0),
            ],
            vec![10.0, 12.0],
            ChannelAxis::numbered(2),
        )
        .unwrap()
    }

    #[test]
    fn test_index_layout_frequency_fastest() {
        assert_eq!(feature_index(1, 0, 5), 1);
        assert_eq!(feature_index(0, 1, 5), 5);
        assert_eq!(split_feature_index(7, 5), (2, 1));
    }

    #[test]
    fn test_trial_features_average_active_phase() {
        let diagnostics = Diagnostics::new();
        let matrix = FeatureExtractor::new(FeatureTransform::Linear).trial_features(&tensor(), &diagnostics);

        // third trial has no active window
        assert_eq!(matrix.n_rows(), 2);
        assert_eq!(matrix.trials, vec![0, 1]);
        assert_eq!(matrix.labels, vec![TaskClass::Hands, TaskClass::Feet]);
        assert_eq!(diagnostics.snapshot()[0].reason, SkipReason::EmptyActivePhase);

        // feature (f=1, c=1) -> index 3, base 12
        assert_eq!(matrix.values[[0, 3]], 24.0);
        assert_eq!(matrix.values[[1, 3]], 12.0);
        assert_eq!(matrix.values[[1, 0]], 1.0);
    }

    #[test]
    fn test_log_transform() {
        assert_eq!(transform_power(1.0, FeatureTransform::Log), 0.0);
        assert!(transform_power(0.0, FeatureTransform::Log).is_finite());
        assert_eq!(transform_power(3.5, FeatureTransform::Linear), 3.5);
    }

    #[test]
    fn test_samples_rows_per_active_window() {
        let samples = FeatureExtractor::new(FeatureTransform::Linear).samples(&tensor(), &[3, 0]);
        // 4 active windows in trial 0, 3 in trial 1, none in trial 2
        assert_eq!(samples.len(), 7);
        assert_eq!(samples.trials, vec![0, 0, 0, 0, 1, 1, 1]);
        assert_eq!(samples.values[[0, 0]], 24.0);
        assert_eq!(samples.values[[0, 1]], 2.0);
        assert_eq!(samples.values[[6, 0]], 12.0);
    }
}

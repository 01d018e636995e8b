// Activity tensor - cue-aligned trials stacked into one 4-D array
//
// Layout is [time-within-trial, frequency, channel, trial]. Trials shorter
// than the longest one are right-padded; padded cells hold 0.0 and are marked
// invalid in the [time, trial] mask, so readers go through `get` (or check
// the mask) instead of trusting raw values.
//
// `labels`, `cue_onsets`, `lengths` and `cue_events` always have one entry
// per trial. `cue_onsets` are 0-based: windows [0, cue_onset) are the
// fixation phase, [cue_onset, length) the active phase.

use std::ops::Range;

use ndarray::{s, Array2, Array3, Array4, ArrayView2, ArrayView4, Axis};

use crate::error::PipelineError;
use crate::signal::{ChannelAxis, TaskClass};

/// One trial's slice of the windowed PSD before stacking
#[derive(Debug, Clone)]
pub struct TrialBlock {
    pub label: TaskClass,
    /// First active-phase window, relative to the trial start
    pub cue_onset: usize,
    /// Index of the cue marker in the session event stream
    pub cue_event: usize,
    /// Time × frequency × channel
    pub power: Array3<f64>,
}

#[derive(Debug, Clone)]
pub struct ActivityTensor {
    values: Array4<f64>,
    valid: Array2<bool>,
    labels: Vec<TaskClass>,
    cue_onsets: Vec<usize>,
    lengths: Vec<usize>,
    cue_events: Vec<usize>,
    freqs: Vec<f64>,
    channels: ChannelAxis,
}

impl ActivityTensor {
    /// Tensor with zero trials over the given axes
    pub fn empty(freqs: Vec<f64>, channels: ChannelAxis) -> Self {
        let n_freqs = freqs.len();
        let n_channels = channels.len();
        Self {
            values: Array4::zeros((0, n_freqs, n_channels, 0)),
            valid: Array2::from_elem((0, 0), false),
            labels: Vec::new(),
            cue_onsets: Vec::new(),
            lengths: Vec::new(),
            cue_events: Vec::new(),
            freqs,
            channels,
        }
    }

    /// Pad and stack trial blocks
    ///
    /// # Errors
    /// `DimensionMismatch` when a block's frequency or channel extent differs
    /// from the axes.
    pub fn from_blocks(
        blocks: Vec<TrialBlock>,
        freqs: Vec<f64>,
        channels: ChannelAxis,
    ) -> Result<Self, PipelineError> {
        if blocks.is_empty() {
            return Ok(Self::empty(freqs, channels));
        }

        let n_freqs = freqs.len();
        let n_channels = channels.len();
        for block in &blocks {
            let (_, bf, bc) = block.power.dim();
            if bf != n_freqs {
                return Err(PipelineError::DimensionMismatch {
                    what: "trial frequency bins",
                    expected: n_freqs,
                    actual: bf,
                });
            }
            if bc != n_channels {
                return Err(PipelineError::DimensionMismatch {
                    what: "trial channels",
                    expected: n_channels,
                    actual: bc,
                });
            }
        }

        let max_len = blocks
            .iter()
            .map(|b| b.power.len_of(Axis(0)))
            .max()
            .unwrap_or(0);
        let n_trials = blocks.len();

        let mut values = Array4::<f64>::zeros((max_len, n_freqs, n_channels, n_trials));
        let mut valid = Array2::from_elem((max_len, n_trials), false);
        let mut labels = Vec::with_capacity(n_trials);
        let mut cue_onsets = Vec::with_capacity(n_trials);
        let mut lengths = Vec::with_capacity(n_trials);
        let mut cue_events = Vec::with_capacity(n_trials);

        for (trial, block) in blocks.into_iter().enumerate() {
            let len = block.power.len_of(Axis(0));
            values
                .slice_mut(s![..len, .., .., trial])
                .assign(&block.power);
            valid.slice_mut(s![..len, trial]).fill(true);
            labels.push(block.label);
            cue_onsets.push(block.cue_onset.min(len));
            lengths.push(len);
            cue_events.push(block.cue_event);
        }

        Ok(Self {
            values,
            valid,
            labels,
            cue_onsets,
            lengths,
            cue_events,
            freqs,
            channels,
        })
    }

    pub fn n_times(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    pub fn n_freqs(&self) -> usize {
        self.freqs.len()
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn n_trials(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Raw values including padding
    pub fn values(&self) -> ArrayView4<'_, f64> {
        self.values.view()
    }

    /// Validity mask [time, trial]
    pub fn valid(&self) -> ArrayView2<'_, bool> {
        self.valid.view()
    }

    pub fn labels(&self) -> &[TaskClass] {
        &self.labels
    }

    pub fn cue_onsets(&self) -> &[usize] {
        &self.cue_onsets
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn cue_events(&self) -> &[usize] {
        &self.cue_events
    }

    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    pub fn channels(&self) -> &ChannelAxis {
        &self.channels
    }

    pub fn is_valid(&self, t: usize, trial: usize) -> bool {
        self.valid.get((t, trial)).copied().unwrap_or(false)
    }

    /// Value at a cell, `None` for padding or out-of-range indices
    pub fn get(&self, t: usize, f: usize, c: usize, trial: usize) -> Option<f64> {
        if !self.is_valid(t, trial) {
            return None;
        }
        self.values.get((t, f, c, trial)).copied()
    }

    /// Trial counts in [hands, feet] order
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0; 2];
        for label in &self.labels {
            counts[label.index()] += 1;
        }
        counts
    }

    /// Trial indices carrying the given label, ascending
    pub fn trials_of(&self, class: TaskClass) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == class)
            .map(|(i, _)| i)
            .collect()
    }

    /// Window range of a trial's active phase
    pub fn active_range(&self, trial: usize) -> Range<usize> {
        self.cue_onsets[trial]..self.lengths[trial]
    }

    /// Indices of frequency bins inside [low, high]
    pub fn freq_indices_in(&self, band: (f64, f64)) -> Vec<usize> {
        self.freqs
            .iter()
            .enumerate()
            .filter(|(_, f)| **f >= band.0 && **f <= band.1)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(label: TaskClass, len: usize, cue_onset: usize, fill: f64) -> TrialBlock {
        TrialBlock {
            label,
            cue_onset,
            cue_event: 0,
            power: Array3::from_elem((len, 3, 2), fill),
        }
    }

    #[test]
    fn test_padding_and_mask() {
        let tensor = ActivityTensor::from_blocks(
            vec![
                block(TaskClass::Hands, 5, 2, 1.0),
                block(TaskClass::Feet, 3, 1, 2.0),
            ],
            vec![8.0, 10.0, 12.0],
            ChannelAxis::numbered(2),
        )
        .unwrap();

        assert_eq!(tensor.n_times(), 5);
        assert_eq!(tensor.n_trials(), 2);
        assert_eq!(tensor.lengths(), &[5, 3]);
        assert_eq!(tensor.get(4, 0, 0, 0), Some(1.0));
        assert_eq!(tensor.get(2, 1, 1, 1), Some(2.0));
        assert_eq!(tensor.get(3, 0, 0, 1), None);
        assert_eq!(tensor.get(9, 0, 0, 0), None);
        assert_eq!(tensor.active_range(0), 2..5);
        assert_eq!(tensor.class_counts(), [1, 1]);
        assert_eq!(tensor.trials_of(TaskClass::Feet), vec![1]);
    }

    #[test]
    fn test_empty_blocks_give_empty_tensor() {
        let tensor =
            ActivityTensor::from_blocks(Vec::new(), vec![8.0], ChannelAxis::numbered(4)).unwrap();
        assert!(tensor.is_empty());
        assert_eq!(tensor.n_times(), 0);
        assert_eq!(tensor.n_channels(), 4);
        assert_eq!(tensor.class_counts(), [0, 0]);
    }

    #[test]
    fn test_block_shape_checked() {
        let err = ActivityTensor::from_blocks(
            vec![block(TaskClass::Hands, 4, 1, 1.0)],
            vec![8.0, 10.0],
            ChannelAxis::numbered(2),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DimensionMismatch { expected: 2, actual: 3, .. }
        ));
    }

    #[test]
    fn test_freq_indices_in_band() {
        let tensor = ActivityTensor::empty(vec![4.0, 8.0, 12.0, 30.0, 32.0], ChannelAxis::numbered(1));
        assert_eq!(tensor.freq_indices_in((8.0, 30.0)), vec![1, 2, 3]);
    }
}

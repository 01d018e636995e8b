// ERDComputer - baseline-relative log power (ERD/ERS)
//
//   baseline[f,c,trial] = mean(Activity[0..ref_len, f, c, trial])   (valid cells)
//   ERD[t,f,c,trial]    = ln(Activity[t,f,c,trial] / baseline[f,c,trial])
//
// Negative values are desynchronization. A cell is missing when the
// activity cell is padding, the baseline is missing, or either value is not
// strictly positive. Every aggregate below skips missing cells.

use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};

use crate::analysis::stats::{mean, median_usize, MissingPolicy};
use crate::analysis::tensor::ActivityTensor;
use crate::config::{BaselinePolicy, ErdConfig};
use crate::signal::{ChannelAxis, TaskClass};
use crate::telemetry::Diagnostics;

/// Most negative cell of the trial-averaged active-phase map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakErd {
    pub value: f64,
    /// Window index within the trial
    pub window: usize,
    pub freq_hz: f64,
    pub channel: usize,
}

/// Band-averaged ERD over time at one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeCourse {
    pub channel: String,
    pub hands: Vec<Option<f64>>,
    pub feet: Vec<Option<f64>>,
}

/// Report-ready ERD summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErdSummary {
    pub channels: Vec<String>,
    pub band: (f64, f64),
    /// Per-channel active-phase ERD of hands trials
    pub hands_map: Vec<Option<f64>>,
    /// Per-channel active-phase ERD of feet trials
    pub feet_map: Vec<Option<f64>>,
    pub time_courses: Vec<TimeCourse>,
    pub peak: Option<PeakErd>,
    /// |ERD(left)| - |ERD(right)| at the reference frequency
    pub lateralization: Option<f64>,
    pub reference_lengths: Vec<usize>,
}

/// ERD values per cell plus the trial metadata needed to aggregate them
#[derive(Debug, Clone)]
pub struct ErdMaps {
    values: Array4<Option<f64>>,
    reference_lengths: Vec<usize>,
    labels: Vec<TaskClass>,
    cue_onsets: Vec<usize>,
    lengths: Vec<usize>,
    freqs: Vec<f64>,
    channels: ChannelAxis,
}

impl ErdMaps {
    pub fn get(&self, t: usize, f: usize, c: usize, trial: usize) -> Option<f64> {
        self.values.get((t, f, c, trial)).copied().flatten()
    }

    pub fn values(&self) -> &Array4<Option<f64>> {
        &self.values
    }

    pub fn reference_lengths(&self) -> &[usize] {
        &self.reference_lengths
    }

    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    pub fn channels(&self) -> &ChannelAxis {
        &self.channels
    }

    fn n_times(&self) -> usize {
        self.values.dim().0
    }

    fn band_indices(&self, band: (f64, f64)) -> Vec<usize> {
        self.freqs
            .iter()
            .enumerate()
            .filter(|(_, f)| **f >= band.0 && **f <= band.1)
            .map(|(i, _)| i)
            .collect()
    }

    fn trials_of(&self, class: TaskClass) -> impl Iterator<Item = usize> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(move |(_, label)| **label == class)
            .map(|(i, _)| i)
    }

    /// Per-channel mean over trials of `class`, their active phase and `band`
    pub fn class_map(&self, class: TaskClass, band: (f64, f64)) -> Vec<Option<f64>> {
        let bins = self.band_indices(band);
        let bins = &bins;
        let trials: Vec<usize> = self.trials_of(class).collect();
        (0..self.channels.len())
            .map(|c| {
                let cells = trials.iter().flat_map(move |&trial| {
                    (self.cue_onsets[trial]..self.lengths[trial])
                        .flat_map(move |t| bins.iter().map(move |&f| (t, f)))
                        .map(move |(t, f)| self.get(t, f, c, trial))
                });
                mean(cells, MissingPolicy::Skip)
            })
            .collect()
    }

    /// Mean over `band` and trials of `class` at one channel, per window
    pub fn time_course(&self, class: TaskClass, channel: usize, band: (f64, f64)) -> Vec<Option<f64>> {
        let bins = self.band_indices(band);
        let bins = &bins;
        let trials: Vec<usize> = self.trials_of(class).collect();
        (0..self.n_times())
            .map(|t| {
                let cells = trials.iter().flat_map(move |&trial| {
                    bins.iter().map(move |&f| self.get(t, f, channel, trial))
                });
                mean(cells, MissingPolicy::Skip)
            })
            .collect()
    }

    /// Mean over all trials, per (time, frequency, channel)
    pub fn trial_average(&self) -> Array3<Option<f64>> {
        let (n_t, n_f, n_c, n_trials) = self.values.dim();
        Array3::from_shape_fn((n_t, n_f, n_c), |(t, f, c)| {
            mean(
                (0..n_trials).map(|trial| self.get(t, f, c, trial)),
                MissingPolicy::Skip,
            )
        })
    }

    /// Window where the active phase of the averaged map begins
    fn active_start(&self) -> usize {
        median_usize(&self.cue_onsets).unwrap_or(0)
    }

    /// Minimum of the trial-averaged map over the active phase
    pub fn peak(&self) -> Option<PeakErd> {
        let average = self.trial_average();
        let start = self.active_start();
        average
            .indexed_iter()
            .filter(|((t, _, _), _)| *t >= start)
            .filter_map(|((t, f, c), value)| value.map(|v| (t, f, c, v)))
            .fold(None, |best: Option<PeakErd>, (t, f, c, v)| match best {
                Some(b) if b.value <= v => Some(b),
                _ => Some(PeakErd {
                    value: v,
                    window: t,
                    freq_hz: self.freqs[f],
                    channel: c,
                }),
            })
    }

    /// Difference in active-phase |ERD| between two channels at one bin
    pub fn lateralization(&self, left: usize, right: usize, freq_idx: usize) -> Option<f64> {
        let average = self.trial_average();
        let start = self.active_start();
        let active_mean = |c: usize| {
            mean(
                (start..self.n_times()).map(|t| average.get((t, freq_idx, c)).copied().flatten()),
                MissingPolicy::Skip,
            )
        };
        Some(active_mean(left)?.abs() - active_mean(right)?.abs())
    }
}

/// Computes ERD maps and their summary from an activity tensor
pub struct ErdComputer {
    config: ErdConfig,
}

impl ErdComputer {
    pub fn new(config: &ErdConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Baseline length of every trial, clamped to [1, trial length]
    pub fn reference_lengths(&self, tensor: &ActivityTensor) -> Vec<usize> {
        let population = median_usize(tensor.cue_onsets()).unwrap_or(1);
        tensor
            .cue_onsets()
            .iter()
            .zip(tensor.lengths())
            .map(|(&cue_onset, &length)| {
                let requested = match self.config.baseline {
                    BaselinePolicy::PerTrial => cue_onset,
                    BaselinePolicy::Median => population,
                    BaselinePolicy::Fixed { windows } => windows,
                };
                requested.clamp(1, length.max(1))
            })
            .collect()
    }

    pub fn compute(&self, tensor: &ActivityTensor) -> ErdMaps {
        let reference_lengths = self.reference_lengths(tensor);
        let (n_t, n_f, n_c, n_trials) = tensor.values().dim();

        let baseline = Array3::from_shape_fn((n_f, n_c, n_trials), |(f, c, trial)| {
            mean(
                (0..reference_lengths[trial]).map(|t| tensor.get(t, f, c, trial)),
                MissingPolicy::Skip,
            )
        });

        let values = Array4::from_shape_fn((n_t, n_f, n_c, n_trials), |(t, f, c, trial)| {
            let v = tensor.get(t, f, c, trial)?;
            let b = baseline[[f, c, trial]]?;
            if v > 0.0 && b > 0.0 {
                Some((v / b).ln())
            } else {
                None
            }
        });

        tracing::debug!(
            "[ErdComputer] {} trials, baseline policy {:?}",
            n_trials,
            self.config.baseline
        );

        ErdMaps {
            values,
            reference_lengths,
            labels: tensor.labels().to_vec(),
            cue_onsets: tensor.cue_onsets().to_vec(),
            lengths: tensor.lengths().to_vec(),
            freqs: tensor.freqs().to_vec(),
            channels: tensor.channels().clone(),
        }
    }

    /// Maps, time courses at the motor channels, peak and lateralization
    ///
    /// `reference_freq` is the bin used for lateralization (normally the
    /// frequency of the best Fisher feature). Motor channel names that cannot
    /// be resolved are recorded in `diagnostics` and left out.
    pub fn summarize(
        &self,
        maps: &ErdMaps,
        reference_freq: Option<usize>,
        diagnostics: &Diagnostics,
    ) -> ErdSummary {
        let band = self.config.band;
        let motor = &self.config.motor_channels;

        let [left, midline, right] = [&motor.left, &motor.midline, &motor.right]
            .map(|name| maps.channels.resolve(name, diagnostics).map(|c| (name, c)));

        let time_courses: Vec<TimeCourse> = [left, midline, right]
            .into_iter()
            .flatten()
            .map(|(name, c)| TimeCourse {
                channel: name.clone(),
                hands: maps.time_course(TaskClass::Hands, c, band),
                feet: maps.time_course(TaskClass::Feet, c, band),
            })
            .collect();

        let lateralization = match (reference_freq, left, right) {
            (Some(f), Some((_, left)), Some((_, right))) => maps.lateralization(left, right, f),
            _ => None,
        };

        ErdSummary {
            channels: maps.channels.labels().to_vec(),
            band,
            hands_map: maps.class_map(TaskClass::Hands, band),
            feet_map: maps.class_map(TaskClass::Feet, band),
            time_courses,
            peak: maps.peak(),
            lateralization,
            reference_lengths: maps.reference_lengths.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tensor::TrialBlock;
    use crate::telemetry::SkipReason;
    use ndarray::Array3;

    fn labeled_axis() -> ChannelAxis {
        ChannelAxis::new(vec!["C3".into(), "Cz".into(), "C4".into()])
    }

    fn tensor_from(blocks: Vec<TrialBlock>) -> ActivityTensor {
        ActivityTensor::from_blocks(blocks, vec![8.0, 12.0, 40.0], labeled_axis()).unwrap()
    }

    fn constant_block(label: TaskClass, len: usize) -> TrialBlock {
        TrialBlock {
            label,
            cue_onset: 4,
            cue_event: 0,
            power: Array3::from_elem((len, 3, 3), 5.0),
        }
    }

    /// Block whose C3 power halves after the cue
    fn desync_block(label: TaskClass) -> TrialBlock {
        let mut power = Array3::from_elem((10, 3, 3), 4.0);
        for t in 4..10 {
            for f in 0..3 {
                power[[t, f, 0]] = 2.0;
            }
        }
        TrialBlock {
            label,
            cue_onset: 4,
            cue_event: 0,
            power,
        }
    }

    #[test]
    fn test_constant_activity_gives_zero_erd() {
        let tensor = tensor_from(vec![
            constant_block(TaskClass::Hands, 10),
            constant_block(TaskClass::Feet, 8),
        ]);
        let computer = ErdComputer::new(&ErdConfig::default());
        let maps = computer.compute(&tensor);

        for t in 0..10 {
            for f in 0..3 {
                for c in 0..3 {
                    assert_eq!(maps.get(t, f, c, 0), Some(0.0));
                }
            }
        }
        // padding stays missing
        assert_eq!(maps.get(9, 0, 0, 1), None);

        let summary = computer.summarize(&maps, Some(1), &Diagnostics::new());
        assert!(summary.hands_map.iter().all(|v| *v == Some(0.0)));
        assert!(summary.feet_map.iter().all(|v| *v == Some(0.0)));
        assert_eq!(summary.lateralization, Some(0.0));
    }

    #[test]
    fn test_desynchronization_is_negative() {
        let tensor = tensor_from(vec![desync_block(TaskClass::Hands)]);
        let computer = ErdComputer::new(&ErdConfig::default());
        let maps = computer.compute(&tensor);

        let expected = 0.5f64.ln();
        assert!((maps.get(6, 0, 0, 0).unwrap() - expected).abs() < 1e-12);
        assert_eq!(maps.get(6, 0, 1, 0), Some(0.0));

        let peak = maps.peak().unwrap();
        assert_eq!(peak.channel, 0);
        assert!((peak.value - expected).abs() < 1e-12);

        let hands = maps.class_map(TaskClass::Hands, (8.0, 30.0));
        assert!((hands[0].unwrap() - expected).abs() < 1e-12);
        assert_eq!(hands[2], Some(0.0));
        assert!(maps.class_map(TaskClass::Feet, (8.0, 30.0)).iter().all(Option::is_none));

        let lateralization = maps.lateralization(0, 2, 0).unwrap();
        assert!((lateralization - expected.abs()).abs() < 1e-12);
    }

    #[test]
    fn test_zero_baseline_is_missing() {
        let mut block = constant_block(TaskClass::Hands, 6);
        block.power.fill(0.0);
        let tensor = tensor_from(vec![block]);
        let maps = ErdComputer::new(&ErdConfig::default()).compute(&tensor);
        assert!(maps.values().iter().all(Option::is_none));
        assert_eq!(maps.peak(), None);
    }

    #[test]
    fn test_reference_length_clamped() {
        let mut short = constant_block(TaskClass::Hands, 3);
        short.cue_onset = 0;
        let tensor = tensor_from(vec![short, constant_block(TaskClass::Feet, 10)]);

        let mut config = ErdConfig::default();
        let per_trial = ErdComputer::new(&config).reference_lengths(&tensor);
        assert_eq!(per_trial, vec![1, 4]);

        config.baseline = BaselinePolicy::Fixed { windows: 50 };
        let fixed = ErdComputer::new(&config).reference_lengths(&tensor);
        assert_eq!(fixed, vec![3, 10]);
    }

    #[test]
    fn test_summary_records_each_channel_fallback_once() {
        let blocks = vec![TrialBlock {
            label: TaskClass::Hands,
            cue_onset: 4,
            cue_event: 0,
            power: Array3::from_elem((10, 3, 12), 5.0),
        }];
        let tensor =
            ActivityTensor::from_blocks(blocks, vec![8.0, 12.0, 40.0], ChannelAxis::numbered(12))
                .unwrap();
        let computer = ErdComputer::new(&ErdConfig::default());
        let diagnostics = Diagnostics::new();
        let summary = computer.summarize(&computer.compute(&tensor), Some(0), &diagnostics);

        assert_eq!(summary.time_courses.len(), 3);
        assert_eq!(summary.lateralization, Some(0.0));
        let fallbacks: Vec<SkipReason> = diagnostics
            .snapshot()
            .into_iter()
            .map(|event| event.reason)
            .collect();
        assert_eq!(
            fallbacks,
            vec![
                SkipReason::ChannelFallback { index: 6 },
                SkipReason::ChannelFallback { index: 8 },
                SkipReason::ChannelFallback { index: 10 },
            ]
        );
    }

    #[test]
    fn test_time_course_length() {
        let tensor = tensor_from(vec![desync_block(TaskClass::Feet)]);
        let maps = ErdComputer::new(&ErdConfig::default()).compute(&tensor);
        let course = maps.time_course(TaskClass::Feet, 0, (8.0, 30.0));
        assert_eq!(course.len(), 10);
        assert_eq!(course[0], Some(0.0));
        assert!(course[9].unwrap() < 0.0);
    }
}

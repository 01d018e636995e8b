//! Synthetic motor-imagery sessions.
//!
//! Every channel carries a mu rhythm plus white noise. During the cue and
//! feedback phases of a trial the rhythm is attenuated on the channels that
//! desynchronize for the imagined movement: C3 and C4 for hands, Cz for
//! feet. Marker streams follow the cue-based protocol (fixation, cue,
//! feedback) so the output goes through the real segmentation path.

use std::f64::consts::PI;

use ndarray::{Array2, Array3};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::analysis::tensor::{ActivityTensor, TrialBlock};
use crate::config::ProtocolConfig;
use crate::signal::{ChannelAxis, EventMarker, Run, Signal, TaskClass};

/// Labels of the 16-channel sensorimotor montage
const MOTOR_MONTAGE: [&str; 16] = [
    "Fz", "FC3", "FC1", "FCz", "FC2", "FC4", "C3", "C1", "Cz", "C2", "C4", "CP3", "CP1", "CPz",
    "CP2", "CP4",
];

const C3: usize = 6;
const CZ: usize = 8;
const C4: usize = 10;

pub fn motor_montage() -> ChannelAxis {
    ChannelAxis::new(MOTOR_MONTAGE.iter().map(|s| s.to_string()).collect())
}

/// Timing and signal shape of generated sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub sample_rate: f64,
    pub lead_in_secs: f64,
    pub fixation_secs: f64,
    pub cue_secs: f64,
    pub feedback_secs: f64,
    pub iti_secs: f64,
    pub tail_secs: f64,
    /// Mu rhythm frequency (Hz)
    pub mu_hz: f64,
    pub mu_amplitude: f64,
    /// Gain applied to the rhythm of desynchronizing channels, in (0, 1]
    pub attenuation: f64,
    pub noise_std: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sample_rate: 512.0,
            lead_in_secs: 1.0,
            fixation_secs: 2.0,
            cue_secs: 1.0,
            feedback_secs: 4.0,
            iti_secs: 1.5,
            tail_secs: 2.0,
            mu_hz: 10.0,
            mu_amplitude: 4.0,
            attenuation: 0.3,
            noise_std: 1.0,
        }
    }
}

impl SyntheticConfig {
    fn samples(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate).round() as usize
    }
}

/// Standard normal sample (Box-Muller)
pub fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn desynchronizing_channels(label: TaskClass) -> &'static [usize] {
    match label {
        TaskClass::Hands => &[C3, C4],
        TaskClass::Feet => &[CZ],
    }
}

/// Seeded generator of runs with correct marker streams
pub struct SessionGenerator {
    config: SyntheticConfig,
    protocol: ProtocolConfig,
    rng: StdRng,
}

impl SessionGenerator {
    pub fn new(config: SyntheticConfig, protocol: &ProtocolConfig, seed: u64) -> Self {
        Self {
            config,
            protocol: protocol.clone(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// One run with a trial per label, in the given order
    pub fn run(&mut self, id: &str, labels: &[TaskClass]) -> Run {
        let cfg = &self.config;
        let fs = cfg.sample_rate;
        let lead_in = cfg.samples(cfg.lead_in_secs);
        let fixation = cfg.samples(cfg.fixation_secs);
        let cue = cfg.samples(cfg.cue_secs);
        let feedback = cfg.samples(cfg.feedback_secs);
        let trial_len = fixation + cue + feedback + cfg.samples(cfg.iti_secs);
        let n_samples = lead_in + labels.len() * trial_len + cfg.samples(cfg.tail_secs);
        let n_channels = MOTOR_MONTAGE.len();

        let mut gain = Array2::<f64>::from_elem((n_samples, n_channels), cfg.mu_amplitude);
        let mut events = Vec::with_capacity(labels.len() * 3);

        for (k, &label) in labels.iter().enumerate() {
            let start = lead_in + k * trial_len;
            let cue_start = start + fixation;
            let feedback_start = cue_start + cue;
            let class_code = match label {
                TaskClass::Hands => self.protocol.class_a_code,
                TaskClass::Feet => self.protocol.class_b_code,
            };
            events.push(EventMarker::new(self.protocol.fixation_code, start, fixation));
            events.push(EventMarker::new(class_code, cue_start, cue));
            events.push(EventMarker::new(self.protocol.feedback_code, feedback_start, feedback));

            for &c in desynchronizing_channels(label) {
                for s in cue_start..feedback_start + feedback {
                    gain[[s, c]] *= cfg.attenuation;
                }
            }
        }

        let phases: Vec<f64> = (0..n_channels)
            .map(|_| 2.0 * PI * self.rng.gen::<f64>())
            .collect();
        let omega = 2.0 * PI * cfg.mu_hz / fs;
        let noise_std = cfg.noise_std;

        let mut data = Array2::<f64>::zeros((n_samples, n_channels));
        for i in 0..n_samples {
            for c in 0..n_channels {
                let rhythm = gain[[i, c]] * (omega * i as f64 + phases[c]).sin();
                data[[i, c]] = rhythm + noise_std * gaussian(&mut self.rng);
            }
        }

        Run {
            id: id.to_string(),
            signal: Signal::new(data, fs, motor_montage()),
            events,
        }
    }

    /// Run with `trials_per_class` trials of each class in shuffled order
    pub fn balanced_run(&mut self, id: &str, trials_per_class: usize) -> Run {
        let mut labels: Vec<TaskClass> = TaskClass::ORDER
            .iter()
            .flat_map(|&class| std::iter::repeat(class).take(trials_per_class))
            .collect();
        labels.shuffle(&mut self.rng);
        self.run(id, &labels)
    }

    /// Several balanced runs named `<prefix>-<n>`
    pub fn session(&mut self, prefix: &str, n_runs: usize, trials_per_class: usize) -> Vec<Run> {
        (0..n_runs)
            .map(|n| self.balanced_run(&format!("{}-{}", prefix, n + 1), trials_per_class))
            .collect()
    }
}

/// Tensor-level scenario: hands trials double their post-cue power on C3
///
/// Trials alternate hands/feet, 40 windows each with the active phase from
/// window 16. Power is 1.0 with multiplicative log-normal noise on every
/// cell; channel 1 (Cz) and feet trials never change.
pub fn erd_tensor(trials_per_class: usize, seed: u64) -> ActivityTensor {
    const LEN: usize = 40;
    const CUE_ONSET: usize = 16;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut blocks = Vec::with_capacity(2 * trials_per_class);
    for trial in 0..2 * trials_per_class {
        let label = TaskClass::ORDER[trial % 2];
        let mut power = Array3::<f64>::zeros((LEN, 2, 2));
        for ((t, _, c), cell) in power.indexed_iter_mut() {
            let boost = if label == TaskClass::Hands && c == 0 && t >= CUE_ONSET {
                2.0
            } else {
                1.0
            };
            *cell = boost * (0.1 * gaussian(&mut rng)).exp();
        }
        blocks.push(TrialBlock {
            label,
            cue_onset: CUE_ONSET,
            cue_event: trial,
            power,
        });
    }

    let channels = ChannelAxis::new(vec!["C3".to_string(), "Cz".to_string()]);
    ActivityTensor::from_blocks(blocks, vec![10.0, 12.0], channels)
        .unwrap_or_else(|_| ActivityTensor::empty(vec![10.0, 12.0], ChannelAxis::numbered(2)))
}

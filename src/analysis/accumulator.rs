// EvidenceAccumulator - threshold-gated exponential smoothing of posteriors
//
// State machine per trial:
//
//   Accumulating --P[hands] >= θ--> Decided(hands)
//   Accumulating --P[feet]  >= θ--> Decided(feet)
//   Accumulating --exhausted-----> TimedOut
//
// Each sample updates P = α·P + (1 - α)·posterior starting from (0.5, 0.5).
// Hands is checked first, so it wins if both cross on the same sample.
// Samples are consumed strictly in order and nothing is carried between
// trials.

use serde::{Deserialize, Serialize};

use crate::config::AccumulatorConfig;
use crate::signal::TaskClass;

const NEUTRAL_PRIOR: [f64; 2] = [0.5, 0.5];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulatorState {
    Accumulating,
    Decided,
    TimedOut,
}

/// Threshold crossing of one trial
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub label: TaskClass,
    /// 0-based index of the deciding sample, counted from cue onset
    pub sample_index: usize,
    /// Seconds from cue onset to the end of the deciding window
    pub latency: f64,
    /// Smoothed evidence at the decision
    pub evidence: [f64; 2],
}

/// Final result of replaying one trial
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrialOutcome {
    Decided(Decision),
    TimedOut { samples: usize },
}

impl TrialOutcome {
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            TrialOutcome::Decided(decision) => Some(decision),
            TrialOutcome::TimedOut { .. } => None,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        match self {
            TrialOutcome::Decided(_) => AccumulatorState::Decided,
            TrialOutcome::TimedOut { .. } => AccumulatorState::TimedOut,
        }
    }
}

/// Accumulation parameters shared by all trials
#[derive(Debug, Clone, Copy)]
pub struct EvidenceAccumulator {
    alpha: f64,
    threshold: f64,
    /// Seconds per sample window
    window_shift: f64,
}

impl EvidenceAccumulator {
    /// # Arguments
    /// * `config` - Smoothing factor α and threshold θ
    /// * `window_shift` - Seconds between consecutive samples
    pub fn new(config: &AccumulatorConfig, window_shift: f64) -> Self {
        Self {
            alpha: config.alpha,
            threshold: config.threshold,
            window_shift,
        }
    }

    /// Fresh per-trial state at the neutral prior
    pub fn start(&self) -> Accumulation {
        Accumulation {
            params: *self,
            evidence: NEUTRAL_PRIOR,
            consumed: 0,
            decision: None,
        }
    }

    /// Run one trial's posterior sequence to a decision or timeout
    ///
    /// Samples after the decision are not consumed.
    pub fn replay<I>(&self, posteriors: I) -> TrialOutcome
    where
        I: IntoIterator<Item = [f64; 2]>,
    {
        let mut accumulation = self.start();
        for posterior in posteriors {
            if accumulation.step(posterior) == AccumulatorState::Decided {
                break;
            }
        }
        accumulation.finish()
    }
}

/// In-flight accumulation for one trial
#[derive(Debug, Clone)]
pub struct Accumulation {
    params: EvidenceAccumulator,
    evidence: [f64; 2],
    consumed: usize,
    decision: Option<Decision>,
}

impl Accumulation {
    pub fn evidence(&self) -> [f64; 2] {
        self.evidence
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn state(&self) -> AccumulatorState {
        if self.decision.is_some() {
            AccumulatorState::Decided
        } else {
            AccumulatorState::Accumulating
        }
    }

    /// Feed the next posterior; a decided accumulation ignores further input
    pub fn step(&mut self, posterior: [f64; 2]) -> AccumulatorState {
        if self.decision.is_some() {
            return AccumulatorState::Decided;
        }

        let alpha = self.params.alpha;
        for (p, current) in self.evidence.iter_mut().zip(posterior) {
            *p = alpha * *p + (1.0 - alpha) * current;
        }
        let index = self.consumed;
        self.consumed += 1;

        let threshold = self.params.threshold;
        let label = if self.evidence[TaskClass::Hands.index()] >= threshold {
            Some(TaskClass::Hands)
        } else if self.evidence[TaskClass::Feet.index()] >= threshold {
            Some(TaskClass::Feet)
        } else {
            None
        };

        if let Some(label) = label {
            self.decision = Some(Decision {
                label,
                sample_index: index,
                latency: self.consumed as f64 * self.params.window_shift,
                evidence: self.evidence,
            });
            return AccumulatorState::Decided;
        }
        AccumulatorState::Accumulating
    }

    /// Close the trial; an undecided accumulation times out
    pub fn finish(self) -> TrialOutcome {
        match self.decision {
            Some(decision) => TrialOutcome::Decided(decision),
            None => TrialOutcome::TimedOut {
                samples: self.consumed,
            },
        }
    }
}

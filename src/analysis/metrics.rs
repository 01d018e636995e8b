// MetricsEngine - single-sample and trial-level evaluation statistics
//
// Single-sample accuracy counts every per-window prediction and ignores the
// accumulator. Trial accuracy counts correct decisions over all trials, so a
// timeout is a failure. Latency statistics and the confusion matrix only use
// decided trials.

use serde::{Deserialize, Serialize};

use crate::analysis::accumulator::TrialOutcome;
use crate::analysis::stats::{dense_mean, sample_variance};
use crate::signal::TaskClass;

/// 2×2 counts, rows = true class, columns = predicted, `TaskClass::ORDER`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn from_counts(counts: [[usize; 2]; 2]) -> Self {
        Self { counts }
    }

    pub fn add(&mut self, truth: TaskClass, predicted: TaskClass) {
        self.counts[truth.index()][predicted.index()] += 1;
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn trace(&self) -> usize {
        self.counts[0][0] + self.counts[1][1]
    }

    /// Cohen's kappa, `None` for an empty matrix
    ///
    /// Perfect expected agreement (Pe == 1) is reported as 1.
    pub fn kappa(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let n = total as f64;
        let observed = self.trace() as f64 / n;
        let expected: f64 = (0..2)
            .map(|k| {
                let row: usize = self.counts[k].iter().sum();
                let col: usize = self.counts[0][k] + self.counts[1][k];
                (row as f64 / n) * (col as f64 / n)
            })
            .sum();
        if (1.0 - expected).abs() < f64::EPSILON {
            Some(1.0)
        } else {
            Some((observed - expected) / (1.0 - expected))
        }
    }
}

/// Per-trial result row for reports
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Tensor trial index
    pub trial: usize,
    pub truth: TaskClass,
    pub outcome: TrialOutcome,
    /// Correct single-sample predictions of this trial
    pub samples_correct: usize,
    pub samples_total: usize,
}

impl DecisionRecord {
    pub fn is_correct(&self) -> bool {
        self.outcome
            .decision()
            .map(|d| d.label == self.truth)
            .unwrap_or(false)
    }
}

/// Aggregate evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub n_trials: usize,
    pub n_decided: usize,
    pub n_timeouts: usize,
    /// `None` when no single-sample prediction was made
    pub single_sample_accuracy: Option<f64>,
    /// `None` when there are no trials
    pub trial_accuracy: Option<f64>,
    /// Trial accuracy per class in `TaskClass::ORDER`
    pub class_accuracy: [Option<f64>; 2],
    /// Seconds, over decided trials
    pub mean_latency: Option<f64>,
    pub latency_std: Option<f64>,
    pub confusion: ConfusionMatrix,
    pub kappa: Option<f64>,
}

/// Folds decision records into `EvaluationMetrics`
#[derive(Debug, Default)]
pub struct MetricsEngine {
    records: Vec<DecisionRecord>,
}

impl MetricsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: DecisionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[DecisionRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<DecisionRecord> {
        self.records
    }

    pub fn summarize(&self) -> EvaluationMetrics {
        let n_trials = self.records.len();
        let mut confusion = ConfusionMatrix::default();
        let mut latencies = Vec::new();
        let mut correct = 0usize;
        let mut class_totals = [0usize; 2];
        let mut class_correct = [0usize; 2];
        let mut samples_correct = 0usize;
        let mut samples_total = 0usize;

        for record in &self.records {
            samples_correct += record.samples_correct;
            samples_total += record.samples_total;
            class_totals[record.truth.index()] += 1;

            if let Some(decision) = record.outcome.decision() {
                confusion.add(record.truth, decision.label);
                latencies.push(decision.latency);
                if decision.label == record.truth {
                    correct += 1;
                    class_correct[record.truth.index()] += 1;
                }
            }
        }

        let ratio = |num: usize, den: usize| {
            if den == 0 {
                None
            } else {
                Some(num as f64 / den as f64)
            }
        };

        let n_decided = latencies.len();
        EvaluationMetrics {
            n_trials,
            n_decided,
            n_timeouts: n_trials - n_decided,
            single_sample_accuracy: ratio(samples_correct, samples_total),
            trial_accuracy: ratio(correct, n_trials),
            class_accuracy: [
                ratio(class_correct[0], class_totals[0]),
                ratio(class_correct[1], class_totals[1]),
            ],
            mean_latency: dense_mean(&latencies),
            latency_std: if latencies.is_empty() {
                None
            } else {
                Some(sample_variance(&latencies).sqrt())
            },
            confusion,
            kappa: confusion.kappa(),
        }
    }
}

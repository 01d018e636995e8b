// Classifier - two-class linear discriminant over selected features
//
// The pipeline only relies on the `Discriminant` trait: a fixed class order
// and per-sample posteriors that sum to one. `LinearDiscriminant` is a
// shrinkage LDA:
//
//   Σ  = pooled within-class covariance
//   Σ' = (1 - λ)Σ + λ·(tr(Σ)/d)·I
//   w  = Σ'⁻¹(μ_hands - μ_feet)
//   b  = -w·(μ_hands + μ_feet)/2 + ln(n_hands / n_feet)
//   p(hands | x) = sigmoid(w·x + b)

use nalgebra::{DMatrix, DVector};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::error::PipelineError;
use crate::signal::TaskClass;

/// Output for one feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: TaskClass,
    /// Posterior per class in `Discriminant::classes` order
    pub posterior: [f64; 2],
}

/// Trained two-class model
pub trait Discriminant: Send + Sync {
    /// Column order of `Prediction::posterior`
    fn classes(&self) -> [TaskClass; 2] {
        TaskClass::ORDER
    }

    /// Expected feature vector length
    fn n_features(&self) -> usize;

    /// Classify one feature vector
    fn predict(&self, features: &[f64]) -> Result<Prediction, PipelineError>;

    /// Classify every row of a samples × features matrix
    fn predict_matrix(&self, x: ArrayView2<'_, f64>) -> Result<Vec<Prediction>, PipelineError> {
        x.rows()
            .into_iter()
            .map(|row| {
                let features: Vec<f64> = row.iter().copied().collect();
                self.predict(&features)
            })
            .collect()
    }
}

/// Column of each `TaskClass::ORDER` class in a model's posterior
///
/// # Errors
/// `TrainingFailed` when `classes` does not list both classes exactly once.
pub fn class_columns(classes: [TaskClass; 2]) -> Result<[usize; 2], PipelineError> {
    match TaskClass::ORDER.map(|class| classes.iter().position(|&c| c == class)) {
        [Some(first), Some(second)] => Ok([first, second]),
        _ => Err(PipelineError::TrainingFailed {
            reason: format!("model class order {:?} must list hands and feet once", classes),
        }),
    }
}

/// Posterior reordered from model columns into `TaskClass::ORDER`
pub fn ordered_posterior(posterior: [f64; 2], columns: [usize; 2]) -> [f64; 2] {
    columns.map(|column| posterior[column])
}

/// Shrinkage linear discriminant analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearDiscriminant {
    weights: Vec<f64>,
    bias: f64,
}

impl LinearDiscriminant {
    /// Fit the discriminant
    ///
    /// # Arguments
    /// * `x` - Samples × features
    /// * `labels` - One label per sample
    /// * `config` - Shrinkage setting
    ///
    /// # Errors
    /// * `SingleClass` - a class has no samples
    /// * `DimensionMismatch` - label count differs from sample count
    /// * `TrainingFailed` - no features, or the covariance cannot be solved
    pub fn train(
        x: ArrayView2<'_, f64>,
        labels: &[TaskClass],
        config: &ClassifierConfig,
    ) -> Result<Self, PipelineError> {
        let (n, d) = x.dim();
        if labels.len() != n {
            return Err(PipelineError::DimensionMismatch {
                what: "training labels",
                expected: n,
                actual: labels.len(),
            });
        }

        let n_hands = labels.iter().filter(|l| **l == TaskClass::Hands).count();
        let n_feet = n - n_hands;
        if n_hands == 0 || n_feet == 0 {
            return Err(PipelineError::SingleClass {
                hands: n_hands,
                feet: n_feet,
            });
        }
        if d == 0 {
            return Err(PipelineError::TrainingFailed {
                reason: "no features selected".to_string(),
            });
        }

        let rows: Vec<DVector<f64>> = x
            .rows()
            .into_iter()
            .map(|row| DVector::from_iterator(d, row.iter().copied()))
            .collect();

        let mut mean_hands = DVector::<f64>::zeros(d);
        let mut mean_feet = DVector::<f64>::zeros(d);
        for (row, label) in rows.iter().zip(labels) {
            match label {
                TaskClass::Hands => mean_hands += row,
                TaskClass::Feet => mean_feet += row,
            }
        }
        mean_hands /= n_hands as f64;
        mean_feet /= n_feet as f64;

        let mut scatter = DMatrix::<f64>::zeros(d, d);
        for (row, label) in rows.iter().zip(labels) {
            let centered = match label {
                TaskClass::Hands => row - &mean_hands,
                TaskClass::Feet => row - &mean_feet,
            };
            scatter += &centered * centered.transpose();
        }
        let covariance = scatter / (n.saturating_sub(2).max(1)) as f64;

        let lambda = config.shrinkage.clamp(0.0, 1.0);
        let nu = {
            let trace = covariance.trace() / d as f64;
            if trace > 0.0 {
                trace
            } else {
                1.0
            }
        };
        let shrunk = covariance * (1.0 - lambda) + DMatrix::<f64>::identity(d, d) * (lambda * nu);

        let cholesky = shrunk.cholesky().ok_or_else(|| PipelineError::TrainingFailed {
            reason: "covariance is not positive definite".to_string(),
        })?;
        let weights = cholesky.solve(&(&mean_hands - &mean_feet));
        let midpoint = (&mean_hands + &mean_feet) * 0.5;
        let bias = -weights.dot(&midpoint) + (n_hands as f64 / n_feet as f64).ln();

        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(PipelineError::TrainingFailed {
                reason: "non-finite discriminant".to_string(),
            });
        }

        tracing::info!(
            "[Classifier] trained LDA on {} samples ({} hands, {} feet), {} features",
            n,
            n_hands,
            n_feet,
            d
        );

        Ok(Self {
            weights: weights.iter().copied().collect(),
            bias,
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Signed distance w·x + b (positive favours hands)
    pub fn decision_value(&self, features: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Discriminant for LinearDiscriminant {
    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn predict(&self, features: &[f64]) -> Result<Prediction, PipelineError> {
        if features.len() != self.weights.len() {
            return Err(PipelineError::DimensionMismatch {
                what: "feature vector",
                expected: self.weights.len(),
                actual: features.len(),
            });
        }

        let p_hands = sigmoid(self.decision_value(features));
        let label = if p_hands >= 0.5 {
            TaskClass::Hands
        } else {
            TaskClass::Feet
        };
        Ok(Prediction {
            label,
            posterior: [p_hands, 1.0 - p_hands],
        })
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;

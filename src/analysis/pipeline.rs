// Subject pipeline - featurize, segment, analyse, train and evaluate
//
// Stages run in order for one subject. Parallel work is limited to units
// that never interact: runs during featurization, trials during
// single-sample prediction, and subjects in a batch. Each trial's evidence
// accumulation stays a sequential scan.

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::Serialize;

use crate::analysis::accumulator::EvidenceAccumulator;
use crate::analysis::classifier::{class_columns, ordered_posterior, Discriminant, LinearDiscriminant};
use crate::analysis::erd::{ErdComputer, ErdSummary};
use crate::analysis::events::{EventAligner, MappingDirection, WindowedEvent};
use crate::analysis::features::{feature_index, FeatureExtractor};
use crate::analysis::fisher::{FisherSelector, SelectedFeature};
use crate::analysis::metrics::{DecisionRecord, EvaluationMetrics, MetricsEngine};
use crate::analysis::segmentation::TrialSegmenter;
use crate::analysis::spectrogram::{SpectralFeaturizer, WindowedPsd};
use crate::analysis::tensor::ActivityTensor;
use crate::config::{FeatureTransform, PipelineConfig};
use crate::error::{log_pipeline_error, ErrorCode, PipelineError};
use crate::signal::{Run, SpatialFilter, TaskClass};
use crate::telemetry::{Diagnostics, SkipEvent, SkipReason, SkipScope};

/// Concatenated PSD of a session with its markers on the same timeline
#[derive(Debug, Clone)]
pub struct Session {
    pub psd: WindowedPsd,
    pub events: Vec<WindowedEvent>,
}

/// Offline analysis outputs for plotting and reporting
#[derive(Debug, Clone, Serialize)]
pub struct FeatureAnalysis {
    /// Trials per class in [hands, feet] order
    pub class_counts: [usize; 2],
    pub freqs: Vec<f64>,
    pub channels: Vec<String>,
    /// Fisher score per frequency × channel
    pub fisher_map: Array2<f64>,
    pub selected: Vec<SelectedFeature>,
    pub erd: ErdSummary,
}

/// Single-sample and accumulated evaluation of one session
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub metrics: EvaluationMetrics,
    pub records: Vec<DecisionRecord>,
    /// Seconds per sample window
    pub window_shift: f64,
}

/// Per-subject result of a batch
#[derive(Debug, Clone, Serialize)]
pub struct SubjectReport {
    pub id: String,
    pub analysis: FeatureAnalysis,
    pub evaluation: EvaluationReport,
    pub skips: Vec<SkipEvent>,
}

/// Offline and online recordings of one subject
#[derive(Debug, Clone)]
pub struct SubjectInput {
    pub id: String,
    pub offline: Vec<Run>,
    pub online: Vec<Run>,
}

/// Selected features, fitted model and the analysis they came from
pub struct TrainedDecoder {
    model: Box<dyn Discriminant>,
    /// Posterior column of each class in `TaskClass::ORDER`
    class_columns: [usize; 2],
    features: Vec<SelectedFeature>,
    channel_names: Vec<String>,
    transform: FeatureTransform,
    analysis: FeatureAnalysis,
}

impl TrainedDecoder {
    pub fn model(&self) -> &dyn Discriminant {
        self.model.as_ref()
    }

    pub fn features(&self) -> &[SelectedFeature] {
        &self.features
    }

    pub fn analysis(&self) -> &FeatureAnalysis {
        &self.analysis
    }

    pub fn transform(&self) -> FeatureTransform {
        self.transform
    }

    /// Map the selected features onto another tensor's axes
    ///
    /// Channels are matched by name so an online session with a different
    /// montage order still reads the right columns.
    ///
    /// # Errors
    /// * `DimensionMismatch` - a selected frequency is missing from the tensor
    /// * `ChannelNotFound` - a selected channel cannot be resolved
    pub fn feature_indices_for(
        &self,
        tensor: &ActivityTensor,
        diagnostics: &Diagnostics,
    ) -> Result<Vec<usize>, PipelineError> {
        let n_freqs = tensor.n_freqs();
        self.features
            .iter()
            .map(|feature| {
                let f = tensor
                    .freqs()
                    .iter()
                    .position(|hz| (hz - feature.freq_hz).abs() < 1e-9)
                    .ok_or(PipelineError::DimensionMismatch {
                        what: "frequency axis",
                        expected: self.analysis.freqs.len(),
                        actual: n_freqs,
                    })?;
                let name = self.channel_names.get(feature.chan_idx).ok_or(
                    PipelineError::DimensionMismatch {
                        what: "channel axis",
                        expected: feature.chan_idx + 1,
                        actual: self.channel_names.len(),
                    },
                )?;
                let c = tensor.channels().require(name, diagnostics)?;
                Ok(feature_index(f, c, n_freqs))
            })
            .collect()
    }
}

/// Coordinates every stage for one subject
pub struct SubjectPipeline {
    config: PipelineConfig,
    featurizer: SpectralFeaturizer,
    aligner: EventAligner,
}

impl SubjectPipeline {
    pub fn new(config: &PipelineConfig, filter: SpatialFilter) -> Self {
        let featurizer = SpectralFeaturizer::new(config, filter);
        let aligner = EventAligner::new(featurizer.stride(), MappingDirection::Backward);
        Self {
            config: config.clone(),
            featurizer,
            aligner,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Seconds between consecutive windows
    pub fn window_shift(&self) -> f64 {
        self.featurizer.stride() as f64 / self.config.acquisition.sample_rate
    }

    fn featurize_run(&self, run: &Run, diagnostics: &Diagnostics) -> Result<Option<WindowedPsd>, PipelineError> {
        let scope = || SkipScope::Run { id: run.id.clone() };
        match self.featurizer.transform(&run.signal) {
            Ok(psd) if psd.n_windows() == 0 => {
                diagnostics.record(
                    scope(),
                    SkipReason::RunTooShort {
                        samples: run.signal.n_samples(),
                        required: self.featurizer.frame_len(),
                    },
                );
                Ok(None)
            }
            Ok(psd) => Ok(Some(psd)),
            Err(PipelineError::SpatialFilterMismatch { expected, actual }) => {
                diagnostics.record(scope(), SkipReason::SpatialFilterMismatch { expected, actual });
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Featurize runs in parallel and join them in input order
    ///
    /// Runs that cannot be featurized are skipped and recorded; markers of
    /// each kept run are offset by the windows of the kept runs before it.
    ///
    /// # Errors
    /// * `EmptySession` - no run survived
    /// * `SampleRateMismatch` - a run was recorded at another rate
    pub fn featurize_session(&self, runs: &[Run], diagnostics: &Diagnostics) -> Result<Session, PipelineError> {
        let featurized: Vec<Option<WindowedPsd>> = runs
            .par_iter()
            .map(|run| self.featurize_run(run, diagnostics))
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let kept: Vec<(&Run, WindowedPsd)> = runs
            .iter()
            .zip(featurized)
            .filter_map(|(run, psd)| psd.map(|psd| (run, psd)))
            .collect();

        let events = self.aligner.align_session(
            kept.iter()
                .map(|(run, psd)| (run.events.as_slice(), psd.n_windows())),
        );
        let parts: Vec<WindowedPsd> = kept.into_iter().map(|(_, psd)| psd).collect();
        let psd = WindowedPsd::concatenate(&parts)?;

        tracing::info!(
            "[SubjectPipeline] session of {}/{} runs, {} windows, {} events",
            parts.len(),
            runs.len(),
            psd.n_windows(),
            events.len()
        );

        Ok(Session { psd, events })
    }

    /// Featurize and segment runs into an activity tensor
    pub fn activity(&self, runs: &[Run], diagnostics: &Diagnostics) -> Result<ActivityTensor, PipelineError> {
        let session = self.featurize_session(runs, diagnostics)?;
        TrialSegmenter::new(&self.config.protocol).segment(&session.events, &session.psd, diagnostics)
    }

    /// Fisher ranking and ERD summary of a tensor
    ///
    /// A degenerate tensor (one class absent) yields all-zero scores and no
    /// selected features.
    pub fn analyze(&self, tensor: &ActivityTensor, diagnostics: &Diagnostics) -> FeatureAnalysis {
        let selection = &self.config.selection;
        let matrix = FeatureExtractor::new(selection.transform).trial_features(tensor, diagnostics);
        let scores = FisherSelector::new(selection.epsilon).score(&matrix);

        let selected: Vec<SelectedFeature> = if scores.is_degenerate() {
            tracing::warn!(
                "[SubjectPipeline] class counts {:?}, Fisher scores are all zero",
                tensor.class_counts()
            );
            Vec::new()
        } else {
            scores
                .select(selection.k, tensor.freqs())
                .into_iter()
                .filter(|feature| feature.score > 0.0)
                .collect()
        };

        let erd = ErdComputer::new(&self.config.erd);
        let maps = erd.compute(tensor);
        let best_freq = scores.best(tensor.freqs()).map(|feature| feature.freq_idx);
        let summary = erd.summarize(&maps, best_freq, diagnostics);

        FeatureAnalysis {
            class_counts: tensor.class_counts(),
            freqs: tensor.freqs().to_vec(),
            channels: tensor.channels().labels().to_vec(),
            fisher_map: scores.as_map(),
            selected,
            erd: summary,
        }
    }

    /// Analyse a tensor and fit a model with the given trainer
    ///
    /// `fit` receives per-window samples of the selected features.
    pub fn train_with<F>(
        &self,
        tensor: &ActivityTensor,
        diagnostics: &Diagnostics,
        fit: F,
    ) -> Result<TrainedDecoder, PipelineError>
    where
        F: FnOnce(ArrayView2<'_, f64>, &[TaskClass]) -> Result<Box<dyn Discriminant>, PipelineError>,
    {
        if tensor.is_empty() {
            return Err(PipelineError::NoValidTrials);
        }
        let [hands, feet] = tensor.class_counts();
        if hands == 0 || feet == 0 {
            return Err(PipelineError::SingleClass { hands, feet });
        }

        let analysis = self.analyze(tensor, diagnostics);
        if analysis.selected.is_empty() {
            return Err(PipelineError::NoDiscriminativeFeatures);
        }

        let transform = self.config.selection.transform;
        let indices: Vec<usize> = analysis.selected.iter().map(|f| f.index).collect();
        let samples = FeatureExtractor::new(transform).samples(tensor, &indices);
        let model = fit(samples.values.view(), &samples.labels)?;
        let columns = class_columns(model.classes())?;

        tracing::info!(
            "[SubjectPipeline] trained on {} trials ({} windows), {} features",
            tensor.n_trials(),
            samples.len(),
            indices.len()
        );

        Ok(TrainedDecoder {
            model,
            class_columns: columns,
            features: analysis.selected.clone(),
            channel_names: tensor.channels().labels().to_vec(),
            transform,
            analysis,
        })
    }

    /// Train the shrinkage LDA on a tensor
    pub fn train_on_activity(
        &self,
        tensor: &ActivityTensor,
        diagnostics: &Diagnostics,
    ) -> Result<TrainedDecoder, PipelineError> {
        let config = self.config.classifier.clone();
        self.train_with(tensor, diagnostics, |x, labels| {
            let model = LinearDiscriminant::train(x, labels, &config)?;
            Ok(Box::new(model) as Box<dyn Discriminant>)
        })
    }

    /// Train from offline runs
    pub fn train(&self, runs: &[Run], diagnostics: &Diagnostics) -> Result<TrainedDecoder, PipelineError> {
        let tensor = self.activity(runs, diagnostics)?;
        self.train_on_activity(&tensor, diagnostics)
    }

    /// Predict every window of every trial and replay the accumulator
    ///
    /// An empty tensor gives an empty report.
    pub fn evaluate_activity(
        &self,
        decoder: &TrainedDecoder,
        tensor: &ActivityTensor,
        diagnostics: &Diagnostics,
    ) -> Result<EvaluationReport, PipelineError> {
        let indices = decoder.feature_indices_for(tensor, diagnostics)?;
        let extractor = FeatureExtractor::new(decoder.transform());
        let accumulator = EvidenceAccumulator::new(&self.config.accumulator, self.window_shift());

        let records: Vec<DecisionRecord> = (0..tensor.n_trials())
            .into_par_iter()
            .map(|trial| -> Result<DecisionRecord, PipelineError> {
                let samples = extractor.trial_samples(tensor, trial, &indices);
                let predictions = decoder.model().predict_matrix(samples.view())?;
                let truth = tensor.labels()[trial];
                let columns = decoder.class_columns;
                let outcome = accumulator.replay(
                    predictions
                        .iter()
                        .map(|p| ordered_posterior(p.posterior, columns)),
                );
                Ok(DecisionRecord {
                    trial,
                    truth,
                    outcome,
                    samples_correct: predictions.iter().filter(|p| p.label == truth).count(),
                    samples_total: predictions.len(),
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let mut engine = MetricsEngine::new();
        for record in records {
            engine.push(record);
        }
        let metrics = engine.summarize();

        tracing::info!(
            "[SubjectPipeline] evaluated {} trials: decided={}, timeouts={}, trial accuracy={:?}, kappa={:?}",
            metrics.n_trials,
            metrics.n_decided,
            metrics.n_timeouts,
            metrics.trial_accuracy,
            metrics.kappa
        );

        Ok(EvaluationReport {
            metrics,
            records: engine.into_records(),
            window_shift: self.window_shift(),
        })
    }

    /// Evaluate a decoder on online runs
    pub fn evaluate(
        &self,
        decoder: &TrainedDecoder,
        runs: &[Run],
        diagnostics: &Diagnostics,
    ) -> Result<EvaluationReport, PipelineError> {
        let tensor = self.activity(runs, diagnostics)?;
        self.evaluate_activity(decoder, &tensor, diagnostics)
    }

    /// Train on the offline runs and evaluate on the online runs
    pub fn run_subject(&self, input: &SubjectInput, diagnostics: &Diagnostics) -> Result<SubjectReport, PipelineError> {
        if input.offline.is_empty() {
            return Err(PipelineError::MissingInput {
                what: format!("offline runs of subject {}", input.id),
            });
        }
        if input.online.is_empty() {
            return Err(PipelineError::MissingInput {
                what: format!("online runs of subject {}", input.id),
            });
        }

        let decoder = self.train(&input.offline, diagnostics)?;
        let evaluation = self.evaluate(&decoder, &input.online, diagnostics)?;
        Ok(SubjectReport {
            id: input.id.clone(),
            analysis: decoder.analysis().clone(),
            evaluation,
            skips: diagnostics.snapshot(),
        })
    }
}

/// Process subjects independently and in parallel
///
/// A failing subject is logged and recorded in `diagnostics`; the others
/// still produce reports, returned in input order.
pub fn run_batch(
    config: &PipelineConfig,
    filter: SpatialFilter,
    subjects: &[SubjectInput],
    diagnostics: &Diagnostics,
) -> Vec<SubjectReport> {
    let pipeline = SubjectPipeline::new(config, filter);
    let reports: Vec<Option<SubjectReport>> = subjects
        .par_iter()
        .map(|input| {
            let local = Diagnostics::new();
            match pipeline.run_subject(input, &local) {
                Ok(report) => Some(report),
                Err(err) => {
                    log_pipeline_error(&err, &format!("subject {}", input.id));
                    diagnostics.extend(local.snapshot());
                    diagnostics.record(
                        SkipScope::Subject {
                            id: input.id.clone(),
                        },
                        SkipReason::SubjectFailed {
                            code: err.code(),
                            message: err.message(),
                        },
                    );
                    None
                }
            }
        })
        .collect();

    let reports: Vec<SubjectReport> = reports.into_iter().flatten().collect();
    tracing::info!(
        "[Batch] {}/{} subjects completed",
        reports.len(),
        subjects.len()
    );
    reports
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

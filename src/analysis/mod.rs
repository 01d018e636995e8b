// Analysis module - motor-imagery feature extraction and decision engine
//
// Data flow for one subject:
//
//   runs → SpectralFeaturizer + EventAligner → Session (PSD + window markers)
//        → TrialSegmenter → ActivityTensor
//        → {ERDComputer, FisherSelector} → Discriminant (training)
//        → per-trial predictions → EvidenceAccumulator → MetricsEngine
//
// SubjectPipeline in `pipeline` wires the stages together.

pub mod accumulator;
pub mod classifier;
pub mod erd;
pub mod events;
pub mod features;
pub mod fisher;
pub mod metrics;
pub mod pipeline;
pub mod segmentation;
pub mod spectrogram;
pub mod stats;
pub mod tensor;

pub use accumulator::{AccumulatorState, Decision, EvidenceAccumulator, TrialOutcome};
pub use classifier::{Discriminant, LinearDiscriminant, Prediction};
pub use erd::{ErdComputer, ErdMaps, ErdSummary};
pub use events::{EventAligner, MappingDirection, WindowedEvent};
pub use features::{FeatureExtractor, FeatureMatrix};
pub use fisher::{FisherScores, FisherSelector, SelectedFeature};
pub use metrics::{ConfusionMatrix, DecisionRecord, EvaluationMetrics, MetricsEngine};
pub use pipeline::{
    run_batch, EvaluationReport, FeatureAnalysis, Session, SubjectInput, SubjectPipeline,
    SubjectReport, TrainedDecoder,
};
pub use segmentation::TrialSegmenter;
pub use spectrogram::{SpectralFeaturizer, WindowedPsd};
pub use tensor::ActivityTensor;

// Pipeline error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Pipeline error code constants
///
/// Error code range: 2001-2010
pub struct PipelineErrorCodes {}

impl PipelineErrorCodes {
    /// Signal has fewer channels than the spatial transform expects
    pub const SPATIAL_FILTER_MISMATCH: i32 = 2001;

    /// No run of the session survived featurization
    pub const EMPTY_SESSION: i32 = 2002;

    /// Segmentation produced no trial
    pub const NO_VALID_TRIALS: i32 = 2003;

    /// Only one task class is present in the training data
    pub const SINGLE_CLASS: i32 = 2004;

    /// Discriminant training failed numerically
    pub const TRAINING_FAILED: i32 = 2005;

    /// Array shapes disagree
    pub const DIMENSION_MISMATCH: i32 = 2006;

    /// Required input is missing
    pub const MISSING_INPUT: i32 = 2007;

    /// Channel label could not be resolved
    pub const CHANNEL_NOT_FOUND: i32 = 2008;

    /// Fisher scoring found no discriminative feature
    pub const NO_DISCRIMINATIVE_FEATURES: i32 = 2009;

    /// Recording sample rate differs from the configured one
    pub const SAMPLE_RATE_MISMATCH: i32 = 2010;
}

/// Log a pipeline error with structured context
///
/// The context names the subject or run so that batch logs identify the
/// offending unit.
pub fn log_pipeline_error(err: &PipelineError, context: &str) {
    error!(
        "Pipeline error in {}: code={}, component=SubjectPipeline, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while featurizing, training, or evaluating one subject
///
/// Error code range: 2001-2010
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Signal channel count below the spatial transform input size
    SpatialFilterMismatch { expected: usize, actual: usize },

    /// Every run was skipped
    EmptySession,

    /// No trial passed the segmentation checks
    NoValidTrials,

    /// Training data holds a single class
    SingleClass { hands: usize, feet: usize },

    /// Discriminant could not be fitted
    TrainingFailed { reason: String },

    /// Shapes disagree between two collaborating values
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Required input missing
    MissingInput { what: String },

    /// Channel label unresolved, fallback table included
    ChannelNotFound { name: String },

    /// Every Fisher score is zero
    NoDiscriminativeFeatures,

    /// Recording sample rate differs from the configured one
    SampleRateMismatch { expected: f64, actual: f64 },
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::SpatialFilterMismatch { .. } => {
                PipelineErrorCodes::SPATIAL_FILTER_MISMATCH
            }
            PipelineError::EmptySession => PipelineErrorCodes::EMPTY_SESSION,
            PipelineError::NoValidTrials => PipelineErrorCodes::NO_VALID_TRIALS,
            PipelineError::SingleClass { .. } => PipelineErrorCodes::SINGLE_CLASS,
            PipelineError::TrainingFailed { .. } => PipelineErrorCodes::TRAINING_FAILED,
            PipelineError::DimensionMismatch { .. } => PipelineErrorCodes::DIMENSION_MISMATCH,
            PipelineError::MissingInput { .. } => PipelineErrorCodes::MISSING_INPUT,
            PipelineError::ChannelNotFound { .. } => PipelineErrorCodes::CHANNEL_NOT_FOUND,
            PipelineError::NoDiscriminativeFeatures => {
                PipelineErrorCodes::NO_DISCRIMINATIVE_FEATURES
            }
            PipelineError::SampleRateMismatch { .. } => PipelineErrorCodes::SAMPLE_RATE_MISMATCH,
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::SpatialFilterMismatch { expected, actual } => {
                format!(
                    "Spatial filter expects {} channels, signal has {}",
                    expected, actual
                )
            }
            PipelineError::EmptySession => "No run survived featurization".to_string(),
            PipelineError::NoValidTrials => "No valid trial found".to_string(),
            PipelineError::SingleClass { hands, feet } => {
                format!(
                    "Both classes required: hands={}, feet={}",
                    hands, feet
                )
            }
            PipelineError::TrainingFailed { reason } => {
                format!("Training failed: {}", reason)
            }
            PipelineError::DimensionMismatch {
                what,
                expected,
                actual,
            } => {
                format!("{} mismatch: expected {}, got {}", what, expected, actual)
            }
            PipelineError::MissingInput { what } => format!("Missing input: {}", what),
            PipelineError::ChannelNotFound { name } => {
                format!("Channel {} not found", name)
            }
            PipelineError::NoDiscriminativeFeatures => {
                "All Fisher scores are zero".to_string()
            }
            PipelineError::SampleRateMismatch { expected, actual } => {
                format!("Sample rate {} Hz, configured {} Hz", actual, expected)
            }
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PipelineError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_codes() {
        assert_eq!(
            PipelineError::SpatialFilterMismatch {
                expected: 16,
                actual: 8
            }
            .code(),
            PipelineErrorCodes::SPATIAL_FILTER_MISMATCH
        );
        assert_eq!(PipelineError::EmptySession.code(), 2002);
        assert_eq!(PipelineError::NoValidTrials.code(), 2003);
        assert_eq!(PipelineError::SingleClass { hands: 3, feet: 0 }.code(), 2004);
        assert_eq!(
            PipelineError::TrainingFailed {
                reason: "x".to_string()
            }
            .code(),
            2005
        );
        assert_eq!(
            PipelineError::DimensionMismatch {
                what: "feature vector",
                expected: 4,
                actual: 3
            }
            .code(),
            2006
        );
        assert_eq!(
            PipelineError::MissingInput {
                what: "x".to_string()
            }
            .code(),
            2007
        );
        assert_eq!(
            PipelineError::ChannelNotFound {
                name: "C3".to_string()
            }
            .code(),
            2008
        );
        assert_eq!(PipelineError::NoDiscriminativeFeatures.code(), 2009);
        assert_eq!(
            PipelineError::SampleRateMismatch {
                expected: 512.0,
                actual: 256.0
            }
            .code(),
            2010
        );
    }

    #[test]
    fn test_pipeline_error_messages() {
        let err = PipelineError::SpatialFilterMismatch {
            expected: 16,
            actual: 8,
        };
        assert_eq!(
            err.message(),
            "Spatial filter expects 16 channels, signal has 8"
        );

        let err = PipelineError::SingleClass { hands: 0, feet: 10 };
        assert!(err.message().contains("hands=0"));
        assert!(err.message().contains("feet=10"));
    }

    #[test]
    fn test_error_code_trait_object() {
        let err: &dyn ErrorCode = &PipelineError::NoValidTrials;
        assert_eq!(err.code(), 2003);
    }

    #[test]
    fn test_error_propagation() {
        fn may_fail() -> Result<(), PipelineError> {
            Err(PipelineError::EmptySession)
        }

        fn caller() -> Result<(), PipelineError> {
            may_fail()?;
            Ok(())
        }

        assert_eq!(caller(), Err(PipelineError::EmptySession));
    }
}

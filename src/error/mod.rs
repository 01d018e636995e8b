// Error types for the motor-imagery decoder
//
// This module defines typed error enums for configuration loading and the
// per-subject analysis pipeline. Each error carries a stable numeric code so
// that orchestration layers can branch on the failure kind without matching
// on message text.

mod config;
mod pipeline;

pub use config::{log_config_error, ConfigError, ConfigErrorCodes};
pub use pipeline::{log_pipeline_error, PipelineError, PipelineErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the batch boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

// Configuration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Configuration error code constants
///
/// Error code range: 1001-1005
pub struct ConfigErrorCodes {}

impl ConfigErrorCodes {
    /// Configuration file could not be read
    pub const UNREADABLE: i32 = 1001;

    /// Configuration JSON is malformed or misses a required field
    pub const MALFORMED: i32 = 1002;

    /// A parameter is outside its valid range
    pub const INVALID_VALUE: i32 = 1003;

    /// Two protocol roles share the same event code
    pub const DUPLICATE_CODE: i32 = 1004;

    /// Spatial transform file is not a square numeric matrix
    pub const INVALID_SPATIAL_FILTER: i32 = 1005;
}

/// Log a configuration error with structured context
pub fn log_config_error(err: &ConfigError, context: &str) {
    error!(
        "Config error in {}: code={}, component=PipelineConfig, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Configuration-related errors
///
/// These abort the run of the subject they belong to and surface to the
/// top-level caller.
///
/// Error code range: 1001-1005
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// File could not be read
    Unreadable { path: String, reason: String },

    /// JSON could not be parsed into a configuration
    Malformed { path: String, reason: String },

    /// Parameter outside its valid range
    InvalidValue { field: &'static str, reason: String },

    /// Event code used for more than one protocol role
    DuplicateCode { code: u16 },

    /// Spatial transform is not a square matrix
    InvalidSpatialFilter { reason: String },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::Unreadable { .. } => ConfigErrorCodes::UNREADABLE,
            ConfigError::Malformed { .. } => ConfigErrorCodes::MALFORMED,
            ConfigError::InvalidValue { .. } => ConfigErrorCodes::INVALID_VALUE,
            ConfigError::DuplicateCode { .. } => ConfigErrorCodes::DUPLICATE_CODE,
            ConfigError::InvalidSpatialFilter { .. } => ConfigErrorCodes::INVALID_SPATIAL_FILTER,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::Unreadable { path, reason } => {
                format!("Failed to read {}: {}", path, reason)
            }
            ConfigError::Malformed { path, reason } => {
                format!("Malformed configuration in {}: {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                format!("Invalid value for {}: {}", field, reason)
            }
            ConfigError::DuplicateCode { code } => {
                format!("Event code {} is assigned to more than one role", code)
            }
            ConfigError::InvalidSpatialFilter { reason } => {
                format!("Invalid spatial filter: {}", reason)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConfigError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_codes() {
        assert_eq!(
            ConfigError::Unreadable {
                path: "a".to_string(),
                reason: "b".to_string()
            }
            .code(),
            ConfigErrorCodes::UNREADABLE
        );
        assert_eq!(
            ConfigError::Malformed {
                path: "a".to_string(),
                reason: "b".to_string()
            }
            .code(),
            1002
        );
        assert_eq!(
            ConfigError::InvalidValue {
                field: "accumulator.alpha",
                reason: "x".to_string()
            }
            .code(),
            1003
        );
        assert_eq!(ConfigError::DuplicateCode { code: 786 }.code(), 1004);
        assert_eq!(
            ConfigError::InvalidSpatialFilter {
                reason: "x".to_string()
            }
            .code(),
            1005
        );
    }

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::InvalidValue {
            field: "accumulator.threshold",
            reason: "must be in (0.5, 1]".to_string(),
        };
        assert_eq!(
            err.message(),
            "Invalid value for accumulator.threshold: must be in (0.5, 1]"
        );

        let err = ConfigError::DuplicateCode { code: 781 };
        assert!(err.message().contains("781"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::DuplicateCode { code: 771 };
        let display = format!("{}", err);
        assert!(display.contains("ConfigError"));
        assert!(display.contains("1004"));
    }
}

//! Configuration for the decoding pipeline
//!
//! One immutable `PipelineConfig` value is built per run (from JSON or from
//! defaults) and passed explicitly into every component entry point. Nothing
//! in the crate reads configuration from ambient state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub spectrogram: SpectrogramConfig,
    /// Protocol codes; the class codes have no default and must be present
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub erd: ErdConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub accumulator: AccumulatorConfig,
}

/// Recording parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Number of leading channels fed to the spatial transform
    pub n_channels: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 512.0,
            n_channels: 16,
        }
    }
}

/// Sliding-window spectrogram parameters (all lengths in seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrogramConfig {
    /// Inner periodogram length
    pub wlength: f64,
    /// Outer window stride
    pub wshift: f64,
    /// Inner periodogram stride
    pub pshift: f64,
    /// Averaging frame length
    pub mlength: f64,
    /// Lowest frequency kept (Hz, inclusive)
    pub freq_min: f64,
    /// Highest frequency kept (Hz, inclusive)
    pub freq_max: f64,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            wlength: 0.5,
            wshift: 0.0625,
            pshift: 0.25,
            mlength: 1.0,
            freq_min: 4.0,
            freq_max: 48.0,
        }
    }
}

impl SpectrogramConfig {
    /// Convert a length in seconds to a sample count (at least one sample)
    pub fn to_samples(seconds: f64, sample_rate: f64) -> usize {
        ((seconds * sample_rate).round() as usize).max(1)
    }
}

/// Event codes of the cue-based protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_fixation_code")]
    pub fixation_code: u16,
    #[serde(default = "default_feedback_code")]
    pub feedback_code: u16,
    /// Cue code of the first class (hands)
    pub class_a_code: u16,
    /// Cue code of the second class (feet)
    pub class_b_code: u16,
    /// Events searched backward from a cue for the fixation marker
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Events searched forward from a cue for the feedback marker
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
}

fn default_fixation_code() -> u16 {
    786
}

fn default_feedback_code() -> u16 {
    781
}

fn default_lookback() -> usize {
    3
}

fn default_lookahead() -> usize {
    5
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            fixation_code: default_fixation_code(),
            feedback_code: default_feedback_code(),
            class_a_code: 773,
            class_b_code: 771,
            lookback: default_lookback(),
            lookahead: default_lookahead(),
        }
    }
}

/// How the ERD reference window length is chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselinePolicy {
    /// Each trial uses its own fixation length
    PerTrial,
    /// Every trial uses the median fixation length of the population
    Median,
    /// Fixed number of windows
    Fixed { windows: usize },
}

/// Names of the sensorimotor channels used for time courses and lateralization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorChannels {
    pub left: String,
    pub midline: String,
    pub right: String,
}

impl Default for MotorChannels {
    fn default() -> Self {
        Self {
            left: "C3".to_string(),
            midline: "Cz".to_string(),
            right: "C4".to_string(),
        }
    }
}

/// ERD/ERS analysis parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErdConfig {
    pub baseline: BaselinePolicy,
    /// Band averaged for maps and time courses (Hz, inclusive)
    pub band: (f64, f64),
    pub motor_channels: MotorChannels,
}

impl Default for ErdConfig {
    fn default() -> Self {
        Self {
            baseline: BaselinePolicy::PerTrial,
            band: (8.0, 30.0),
            motor_channels: MotorChannels::default(),
        }
    }
}

/// Transform applied to power before scoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureTransform {
    Log,
    Linear,
}

/// Fisher selection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Number of features kept
    pub k: usize,
    /// Added to the variance sum of every Fisher score
    pub epsilon: f64,
    pub transform: FeatureTransform,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            k: 20,
            epsilon: 1e-10,
            transform: FeatureTransform::Log,
        }
    }
}

/// Discriminant parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Covariance shrinkage toward the scaled identity, in [0, 1]
    pub shrinkage: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { shrinkage: 0.1 }
    }
}

/// Evidence accumulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulatorConfig {
    /// Smoothing factor in (0, 1); higher is slower
    pub alpha: f64,
    /// Decision threshold in (0.5, 1]
    pub threshold: f64,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.95,
            threshold: 0.7,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            spectrogram: SpectrogramConfig::default(),
            protocol: ProtocolConfig::default(),
            erd: ErdConfig::default(),
            selection: SelectionConfig::default(),
            classifier: ClassifierConfig::default(),
            accumulator: AccumulatorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate configuration from a JSON file
    ///
    /// # Returns
    /// * `Ok(PipelineConfig)` - Parsed and validated configuration
    /// * `Err(ConfigError)` - Unreadable file, malformed JSON (including
    ///   missing class codes), or an out-of-range value
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let display = path.as_ref().display().to_string();
        let contents = fs::read_to_string(&path).map_err(|err| ConfigError::Unreadable {
            path: display.clone(),
            reason: err.to_string(),
        })?;
        let config = Self::from_json(&contents).map_err(|err| match err {
            ConfigError::Malformed { reason, .. } => ConfigError::Malformed {
                path: display.clone(),
                reason,
            },
            other => other,
        })?;
        log::info!("[Config] Loaded configuration from {}", display);
        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents).map_err(|err| ConfigError::Malformed {
            path: "<inline>".to_string(),
            reason: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every parameter range and protocol code uniqueness
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                field,
                reason: reason.to_string(),
            }
        }

        let acq = &self.acquisition;
        if !(acq.sample_rate > 0.0) {
            return Err(invalid("acquisition.sample_rate", "must be positive"));
        }
        if acq.n_channels == 0 {
            return Err(invalid("acquisition.n_channels", "must be at least 1"));
        }

        let window = &self.spectrogram;
        for (field, value) in [
            ("spectrogram.wlength", window.wlength),
            ("spectrogram.wshift", window.wshift),
            ("spectrogram.pshift", window.pshift),
            ("spectrogram.mlength", window.mlength),
        ] {
            if !(value > 0.0) {
                return Err(invalid(field, "must be positive"));
            }
        }
        if window.mlength < window.wlength {
            return Err(invalid("spectrogram.mlength", "must be >= wlength"));
        }
        if !(window.freq_min >= 0.0 && window.freq_min <= window.freq_max) {
            return Err(invalid("spectrogram.freq_min", "must satisfy 0 <= min <= max"));
        }

        let proto = &self.protocol;
        let codes = [
            proto.fixation_code,
            proto.feedback_code,
            proto.class_a_code,
            proto.class_b_code,
        ];
        for (i, code) in codes.iter().enumerate() {
            if codes[i + 1..].contains(code) {
                return Err(ConfigError::DuplicateCode { code: *code });
            }
        }
        if proto.lookback == 0 {
            return Err(invalid("protocol.lookback", "must be at least 1"));
        }
        if proto.lookahead == 0 {
            return Err(invalid("protocol.lookahead", "must be at least 1"));
        }

        if self.erd.band.0 > self.erd.band.1 {
            return Err(invalid("erd.band", "lower edge above upper edge"));
        }
        if let BaselinePolicy::Fixed { windows: 0 } = self.erd.baseline {
            return Err(invalid("erd.baseline", "fixed baseline needs at least 1 window"));
        }

        if self.selection.k == 0 {
            return Err(invalid("selection.k", "must be at least 1"));
        }
        if !(self.selection.epsilon > 0.0) {
            return Err(invalid("selection.epsilon", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.classifier.shrinkage) {
            return Err(invalid("classifier.shrinkage", "must be in [0, 1]"));
        }

        let acc = &self.accumulator;
        if !(acc.alpha > 0.0 && acc.alpha < 1.0) {
            return Err(invalid("accumulator.alpha", "must be in (0, 1)"));
        }
        if !(acc.threshold > 0.5 && acc.threshold <= 1.0) {
            return Err(invalid("accumulator.threshold", "must be in (0.5, 1]"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.accumulator.alpha, 0.95);
        assert_eq!(config.accumulator.threshold, 0.7);
        assert_eq!(config.protocol.lookback, 3);
        assert_eq!(config.protocol.lookahead, 5);
        assert_eq!(config.selection.epsilon, 1e-10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed = PipelineConfig::from_json(&json).unwrap();

        assert_eq!(parsed.spectrogram.wshift, config.spectrogram.wshift);
        assert_eq!(parsed.protocol.class_a_code, config.protocol.class_a_code);
        assert_eq!(parsed.erd.baseline, BaselinePolicy::PerTrial);
    }

    #[test]
    fn test_missing_class_codes_is_malformed() {
        let json = r#"{ "protocol": { "fixation_code": 786, "class_a_code": 773 } }"#;
        let err = PipelineConfig::from_json(json).unwrap_err();
        assert_eq!(err.code(), 1002);
    }

    #[test]
    fn test_minimal_json_fills_defaults() {
        let json = r#"{ "protocol": { "class_a_code": 773, "class_b_code": 771 } }"#;
        let config = PipelineConfig::from_json(json).unwrap();
        assert_eq!(config.protocol.fixation_code, 786);
        assert_eq!(config.protocol.feedback_code, 781);
        assert_eq!(config.acquisition.n_channels, 16);
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        let json = r#"{ "protocol": { "class_a_code": 781, "class_b_code": 771 } }"#;
        let err = PipelineConfig::from_json(json).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateCode { code: 781 });
    }

    #[test]
    fn test_out_of_range_accumulator_rejected() {
        let mut config = PipelineConfig::default();
        config.accumulator.alpha = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "accumulator.alpha",
                ..
            })
        ));

        let mut config = PipelineConfig::default();
        config.accumulator.threshold = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_baseline_policy_json() {
        let json = r#"{
            "protocol": { "class_a_code": 773, "class_b_code": 771 },
            "erd": {
                "baseline": { "kind": "fixed", "windows": 12 },
                "band": [8.0, 12.0],
                "motor_channels": { "left": "C3", "midline": "Cz", "right": "C4" }
            }
        }"#;
        let config = PipelineConfig::from_json(json).unwrap();
        assert_eq!(config.erd.baseline, BaselinePolicy::Fixed { windows: 12 });
        assert_eq!(config.erd.band, (8.0, 12.0));
    }

    #[test]
    fn test_from_file_missing() {
        let err = PipelineConfig::from_file("/nonexistent/mi_config.json").unwrap_err();
        assert_eq!(err.code(), 1001);
    }

    #[test]
    fn test_to_samples() {
        assert_eq!(SpectrogramConfig::to_samples(0.0625, 512.0), 32);
        assert_eq!(SpectrogramConfig::to_samples(0.0, 512.0), 1);
    }
}

// Channel label axis with name-based lookup
//
// Channel positions are resolved by name against the run's own label list.
// A small fallback table covers the three sensorimotor channels for montages
// whose labels were lost; every fallback use is reported as a diagnostic.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::telemetry::{Diagnostics, SkipReason, SkipScope};

/// Fallback positions (0-based) in the standard 16-channel motor montage
static FALLBACK_INDICES: Lazy<HashMap<&'static str, usize>> =
    Lazy::new(|| HashMap::from([("C3", 6), ("Cz", 8), ("C4", 10)]));

/// Ordered, unique channel labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAxis {
    labels: Vec<String>,
}

impl ChannelAxis {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Labels `Ch1..ChN` for recordings without names
    pub fn numbered(n: usize) -> Self {
        Self::new((1..=n).map(|i| format!("Ch{}", i)).collect())
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Axis restricted to the first `n` labels
    pub fn truncated(&self, n: usize) -> Self {
        Self::new(self.labels.iter().take(n).cloned().collect())
    }

    /// Exact, case-insensitive label lookup
    pub fn position(&self, name: &str) -> Option<usize> {
        self.labels
            .iter()
            .position(|label| label.eq_ignore_ascii_case(name))
    }

    /// Lookup by name, falling back to the fixed motor-montage table
    ///
    /// A miss is recoverable: the fallback index (if any, and in range) is
    /// returned and the miss is recorded.
    pub fn resolve(&self, name: &str, diagnostics: &Diagnostics) -> Option<usize> {
        if let Some(index) = self.position(name) {
            return Some(index);
        }

        let scope = SkipScope::Channel {
            name: name.to_string(),
        };
        let fallback = FALLBACK_INDICES
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, index)| *index)
            .filter(|index| *index < self.labels.len());

        match fallback {
            Some(index) => {
                diagnostics.record(scope, SkipReason::ChannelFallback { index });
                Some(index)
            }
            None => {
                diagnostics.record(scope, SkipReason::ChannelUnresolved);
                None
            }
        }
    }

    /// Lookup that must succeed
    ///
    /// # Errors
    /// `ChannelNotFound` when neither the label nor the fallback resolves.
    pub fn require(&self, name: &str, diagnostics: &Diagnostics) -> Result<usize, PipelineError> {
        self.resolve(name, diagnostics)
            .ok_or_else(|| PipelineError::ChannelNotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor_axis() -> ChannelAxis {
        ChannelAxis::new(
            ["Fz", "FC3", "FC1", "FCz", "FC2", "FC4", "C3", "C1", "Cz", "C2", "C4"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn test_resolve_by_name() {
        let diagnostics = Diagnostics::new();
        let axis = motor_axis();
        assert_eq!(axis.resolve("C3", &diagnostics), Some(6));
        assert_eq!(axis.resolve("cz", &diagnostics), Some(8));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_resolve_fallback_is_reported() {
        let diagnostics = Diagnostics::new();
        let axis = ChannelAxis::numbered(16);
        assert_eq!(axis.resolve("C4", &diagnostics), Some(10));

        let events = diagnostics.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, SkipReason::ChannelFallback { index: 10 });
    }

    #[test]
    fn test_resolve_unknown_channel() {
        let diagnostics = Diagnostics::new();
        let axis = ChannelAxis::numbered(4);
        assert_eq!(axis.resolve("Pz", &diagnostics), None);
        // Fallback index out of range for a 4-channel montage
        assert_eq!(axis.resolve("C3", &diagnostics), None);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_require_reports_missing_channel() {
        let diagnostics = Diagnostics::new();
        let axis = motor_axis();
        assert_eq!(axis.require("C2", &diagnostics), Ok(9));
        assert_eq!(
            axis.require("O1", &diagnostics),
            Err(PipelineError::ChannelNotFound {
                name: "O1".to_string()
            })
        );
    }

    #[test]
    fn test_truncated() {
        let axis = motor_axis().truncated(3);
        assert_eq!(axis.labels(), &["Fz", "FC3", "FC1"]);
    }
}

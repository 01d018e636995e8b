//! Diagnostics collector for recoverable skips.
//!
//! Each subject run owns one `Diagnostics` value. Components that drop an
//! item (a run, a trial, a channel lookup) record why, and the collector
//! mirrors every record to the WARN log so batch logs identify the unit.

use std::sync::Mutex;

pub mod events;

pub use events::{SkipEvent, SkipReason, SkipScope};

/// Thread-safe collection of skip events for one pipeline run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    events: Mutex<Vec<SkipEvent>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a skip and log it.
    pub fn record(&self, scope: SkipScope, reason: SkipReason) {
        let event = SkipEvent { scope, reason };
        tracing::warn!("[Diagnostics] {}", event);
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    /// Append events already logged by another collector.
    pub fn extend(&self, events: Vec<SkipEvent>) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(events);
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the recorded events in recording order.
    pub fn snapshot(&self) -> Vec<SkipEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Events whose scope matches the predicate.
    pub fn filter<F>(&self, predicate: F) -> Vec<SkipEvent>
    where
        F: Fn(&SkipScope) -> bool,
    {
        self.snapshot()
            .into_iter()
            .filter(|event| predicate(&event.scope))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_record_and_snapshot() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());

        diagnostics.record(
            SkipScope::Trial { cue_event: 4 },
            SkipReason::MissingFeedback { lookahead: 5 },
        );
        diagnostics.record(
            SkipScope::Run {
                id: "run-2".to_string(),
            },
            SkipReason::SpatialFilterMismatch {
                expected: 16,
                actual: 8,
            },
        );

        let events = diagnostics.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].scope, SkipScope::Trial { cue_event: 4 });
        assert!(events[1].to_string().contains("run-2"));
        assert!(events[1].to_string().contains("16"));
    }

    #[test]
    fn test_filter_by_scope() {
        let diagnostics = Diagnostics::new();
        diagnostics.record(
            SkipScope::Trial { cue_event: 1 },
            SkipReason::EmptyActivePhase,
        );
        diagnostics.record(
            SkipScope::Channel {
                name: "C3".to_string(),
            },
            SkipReason::ChannelFallback { index: 6 },
        );

        let trials = diagnostics.filter(|scope| matches!(scope, SkipScope::Trial { .. }));
        assert_eq!(trials.len(), 1);
    }

    #[test]
    fn test_extend_keeps_order() {
        let local = Diagnostics::new();
        local.record(
            SkipScope::Run {
                id: "run-1".to_string(),
            },
            SkipReason::RunTooShort {
                samples: 10,
                required: 512,
            },
        );
        let batch = Diagnostics::new();
        batch.record(
            SkipScope::Trial { cue_event: 0 },
            SkipReason::EmptyActivePhase,
        );
        batch.extend(local.snapshot());

        let events = batch.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].scope,
            SkipScope::Run {
                id: "run-1".to_string()
            }
        );
    }

    #[test]
    fn test_concurrent_records() {
        let diagnostics = Diagnostics::new();
        (0..64).into_par_iter().for_each(|i| {
            diagnostics.record(
                SkipScope::Trial { cue_event: i },
                SkipReason::EmptyActivePhase,
            );
        });
        assert_eq!(diagnostics.len(), 64);
    }

    #[test]
    fn test_event_serializes_flat() {
        let event = SkipEvent {
            scope: SkipScope::Subject {
                id: "s01".to_string(),
            },
            reason: SkipReason::SubjectFailed {
                code: 2003,
                message: "No valid trial found".to_string(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["scope"], "subject");
        assert_eq!(json["reason"], "subject_failed");
        assert_eq!(json["code"], 2003);
    }
}

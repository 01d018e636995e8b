use std::fmt;

use serde::{Deserialize, Serialize};

/// Unit that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum SkipScope {
    /// One recording run (file) of a session.
    Run { id: String },
    /// One candidate trial, identified by the index of its cue event.
    Trial { cue_event: usize },
    /// A whole subject in a batch.
    Subject { id: String },
    /// A channel label lookup.
    Channel { name: String },
}

/// Why a unit was skipped or degraded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    SpatialFilterMismatch { expected: usize, actual: usize },
    RunTooShort { samples: usize, required: usize },
    MissingFixation { lookback: usize },
    MissingFeedback { lookahead: usize },
    OutOfBounds { end: usize, available: usize },
    /// Active phase starts at or before the fixation window
    NoBaseline { start: usize, active: usize },
    EmptyActivePhase,
    ChannelFallback { index: usize },
    ChannelUnresolved,
    SubjectFailed { code: i32, message: String },
    LoadFailed { message: String },
}

/// One recorded skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipEvent {
    #[serde(flatten)]
    pub scope: SkipScope,
    #[serde(flatten)]
    pub reason: SkipReason,
}

impl fmt::Display for SkipScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipScope::Run { id } => write!(f, "run {}", id),
            SkipScope::Trial { cue_event } => write!(f, "trial at cue event {}", cue_event),
            SkipScope::Subject { id } => write!(f, "subject {}", id),
            SkipScope::Channel { name } => write!(f, "channel {}", name),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SpatialFilterMismatch { expected, actual } => write!(
                f,
                "spatial filter expects {} channels, got {}",
                expected, actual
            ),
            SkipReason::RunTooShort { samples, required } => write!(
                f,
                "{} samples, at least {} required for one window",
                samples, required
            ),
            SkipReason::MissingFixation { lookback } => {
                write!(f, "no fixation marker within {} events before cue", lookback)
            }
            SkipReason::MissingFeedback { lookahead } => {
                write!(f, "no feedback marker within {} events after cue", lookahead)
            }
            SkipReason::OutOfBounds { end, available } => write!(
                f,
                "trial ends at window {} but only {} windows exist",
                end, available
            ),
            SkipReason::NoBaseline { start, active } => write!(
                f,
                "active phase at window {} leaves no baseline after fixation at {}",
                active, start
            ),
            SkipReason::EmptyActivePhase => write!(f, "no valid window in the active phase"),
            SkipReason::ChannelFallback { index } => {
                write!(f, "label missing, using fallback index {}", index)
            }
            SkipReason::ChannelUnresolved => write!(f, "label missing and no fallback"),
            SkipReason::SubjectFailed { code, message } => {
                write!(f, "failed with code {}: {}", code, message)
            }
            SkipReason::LoadFailed { message } => write!(f, "could not be loaded: {}", message),
        }
    }
}

impl fmt::Display for SkipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped {}: {}", self.scope, self.reason)
    }
}

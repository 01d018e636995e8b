// Signal module - raw recordings, event markers and channel handling
//
// A `Signal` is the immutable samples × channels matrix handed over by a
// loader, together with its sample rate and channel labels. Event markers are
// kept in sample units here; `analysis::events` maps them to window units.

pub mod channels;
pub mod spatial;

pub use channels::ChannelAxis;
pub use spatial::SpatialFilter;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::ProtocolConfig;

/// The two motor-imagery task classes, in fixed [hands, feet] order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskClass {
    /// Class A: both-hands imagery
    Hands,
    /// Class B: both-feet imagery
    Feet,
}

impl TaskClass {
    /// Both classes in row/column order of confusion matrices and posteriors
    pub const ORDER: [TaskClass; 2] = [TaskClass::Hands, TaskClass::Feet];

    /// Position of the class in `ORDER`
    pub fn index(self) -> usize {
        match self {
            TaskClass::Hands => 0,
            TaskClass::Feet => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskClass::Hands => "hands",
            TaskClass::Feet => "feet",
        }
    }
}

/// Event marker in sample units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMarker {
    /// Protocol type code
    pub code: u16,
    /// Onset sample index
    pub position: usize,
    /// Duration in samples
    pub duration: usize,
}

impl EventMarker {
    pub fn new(code: u16, position: usize, duration: usize) -> Self {
        Self {
            code,
            position,
            duration,
        }
    }
}

/// Role of an event code within the cue-based protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Fixation,
    Cue(TaskClass),
    Feedback,
}

impl EventKind {
    /// Resolve a type code against the configured protocol
    pub fn from_code(code: u16, protocol: &ProtocolConfig) -> Option<Self> {
        if code == protocol.fixation_code {
            Some(EventKind::Fixation)
        } else if code == protocol.feedback_code {
            Some(EventKind::Feedback)
        } else if code == protocol.class_a_code {
            Some(EventKind::Cue(TaskClass::Hands))
        } else if code == protocol.class_b_code {
            Some(EventKind::Cue(TaskClass::Feet))
        } else {
            None
        }
    }
}

/// Immutable multi-channel recording
#[derive(Debug, Clone)]
pub struct Signal {
    /// Samples × channels
    pub data: Array2<f64>,
    /// Sample rate in Hz
    pub sample_rate: f64,
    pub channels: ChannelAxis,
}

impl Signal {
    pub fn new(data: Array2<f64>, sample_rate: f64, channels: ChannelAxis) -> Self {
        Self {
            data,
            sample_rate,
            channels,
        }
    }

    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_channels(&self) -> usize {
        self.data.ncols()
    }
}

/// One recording run: signal plus its event stream, identified for diagnostics
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub signal: Signal,
    pub events: Vec<EventMarker>,
}

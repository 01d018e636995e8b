// TrialSegmenter - cue-locked trial extraction from a window-indexed stream
//
// For every cue marker the segmenter looks back a bounded number of events
// for the fixation marker that opens the trial, then forward a bounded number
// of events for the feedback marker that opens the active phase. A trial runs
// from the fixation onset to the last window of the feedback marker.
// Candidates that fail a search or overrun the PSD are dropped and recorded
// in the diagnostics; they never abort segmentation.

use ndarray::s;

use crate::analysis::events::WindowedEvent;
use crate::analysis::spectrogram::WindowedPsd;
use crate::analysis::tensor::{ActivityTensor, TrialBlock};
use crate::config::ProtocolConfig;
use crate::error::PipelineError;
use crate::signal::{EventKind, TaskClass};
use crate::telemetry::{Diagnostics, SkipReason, SkipScope};

/// Window span of one accepted trial on the session timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialSpan {
    pub label: TaskClass,
    /// Index of the cue marker in the event stream
    pub cue_event: usize,
    /// First window (fixation onset)
    pub start: usize,
    /// Last window, inclusive
    pub end: usize,
    /// Feedback onset relative to `start`
    pub cue_onset: usize,
}

impl TrialSpan {
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Scanner states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmenterState {
    /// Looking for the next cue at or after `from`
    Scanning { from: usize },
    FoundCue { cue: usize, label: TaskClass },
    FoundStart { cue: usize, label: TaskClass, start: usize },
    Emit(TrialSpan),
}

pub struct TrialSegmenter {
    protocol: ProtocolConfig,
}

impl TrialSegmenter {
    pub fn new(protocol: &ProtocolConfig) -> Self {
        Self {
            protocol: protocol.clone(),
        }
    }

    /// Find all accepted trial spans in a session event stream
    ///
    /// # Arguments
    /// * `events` - Window-aligned markers in stream order
    /// * `n_windows` - Windows available in the session PSD
    /// * `diagnostics` - Receives one record per dropped candidate
    pub fn find_spans(
        &self,
        events: &[WindowedEvent],
        n_windows: usize,
        diagnostics: &Diagnostics,
    ) -> Vec<TrialSpan> {
        let mut spans = Vec::new();
        let mut state = SegmenterState::Scanning { from: 0 };

        loop {
            state = match state {
                SegmenterState::Scanning { from } => match self.next_cue(events, from) {
                    Some((cue, label)) => SegmenterState::FoundCue { cue, label },
                    None => break,
                },
                SegmenterState::FoundCue { cue, label } => match self.find_fixation(events, cue) {
                    Some(start) => SegmenterState::FoundStart { cue, label, start },
                    None => {
                        diagnostics.record(
                            SkipScope::Trial { cue_event: cue },
                            SkipReason::MissingFixation {
                                lookback: self.protocol.lookback,
                            },
                        );
                        SegmenterState::Scanning { from: cue + 1 }
                    }
                },
                SegmenterState::FoundStart { cue, label, start } => {
                    match self.find_feedback(events, cue) {
                        Some(feedback) => {
                            let start_window = events[start].onset;
                            let fb = &events[feedback];
                            let end = fb.onset + fb.duration.max(1) - 1;
                            if fb.onset <= start_window {
                                diagnostics.record(
                                    SkipScope::Trial { cue_event: cue },
                                    SkipReason::NoBaseline {
                                        start: start_window,
                                        active: fb.onset,
                                    },
                                );
                                SegmenterState::Scanning { from: cue + 1 }
                            } else if end >= n_windows {
                                diagnostics.record(
                                    SkipScope::Trial { cue_event: cue },
                                    SkipReason::OutOfBounds {
                                        end,
                                        available: n_windows,
                                    },
                                );
                                SegmenterState::Scanning { from: cue + 1 }
                            } else {
                                SegmenterState::Emit(TrialSpan {
                                    label,
                                    cue_event: cue,
                                    start: start_window,
                                    end,
                                    cue_onset: fb.onset - start_window,
                                })
                            }
                        }
                        None => {
                            diagnostics.record(
                                SkipScope::Trial { cue_event: cue },
                                SkipReason::MissingFeedback {
                                    lookahead: self.protocol.lookahead,
                                },
                            );
                            SegmenterState::Scanning { from: cue + 1 }
                        }
                    }
                }
                SegmenterState::Emit(span) => {
                    spans.push(span);
                    SegmenterState::Scanning {
                        from: span.cue_event + 1,
                    }
                }
            };
        }

        spans
    }

    /// Segment a session PSD into a padded activity tensor
    ///
    /// Zero accepted trials yields an empty tensor, not an error.
    pub fn segment(
        &self,
        events: &[WindowedEvent],
        psd: &WindowedPsd,
        diagnostics: &Diagnostics,
    ) -> Result<ActivityTensor, PipelineError> {
        let spans = self.find_spans(events, psd.n_windows(), diagnostics);
        let blocks: Vec<TrialBlock> = spans
            .iter()
            .map(|span| TrialBlock {
                label: span.label,
                cue_onset: span.cue_onset,
                cue_event: span.cue_event,
                power: psd.power.slice(s![span.start..=span.end, .., ..]).to_owned(),
            })
            .collect();

        tracing::info!(
            "[TrialSegmenter] {} trials from {} events ({} windows)",
            blocks.len(),
            events.len(),
            psd.n_windows()
        );

        ActivityTensor::from_blocks(blocks, psd.freqs.clone(), psd.channels.clone())
    }

    fn kind(&self, event: &WindowedEvent) -> Option<EventKind> {
        EventKind::from_code(event.code, &self.protocol)
    }

    fn next_cue(&self, events: &[WindowedEvent], from: usize) -> Option<(usize, TaskClass)> {
        events
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(i, event)| match self.kind(event) {
                Some(EventKind::Cue(label)) => Some((i, label)),
                _ => None,
            })
    }

    /// Nearest fixation among the `lookback` events before the cue
    fn find_fixation(&self, events: &[WindowedEvent], cue: usize) -> Option<usize> {
        let first = cue.saturating_sub(self.protocol.lookback);
        (first..cue)
            .rev()
            .find(|&i| self.kind(&events[i]) == Some(EventKind::Fixation))
    }

    /// Nearest feedback among the `lookahead` events after the cue
    fn find_feedback(&self, events: &[WindowedEvent], cue: usize) -> Option<usize> {
        let last = (cue + self.protocol.lookahead).min(events.len().saturating_sub(1));
        (cue + 1..=last).find(|&i| self.kind(&events[i]) == Some(EventKind::Feedback))
    }
}

// EventAligner - sample-indexed markers to window-indexed markers
//
// Window w of a run starts at sample w × stride. The backward rule maps a
// sample to the latest window starting at or before it, the forward rule to
// the earliest window starting at or after it. Durations always round up so
// a non-empty event never collapses to zero windows.

use serde::{Deserialize, Serialize};

use crate::signal::EventMarker;

/// Sample-to-window rounding rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingDirection {
    /// floor(position / stride)
    Backward,
    /// ceil(position / stride)
    Forward,
}

/// Event marker in window units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowedEvent {
    pub code: u16,
    /// Onset window index on the session timeline
    pub onset: usize,
    /// Duration in windows
    pub duration: usize,
}

/// Map a sample position to a window index
pub fn pos_to_window(sample_pos: usize, stride: usize, direction: MappingDirection) -> usize {
    let stride = stride.max(1);
    match direction {
        MappingDirection::Backward => sample_pos / stride,
        MappingDirection::Forward => (sample_pos + stride - 1) / stride,
    }
}

/// Map a sample duration to a window count (rounded up)
pub fn duration_to_windows(samples: usize, stride: usize) -> usize {
    let stride = stride.max(1);
    (samples + stride - 1) / stride
}

/// Converts marker streams of consecutive runs onto one window timeline
#[derive(Debug, Clone, Copy)]
pub struct EventAligner {
    stride: usize,
    direction: MappingDirection,
}

impl EventAligner {
    pub fn new(stride: usize, direction: MappingDirection) -> Self {
        Self {
            stride: stride.max(1),
            direction,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Align one run's markers, shifting onsets by `window_offset`
    ///
    /// `window_offset` is the number of windows of all runs that precede this
    /// one in the session.
    pub fn align(&self, events: &[EventMarker], window_offset: usize) -> Vec<WindowedEvent> {
        events
            .iter()
            .map(|event| WindowedEvent {
                code: event.code,
                onset: window_offset + pos_to_window(event.position, self.stride, self.direction),
                duration: duration_to_windows(event.duration, self.stride),
            })
            .collect()
    }

    /// Align several runs, given each run's markers and window count
    pub fn align_session<'a, I>(&self, runs: I) -> Vec<WindowedEvent>
    where
        I: IntoIterator<Item = (&'a [EventMarker], usize)>,
    {
        let mut offset = 0;
        let mut aligned = Vec::new();
        for (events, n_windows) in runs {
            aligned.extend(self.align(events, offset));
            offset += n_windows;
        }
        aligned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backward_and_forward_rules() {
        assert_eq!(pos_to_window(0, 32, MappingDirection::Backward), 0);
        assert_eq!(pos_to_window(31, 32, MappingDirection::Backward), 0);
        assert_eq!(pos_to_window(32, 32, MappingDirection::Backward), 1);
        assert_eq!(pos_to_window(33, 32, MappingDirection::Forward), 2);
        assert_eq!(pos_to_window(64, 32, MappingDirection::Forward), 2);
    }

    #[test]
    fn test_backward_mapping_is_monotonic() {
        let stride = 32;
        let mut previous = 0;
        for pos in 0..10_000 {
            let w = pos_to_window(pos, stride, MappingDirection::Backward);
            assert!(w >= previous, "window decreased at sample {}", pos);
            previous = w;
        }
    }

    #[test]
    fn test_duration_rounds_up() {
        assert_eq!(duration_to_windows(0, 32), 0);
        assert_eq!(duration_to_windows(1, 32), 1);
        assert_eq!(duration_to_windows(32, 32), 1);
        assert_eq!(duration_to_windows(33, 32), 2);
    }

    #[test]
    fn test_run_offset_matches_combined_timeline() {
        // Runs whose lengths are whole multiples of the stride
        let stride = 32;
        let aligner = EventAligner::new(stride, MappingDirection::Backward);
        let run_a = vec![EventMarker::new(786, 100, 512), EventMarker::new(773, 640, 64)];
        let run_b = vec![EventMarker::new(786, 70, 512), EventMarker::new(771, 999, 40)];
        let run_a_samples = 3200;

        let split = aligner.align_session([
            (run_a.as_slice(), run_a_samples / stride),
            (run_b.as_slice(), 0),
        ]);

        let combined: Vec<EventMarker> = run_a
            .iter()
            .copied()
            .chain(run_b.iter().map(|e| {
                EventMarker::new(e.code, e.position + run_a_samples, e.duration)
            }))
            .collect();
        let joined = aligner.align(&combined, 0);

        assert_eq!(split, joined);
    }

    #[test]
    fn test_align_keeps_order_and_codes() {
        let aligner = EventAligner::new(16, MappingDirection::Backward);
        let events = vec![
            EventMarker::new(786, 0, 48),
            EventMarker::new(773, 48, 16),
            EventMarker::new(781, 64, 64),
        ];
        let aligned = aligner.align(&events, 10);
        assert_eq!(
            aligned,
            vec![
                WindowedEvent { code: 786, onset: 10, duration: 3 },
                WindowedEvent { code: 773, onset: 13, duration: 1 },
                WindowedEvent { code: 781, onset: 14, duration: 4 },
            ]
        );
        assert!(aligned.windows(2).all(|w| w[0].onset <= w[1].onset));
    }
}

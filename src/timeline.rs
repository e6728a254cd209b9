use std::collections::BTreeMap;

use crate::config::UNKNOWN_STATE;
use crate::labels::{KeyframeEvent, ValueEvent};

/// Expands sorted keyframe events into a dense per-frame state sequence of
/// exactly `total_frames` entries.
///
/// Forward-hold reconstruction: the state at frame `i` is the state of the
/// latest event with frame index at most `i`. Frames before the first event
/// take the first event's state; with no events at all every frame is
/// `"unknown"`. Events sharing a frame index apply in sort order, so the
/// later one wins.
pub fn reconstruct(events: &[KeyframeEvent], total_frames: usize) -> Vec<String> {
    let mut current = events
        .first()
        .map(|event| event.state.clone())
        .unwrap_or_else(|| UNKNOWN_STATE.to_string());

    let mut timeline = Vec::with_capacity(total_frames);
    let mut next = 0_usize;

    for frame in 0..total_frames {
        while next < events.len() && events[next].frame <= frame {
            current = events[next].state.clone();
            next += 1;
        }
        timeline.push(current.clone());
    }

    timeline
}

/// Count of frames per state, keyed in sorted state order.
pub fn state_distribution(states: &[String]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for state in states {
        *counts.entry(state.clone()).or_insert(0_usize) += 1;
    }
    counts
}

/// A contiguous frame range `[start, end)` holding one annotated value set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSpan {
    pub start_frame: usize,
    pub end_frame: usize,
    pub values: Vec<String>,
}

/// Derives state spans from value events under the same forward-hold rule
/// as `reconstruct`: each event opens a span that runs until the next
/// event's frame, and the final span closes at `total_frames`. Events at or
/// past `total_frames` contribute no span.
pub fn state_spans(events: &[ValueEvent], total_frames: usize) -> Vec<StateSpan> {
    let mut spans = Vec::new();

    for (position, event) in events.iter().enumerate() {
        if event.frame >= total_frames {
            break;
        }

        let end_frame = events
            .get(position + 1)
            .map(|next| next.frame.min(total_frames))
            .unwrap_or(total_frames);

        // A same-frame successor supersedes this event entirely.
        if end_frame <= event.frame {
            continue;
        }

        spans.push(StateSpan {
            start_frame: event.frame,
            end_frame,
            values: event.values.clone(),
        });
    }

    spans
}

/// The leading frame range `[start, end)` with no state defined. Forward-hold
/// admits no interior gaps: once any state is established it persists, so the
/// only possible gap precedes the first keyframe. With no events the whole
/// timeline is undefined.
pub fn undefined_gap(events: &[ValueEvent], total_frames: usize) -> Option<(usize, usize)> {
    if total_frames == 0 {
        return None;
    }

    match events.first() {
        Some(first) if first.frame == 0 => None,
        Some(first) => Some((0, first.frame.min(total_frames))),
        None => Some((0, total_frames)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(frame: usize, state: &str) -> KeyframeEvent {
        KeyframeEvent {
            frame,
            state: state.to_string(),
        }
    }

    fn value_event(frame: usize, values: &[&str]) -> ValueEvent {
        ValueEvent {
            frame,
            values: values.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn forward_hold_backfills_before_first_event() {
        let events = vec![event(5, "A"), event(12, "B")];
        let timeline = reconstruct(&events, 20);

        assert_eq!(timeline.len(), 20);
        assert!(timeline[..12].iter().all(|state| state == "A"));
        assert!(timeline[12..].iter().all(|state| state == "B"));
    }

    #[test]
    fn empty_events_yield_all_unknown() {
        let timeline = reconstruct(&[], 7);
        assert_eq!(timeline.len(), 7);
        assert!(timeline.iter().all(|state| state == UNKNOWN_STATE));
    }

    #[test]
    fn later_event_wins_at_equal_frame_index() {
        let events = vec![event(0, "A"), event(10, "B"), event(10, "C")];
        let timeline = reconstruct(&events, 15);

        assert_eq!(timeline[9], "A");
        assert_eq!(timeline[10], "C");
        assert_eq!(timeline[14], "C");
    }

    #[test]
    fn state_distribution_counts_every_frame() {
        let timeline = reconstruct(&[event(0, "closed"), event(50, "open")], 100);
        let distribution = state_distribution(&timeline);

        assert_eq!(distribution["closed"], 50);
        assert_eq!(distribution["open"], 50);
        assert_eq!(distribution.values().sum::<usize>(), 100);
    }

    #[test]
    fn spans_close_at_next_event_and_total_frames() {
        let events = vec![value_event(5, &["1"]), value_event(12, &["2", "3"])];
        let spans = state_spans(&events, 20);

        assert_eq!(
            spans,
            vec![
                StateSpan {
                    start_frame: 5,
                    end_frame: 12,
                    values: vec!["1".to_string()],
                },
                StateSpan {
                    start_frame: 12,
                    end_frame: 20,
                    values: vec!["2".to_string(), "3".to_string()],
                },
            ]
        );
    }

    #[test]
    fn gap_is_only_the_prefix_before_the_first_event() {
        let events = vec![value_event(5, &["1"])];
        assert_eq!(undefined_gap(&events, 20), Some((0, 5)));

        let from_zero = vec![value_event(0, &["1"])];
        assert_eq!(undefined_gap(&from_zero, 20), None);

        assert_eq!(undefined_gap(&[], 20), Some((0, 20)));
    }
}

//! Playback window resolution.
//!
//! Turns a viewer's requested time range into concrete `[start, end)` frame
//! indices against a frame source. A range that does not intersect the log
//! resolves to nothing, and that failure is silent at the protocol level:
//! no envelope goes back to the client.

use tracing::debug;

use crate::settings::Settings;
use crate::source::FrameSource;

/// Requested playback time range. Absent bounds take defaults during
/// resolution: log start for `start_timestamp`, start plus the configured
/// default duration for `end_timestamp`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
    pub start_timestamp: Option<f64>,
    pub end_timestamp: Option<f64>,
}

/// A resolved playback window over the frame store.
///
/// `cursor` is the next index to deliver; the owning controller is the only
/// mutator. `start <= cursor <= end` holds for every window the controller
/// touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackWindow {
    pub start: usize,
    pub end: usize,
    pub cursor: usize,
}

impl PlaybackWindow {
    /// Whether delivery has consumed the whole window.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.end
    }
}

/// Resolve a requested time range against the log.
///
/// Returns `None` when the range does not intersect the log at all (or the
/// log is empty). An out-of-range-low start resolves to index 1, and an end
/// past the log extends to the full frame count; both are long-standing
/// request-range semantics, kept as given. `end` is clamped to the
/// configured frame limit regardless of the requested duration.
pub fn resolve<S: FrameSource>(
    source: &S,
    settings: &Settings,
    range: TimeRange,
) -> Option<PlaybackWindow> {
    let log_start = source.start_timestamp()?;
    let log_end = source.end_timestamp()?;

    let start_timestamp = range.start_timestamp.unwrap_or(log_start);
    let end_timestamp = range.end_timestamp.unwrap_or(start_timestamp + settings.duration_ms);

    if start_timestamp > log_end || end_timestamp < log_start {
        debug!(
            start_timestamp,
            end_timestamp, log_start, log_end, "requested range does not intersect log"
        );
        return None;
    }

    let start = source.index_at_or_after(start_timestamp).unwrap_or(1);
    let mut end = source.index_at_or_after(end_timestamp).unwrap_or(source.frame_count());
    end = end.min(settings.frame_limit);

    debug!(start, end, start_timestamp, end_timestamp, "resolved playback window");
    Some(PlaybackWindow { start, end, cursor: start })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameEncoding;
    use crate::store::{Frame, FrameStore};
    use bytes::Bytes;
    use proptest::prelude::*;

    fn store(timestamps: &[f64]) -> FrameStore {
        let frames = timestamps
            .iter()
            .map(|&timestamp| Frame {
                timestamp,
                encoding: FrameEncoding::Text,
                payload: Bytes::from_static(b"{}"),
            })
            .collect();
        FrameStore::new(frames, None).unwrap()
    }

    fn settings(frame_limit: usize) -> Settings {
        Settings { frame_limit, ..Settings::default() }
    }

    #[test]
    fn concrete_scenario_resolves_interior_range() {
        // Store [0, 10, 20, 30, 40], limit 5, request 5..25 -> start=1, end=3.
        let store = store(&[0.0, 10.0, 20.0, 30.0, 40.0]);
        let window = resolve(
            &store,
            &settings(5),
            TimeRange { start_timestamp: Some(5.0), end_timestamp: Some(25.0) },
        )
        .unwrap();
        assert_eq!(window, PlaybackWindow { start: 1, end: 3, cursor: 1 });
    }

    #[test]
    fn start_past_log_end_yields_no_window() {
        let store = store(&[0.0, 10.0, 20.0]);
        let range = TimeRange { start_timestamp: Some(21.0), end_timestamp: Some(30.0) };
        assert_eq!(resolve(&store, &settings(100), range), None);
    }

    #[test]
    fn end_before_log_start_yields_no_window() {
        let store = store(&[10.0, 20.0, 30.0]);
        let range = TimeRange { start_timestamp: Some(0.0), end_timestamp: Some(5.0) };
        assert_eq!(resolve(&store, &settings(100), range), None);
    }

    #[test]
    fn empty_log_yields_no_window() {
        let store = store(&[]);
        assert_eq!(resolve(&store, &settings(100), TimeRange::default()), None);
    }

    #[test]
    fn absent_start_defaults_to_log_start() {
        let store = store(&[10.0, 20.0, 30.0]);
        let window = resolve(
            &store,
            &settings(100),
            TimeRange { start_timestamp: None, end_timestamp: Some(25.0) },
        )
        .unwrap();
        assert_eq!(window.start, 0);
        assert_eq!(window.end, 2);
    }

    #[test]
    fn absent_end_defaults_to_start_plus_duration() {
        let store = store(&[0.0, 10.0, 20.0, 30.0, 40.0]);
        let custom = Settings { duration_ms: 15.0, frame_limit: 100, ..Settings::default() };
        let window = resolve(
            &store,
            &custom,
            TimeRange { start_timestamp: Some(10.0), end_timestamp: None },
        )
        .unwrap();
        assert_eq!(window.start, 1);
        // end = first index with ts >= 25
        assert_eq!(window.end, 3);
    }

    #[test]
    fn end_past_log_extends_to_frame_count() {
        let store = store(&[0.0, 10.0, 20.0]);
        let window = resolve(
            &store,
            &settings(100),
            TimeRange { start_timestamp: Some(5.0), end_timestamp: Some(1_000.0) },
        )
        .unwrap();
        assert_eq!(window.end, 3);
    }

    #[test]
    fn frame_limit_clamps_end() {
        let store = store(&[0.0, 10.0, 20.0, 30.0, 40.0]);
        let window = resolve(
            &store,
            &settings(2),
            TimeRange { start_timestamp: Some(0.0), end_timestamp: Some(100.0) },
        )
        .unwrap();
        assert_eq!(window.end, 2);
    }

    proptest! {
        #[test]
        fn prop_resolved_window_respects_bounds(
            count in 1usize..64,
            step in 1.0f64..100.0,
            start_req in proptest::option::of(-500.0f64..5000.0),
            end_req in proptest::option::of(-500.0f64..5000.0),
            frame_limit in 1usize..128,
        ) {
            let timestamps: Vec<f64> = (0..count).map(|i| i as f64 * step).collect();
            let store = store(&timestamps);
            let settings = settings(frame_limit);
            let range = TimeRange { start_timestamp: start_req, end_timestamp: end_req };

            if let Some(window) = resolve(&store, &settings, range) {
                prop_assert_eq!(window.cursor, window.start);
                prop_assert!(window.start <= count);
                prop_assert!(window.end <= count);
                prop_assert!(window.end <= frame_limit);
            }
        }

        #[test]
        fn prop_disjoint_ranges_never_resolve(
            count in 1usize..64,
            step in 1.0f64..100.0,
            past_gap in 0.001f64..1000.0,
        ) {
            let timestamps: Vec<f64> = (0..count).map(|i| i as f64 * step).collect();
            let last = *timestamps.last().unwrap();
            let store = store(&timestamps);

            // Entirely after the log.
            let after = TimeRange {
                start_timestamp: Some(last + past_gap),
                end_timestamp: Some(last + past_gap + 10.0),
            };
            prop_assert!(resolve(&store, &settings(128), after).is_none());

            // Entirely before the log.
            let before = TimeRange {
                start_timestamp: Some(-past_gap - 10.0),
                end_timestamp: Some(-past_gap),
            };
            prop_assert!(resolve(&store, &settings(128), before).is_none());
        }
    }
}

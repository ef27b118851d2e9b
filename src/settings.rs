//! Process-wide playback settings.
//!
//! Settings are immutable after startup and shared read-only by every
//! connection. Timestamps throughout the crate are log-time milliseconds,
//! and `duration_ms` shares that unit.

use serde::Deserialize;
use std::time::Duration;

/// Immutable server-wide playback settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Live mode: metadata carries no log bounds and completed windows do
    /// not emit `transform_log_done`.
    pub live: bool,

    /// Default playback window length in log-time milliseconds, used when a
    /// request omits its end timestamp.
    pub duration_ms: f64,

    /// Fixed delay between a completed send and the next scheduled one.
    pub send_interval_ms: u64,

    /// Skip the physical send of image-bearing (binary) frames while still
    /// advancing the cursor.
    pub skip_images: bool,

    /// Hard ceiling on the end index served per window, independent of the
    /// requested duration.
    pub frame_limit: usize,

    /// Restart a completed window from its start, rebasing timestamps so
    /// they keep advancing from the viewer's perspective.
    #[serde(rename = "loop")]
    pub loop_playback: bool,

    /// Websocket listen port.
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            live: false,
            duration_ms: 30_000.0,
            send_interval_ms: 50,
            skip_images: false,
            frame_limit: usize::MAX,
            loop_playback: false,
            port: 8081,
        }
    }
}

impl Settings {
    /// Pacing delay between completed sends.
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert!(!settings.live);
        assert_eq!(settings.duration_ms, 30_000.0);
        assert_eq!(settings.send_interval(), Duration::from_millis(50));
        assert!(!settings.loop_playback);
        assert_eq!(settings.frame_limit, usize::MAX);
    }

    #[test]
    fn deserializes_loop_keyword_field() {
        let settings: Settings =
            serde_json::from_str(r#"{"loop": true, "send_interval_ms": 0, "frame_limit": 5}"#)
                .unwrap();
        assert!(settings.loop_playback);
        assert_eq!(settings.send_interval_ms, 0);
        assert_eq!(settings.frame_limit, 5);
        // untouched fields fall back to defaults
        assert_eq!(settings.port, 8081);
    }
}

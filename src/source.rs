//! Source trait for indexed frame logs.

use bytes::Bytes;

use crate::codec::FrameEncoding;
use crate::error::Result;

/// Trait for ordered, indexable frame sources.
///
/// A source abstracts over how frames were produced (stored log dump, live
/// bridge buffering into log form) and exposes only what playback needs:
/// parallel index access to timestamps, encoding tags, and pre-encoded
/// payloads. Timestamps are non-decreasing by index. Sources are shared
/// read-only across all connections.
pub trait FrameSource: Send + Sync + 'static {
    /// Number of frames in the log.
    fn frame_count(&self) -> usize;

    /// Timestamp of the frame at `index`, in log-time milliseconds.
    fn timestamp(&self, index: usize) -> f64;

    /// Wire encoding of the frame at `index`.
    fn encoding(&self, index: usize) -> FrameEncoding;

    /// Pre-encoded payload of the frame at `index`.
    ///
    /// Returns an error when `index` is out of bounds or the payload
    /// cannot be produced.
    fn load_frame(&self, index: usize) -> Result<Bytes>;

    /// The log's metadata payload, if the source carries one.
    fn load_metadata(&self) -> Option<(Bytes, FrameEncoding)>;

    /// First frame index whose timestamp is at or after `timestamp_ms`.
    ///
    /// Returns `None` when every frame is earlier.
    fn index_at_or_after(&self, timestamp_ms: f64) -> Option<usize> {
        (0..self.frame_count()).find(|&i| self.timestamp(i) >= timestamp_ms)
    }

    /// Timestamp of the first frame, if any.
    fn start_timestamp(&self) -> Option<f64> {
        (self.frame_count() > 0).then(|| self.timestamp(0))
    }

    /// Timestamp of the last frame, if any.
    fn end_timestamp(&self) -> Option<f64> {
        self.frame_count().checked_sub(1).map(|i| self.timestamp(i))
    }
}

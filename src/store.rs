//! In-memory frame store.
//!
//! The store is built once at startup, validated, and then shared read-only
//! by every connection. It is the crate's own [`FrameSource`] implementation;
//! frames arrive pre-encoded and are never mutated in place (loop rebasing
//! always operates on a per-send copy).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::codec::{self, FrameEncoding, WirePayload};
use crate::error::{Result, StreamError};
use crate::source::FrameSource;

/// One stored frame: an opaque pre-encoded payload plus its timestamp and
/// wire encoding tag.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Log-time milliseconds. Non-decreasing across the store.
    pub timestamp: f64,
    pub encoding: FrameEncoding,
    pub payload: Bytes,
}

/// Ordered, fixed collection of frames with index lookup by time.
#[derive(Debug, Default)]
pub struct FrameStore {
    frames: Vec<Frame>,
    metadata: Option<(Bytes, FrameEncoding)>,
}

impl FrameStore {
    /// Build a store from already-ordered frames.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::MalformedFrame`] when timestamps decrease
    /// between consecutive frames.
    pub fn new(frames: Vec<Frame>, metadata: Option<(Bytes, FrameEncoding)>) -> Result<Self> {
        for pair in frames.windows(2) {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(StreamError::malformed(format!(
                    "frame timestamps decrease: {} then {}",
                    pair[0].timestamp, pair[1].timestamp
                )));
            }
        }
        Ok(Self { frames, metadata })
    }

    /// Load a pre-encoded log dump from a directory.
    ///
    /// Expects `<seq>-frame.json` / `<seq>-frame.glb` files; the lowest
    /// sequence number is the log metadata, the rest are data frames in
    /// sequence order. Each data frame's timestamp is read from its first
    /// update; frames without one inherit the previous timestamp.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Arc<Self>> {
        let dir = dir.as_ref();
        let mut entries: Vec<(u64, PathBuf)> = std::fs::read_dir(dir)
            .map_err(|e| StreamError::store(dir.to_path_buf(), e))?
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                let seq = parse_frame_sequence(&path)?;
                Some((seq, path))
            })
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);

        if entries.is_empty() {
            return Err(StreamError::store(
                dir.to_path_buf(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no frame files in log"),
            ));
        }

        let mut metadata = None;
        let mut frames = Vec::with_capacity(entries.len().saturating_sub(1));
        let mut last_timestamp = 0.0_f64;

        for (position, (seq, path)) in entries.iter().enumerate() {
            let raw = std::fs::read(path).map_err(|e| StreamError::store(path.clone(), e))?;
            let payload = wire_payload_for(path, raw);
            let encoding = payload.encoding();

            if position == 0 {
                // Lowest sequence number is the metadata frame.
                metadata = Some((payload_bytes(&payload), encoding));
                continue;
            }

            let timestamp = match codec::unpack(&payload) {
                Ok(frame) => first_update_timestamp(&frame.json).unwrap_or_else(|| {
                    debug!(seq, "frame carries no update timestamp, inheriting previous");
                    last_timestamp
                }),
                Err(e) => {
                    warn!(seq, path = %path.display(), error = %e, "skipping undecodable frame");
                    continue;
                }
            };
            last_timestamp = timestamp;

            frames.push(Frame { timestamp, encoding, payload: payload_bytes(&payload) });
        }

        info!(
            frames = frames.len(),
            metadata = metadata.is_some(),
            dir = %dir.display(),
            "loaded frame log"
        );

        Ok(Arc::new(Self::new(frames, metadata)?))
    }

}

impl FrameSource for FrameStore {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn timestamp(&self, index: usize) -> f64 {
        self.frames[index].timestamp
    }

    fn encoding(&self, index: usize) -> FrameEncoding {
        self.frames[index].encoding
    }

    fn load_frame(&self, index: usize) -> Result<Bytes> {
        self.frames
            .get(index)
            .map(|f| f.payload.clone())
            .ok_or(StreamError::IndexOutOfBounds { index, count: self.frames.len() })
    }

    fn load_metadata(&self) -> Option<(Bytes, FrameEncoding)> {
        self.metadata.clone()
    }

    fn index_at_or_after(&self, timestamp_ms: f64) -> Option<usize> {
        // Timestamps are non-decreasing, so binary search applies.
        let index = self.frames.partition_point(|f| f.timestamp < timestamp_ms);
        (index < self.frames.len()).then_some(index)
    }
}

fn parse_frame_sequence(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let rest = name
        .strip_suffix("-frame.json")
        .or_else(|| name.strip_suffix("-frame.glb"))?;
    rest.parse().ok()
}

fn wire_payload_for(path: &Path, raw: Vec<u8>) -> WirePayload {
    if path.extension().is_some_and(|ext| ext == "glb") {
        WirePayload::Binary(Bytes::from(raw))
    } else {
        WirePayload::Text(String::from_utf8_lossy(&raw).into_owned())
    }
}

fn payload_bytes(payload: &WirePayload) -> Bytes {
    match payload {
        WirePayload::Binary(bytes) => bytes.clone(),
        WirePayload::Text(text) => Bytes::from(text.clone().into_bytes()),
    }
}

fn first_update_timestamp(json: &Value) -> Option<f64> {
    json.get("data")?
        .get("updates")?
        .as_array()?
        .first()?
        .get("timestamp")?
        .as_f64()
}

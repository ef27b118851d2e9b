//! Per-connection playback controller.
//!
//! The controller turns resolved playback windows into a paced sequence of
//! frame deliveries. It owns at most one active window and one pending
//! replacement per connection; the owning session drives it with `tick`,
//! one call per pacing deadline, and never concurrently. All timestamps a
//! looping window emits carry the accumulated loop offset so they keep
//! advancing from the viewer's perspective.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::codec::{self, FrameEncoding, WirePayload};
use crate::error::Result;
use crate::protocol::ServerMessage;
use crate::settings::Settings;
use crate::source::FrameSource;
use crate::transport::FrameSink;
use crate::window::{self, PlaybackWindow, TimeRange};

/// What a single paced tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No window is active; nothing to pace.
    Idle,
    /// A frame was processed (sent or deliberately suppressed); the next
    /// tick should be armed after the send interval.
    Continue,
    /// The active window finished; pacing stops until the next request.
    Completed,
}

/// Playback state machine for one connection.
pub struct PlaybackController<S> {
    source: Arc<S>,
    settings: Arc<Settings>,

    /// Window currently being delivered, if any.
    active: Option<PlaybackWindow>,
    /// Single replacement slot; latest request wins, requests never queue.
    pending: Option<PlaybackWindow>,

    /// Accumulated loop rebase offset in log-time milliseconds.
    loop_offset_ms: f64,
    /// Id of the most recent transform request, echoed in the done envelope.
    transform_id: String,
}

impl<S: FrameSource> PlaybackController<S> {
    pub fn new(source: Arc<S>, settings: Arc<Settings>) -> Self {
        Self {
            source,
            settings,
            active: None,
            pending: None,
            loop_offset_ms: 0.0,
            transform_id: String::new(),
        }
    }

    /// Whether a window is currently being delivered.
    pub fn is_inflight(&self) -> bool {
        self.active.is_some()
    }

    /// Accumulated loop offset, for diagnostics.
    pub fn loop_offset_ms(&self) -> f64 {
        self.loop_offset_ms
    }

    /// Record the id of the transform request being served. Retained even
    /// when the request resolves to no window.
    pub fn set_transform_id(&mut self, id: impl Into<String>) {
        self.transform_id = id.into();
    }

    /// Arbitrate a new playback request.
    ///
    /// Returns `true` when an idle controller adopted the window and the
    /// caller should start pacing. A request that resolves to no window is
    /// silently dropped; a request arriving while a window is inflight
    /// overwrites the replacement slot and takes effect at the next tick.
    pub fn request_playback(&mut self, range: TimeRange) -> bool {
        let Some(window) = window::resolve(self.source.as_ref(), &self.settings, range) else {
            debug!("playback request resolved to no window, dropping");
            return false;
        };

        if self.active.is_some() {
            debug!(?window, "replacing inflight request at next tick");
            self.pending = Some(window);
            false
        } else {
            debug!(?window, "starting playback");
            self.active = Some(window);
            true
        }
    }

    /// Run one paced tick: adopt any pending replacement, then deliver the
    /// frame at the cursor or finish the window.
    ///
    /// # Errors
    ///
    /// Only transport failures propagate. A frame that fails to load or
    /// re-encode is logged and skipped, and the cursor still advances.
    pub async fn tick(&mut self, sink: &mut impl FrameSink) -> Result<TickOutcome> {
        if let Some(replacement) = self.pending.take() {
            if self.active.take().is_some() {
                debug!("inflight window preempted");
                sink.send(ServerMessage::Cancelled {}.to_wire()?).await?;
            }
            self.active = Some(replacement);
        }

        let Some(mut active) = self.active else {
            return Ok(TickOutcome::Idle);
        };

        if active.is_exhausted() {
            if self.settings.loop_playback && active.end > active.start {
                // Rebase by the span just played so the restarted window's
                // timestamps keep advancing.
                let span = self.source.timestamp(active.end - 1) - self.source.timestamp(active.start);
                self.loop_offset_ms += span;
                active.cursor = active.start;
                trace!(loop_offset_ms = self.loop_offset_ms, "window looped");
            } else {
                if !self.settings.live {
                    let done = ServerMessage::TransformLogDone { id: self.transform_id.clone() };
                    sink.send(done.to_wire()?).await?;
                }
                debug!(start = active.start, end = active.end, "window complete");
                self.active = None;
                return Ok(TickOutcome::Completed);
            }
        }

        // Defensive wrap; resolution already bounds the cursor to the store.
        let index = active.cursor % self.source.frame_count().max(1);
        let encoding = self.source.encoding(index);
        let suppressed = encoding == FrameEncoding::Binary && self.settings.skip_images;

        active.cursor += 1;
        self.active = Some(active);

        if suppressed {
            trace!(index, "image frame suppressed");
            return Ok(TickOutcome::Continue);
        }

        match self.prepare_frame(index, encoding) {
            Ok(payload) => {
                sink.send(payload).await?;
                trace!(
                    index,
                    cursor = active.cursor,
                    rebased = self.loop_offset_ms != 0.0,
                    "frame sent"
                );
            }
            Err(e) if e.is_frame_local() => {
                warn!(index, error = %e, "dropping frame that failed to encode");
            }
            Err(e) => return Err(e),
        }

        Ok(TickOutcome::Continue)
    }

    /// Load the frame at `index` and apply loop rebasing when an offset has
    /// accumulated. The stored frame is never mutated; rebasing produces a
    /// transmitted copy.
    fn prepare_frame(&self, index: usize, encoding: FrameEncoding) -> Result<WirePayload> {
        let bytes = self.source.load_frame(index)?;
        let payload = wire_payload(bytes, encoding);

        if self.loop_offset_ms == 0.0 {
            return Ok(payload);
        }

        let mut frame = codec::unpack(&payload)?;
        codec::rebase_timestamps(&mut frame.json, self.loop_offset_ms);
        codec::pack(&frame)
    }
}

fn wire_payload(bytes: Bytes, encoding: FrameEncoding) -> WirePayload {
    match encoding {
        FrameEncoding::Binary => WirePayload::Binary(bytes),
        FrameEncoding::Text => {
            WirePayload::Text(String::from_utf8_lossy(bytes.as_ref()).into_owned())
        }
    }
}

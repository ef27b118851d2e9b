//! One viewer connection's lifecycle.
//!
//! A session owns the playback controller for its connection and handles
//! the pieces around it: the one-time metadata send, inbound control
//! dispatch, and the live/non-live metadata bounds rules. The transport
//! loop that feeds it lives in [`crate::server`]; the session itself only
//! ever talks to a [`FrameSink`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::codec::{self, FrameEncoding, WirePayload};
use crate::controller::{PlaybackController, TickOutcome};
use crate::error::Result;
use crate::protocol::{self, ClientMessage};
use crate::settings::Settings;
use crate::source::FrameSource;
use crate::transport::FrameSink;
use crate::window::TimeRange;

/// State for one physical connection.
pub struct ConnectionSession<S> {
    connection_id: u64,
    settings: Arc<Settings>,
    source: Arc<S>,
    controller: PlaybackController<S>,
    metadata_sent: bool,
}

impl<S: FrameSource> ConnectionSession<S> {
    pub fn new(connection_id: u64, source: Arc<S>, settings: Arc<Settings>) -> Self {
        let controller = PlaybackController::new(Arc::clone(&source), Arc::clone(&settings));
        Self { connection_id, settings, source, controller, metadata_sent: false }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Whether the controller has a window inflight and pacing should run.
    pub fn is_inflight(&self) -> bool {
        self.controller.is_inflight()
    }

    /// Delay between a completed send and the next tick.
    pub fn send_interval(&self) -> Duration {
        self.settings.send_interval()
    }

    /// Deliver the log metadata, at most once per connection.
    ///
    /// In live mode any log bounds in the metadata are stripped (a live
    /// stream has no fixed extent); otherwise missing bounds are synthesized
    /// from the store. A store without metadata is tolerated with a warning.
    pub async fn send_metadata(&mut self, sink: &mut impl FrameSink) -> Result<()> {
        if self.metadata_sent {
            return Ok(());
        }
        self.metadata_sent = true;

        let Some((bytes, encoding)) = self.source.load_metadata() else {
            warn!(connection_id = self.connection_id, "log has no metadata frame, none sent");
            return Ok(());
        };

        let payload = match encoding {
            FrameEncoding::Binary => WirePayload::Binary(bytes),
            FrameEncoding::Text => {
                WirePayload::Text(String::from_utf8_lossy(bytes.as_ref()).into_owned())
            }
        };

        match self.prepare_metadata(&payload) {
            Ok(prepared) => sink.send(prepared).await?,
            Err(e) if e.is_frame_local() => {
                warn!(
                    connection_id = self.connection_id,
                    error = %e,
                    "metadata failed to re-encode, sending stored form"
                );
                sink.send(payload).await?;
            }
            Err(e) => return Err(e),
        }

        debug!(connection_id = self.connection_id, "metadata sent");
        Ok(())
    }

    /// Dispatch one inbound control message.
    ///
    /// # Errors
    ///
    /// A malformed envelope is an error for the caller to judge; the
    /// session does not tear the connection down over it. Transport errors
    /// from responses propagate.
    pub async fn handle_message(&mut self, text: &str) -> Result<()> {
        match protocol::parse_client_message(text)? {
            ClientMessage::Start(data) => {
                // Log selection is outside this layer; acknowledged as a no-op.
                debug!(connection_id = self.connection_id, ?data, "start message received");
            }
            ClientMessage::TransformLog(request) => {
                debug!(
                    connection_id = self.connection_id,
                    start = ?request.start_timestamp,
                    end = ?request.end_timestamp,
                    id = %request.id,
                    "transform_log received"
                );
                self.controller.set_transform_id(request.id);
                self.controller.request_playback(TimeRange {
                    start_timestamp: request.start_timestamp,
                    end_timestamp: request.end_timestamp,
                });
            }
            ClientMessage::Unknown(kind) => {
                warn!(connection_id = self.connection_id, kind, "unknown control message ignored");
            }
        }
        Ok(())
    }

    /// Run one paced delivery tick.
    pub async fn tick(&mut self, sink: &mut impl FrameSink) -> Result<TickOutcome> {
        self.controller.tick(sink).await
    }

    fn prepare_metadata(&self, payload: &WirePayload) -> Result<WirePayload> {
        let mut frame = codec::unpack(payload)?;

        if self.settings.live {
            if let Some(log_info) = frame
                .json
                .get_mut("data")
                .and_then(|d| d.get_mut("log_info"))
                .and_then(Value::as_object_mut)
            {
                log_info.remove("start_time");
                log_info.remove("end_time");
            }
        } else if let Some(data) = frame.json.get_mut("data").and_then(Value::as_object_mut) {
            if !data.contains_key("log_info") {
                warn!(
                    connection_id = self.connection_id,
                    "metadata has no log_info, synthesizing from store bounds"
                );
                data.insert(
                    "log_info".to_string(),
                    json!({
                        "start_time": self.source.start_timestamp(),
                        "end_time": self.source.end_timestamp(),
                    }),
                );
            }
        }

        codec::pack(&frame)
    }
}

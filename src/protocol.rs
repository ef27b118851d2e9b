//! Control protocol envelopes.
//!
//! Control messages are small JSON envelopes of the form
//! `{"type": "xviz/<name>", "data": {...}}`, exchanged as text messages on
//! the same connection that carries frame payloads. Unknown inbound types
//! are surfaced as [`ClientMessage::Unknown`] so the session can log and
//! ignore them; only unparseable JSON is an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::WirePayload;
use crate::error::{Result, StreamError};

const TYPE_START: &str = "xviz/start";
const TYPE_TRANSFORM_LOG: &str = "xviz/transform_log";

/// Raw control envelope as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Playback request carried by `xviz/transform_log`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TransformLogRequest {
    #[serde(default)]
    pub start_timestamp: Option<f64>,
    #[serde(default)]
    pub end_timestamp: Option<f64>,
    #[serde(default)]
    pub id: String,
}

/// Decoded client-to-server control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Log selection request. Acknowledged but a no-op at this layer.
    Start(Value),
    /// Time-range playback request.
    TransformLog(TransformLogRequest),
    /// Anything else; logged and ignored, never fatal.
    Unknown(String),
}

/// Parse an inbound control message.
///
/// # Errors
///
/// Returns [`StreamError::Codec`] when the text is not a valid envelope.
pub fn parse_client_message(text: &str) -> Result<ClientMessage> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| StreamError::codec("control envelope", e))?;

    match envelope.kind.as_str() {
        TYPE_START => Ok(ClientMessage::Start(envelope.data)),
        TYPE_TRANSFORM_LOG => {
            let request = serde_json::from_value(envelope.data)
                .map_err(|e| StreamError::codec("transform_log data", e))?;
            Ok(ClientMessage::TransformLog(request))
        }
        _ => Ok(ClientMessage::Unknown(envelope.kind)),
    }
}

/// Server-to-client control envelopes.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// An in-flight window was preempted by a replacement request.
    #[serde(rename = "xviz/cancelled")]
    Cancelled {},
    /// A non-looping, non-live window completed naturally. `id` echoes the
    /// triggering request.
    #[serde(rename = "xviz/transform_log_done")]
    TransformLogDone { id: String },
}

impl ServerMessage {
    /// Encode as a text wire payload.
    pub fn to_wire(&self) -> Result<WirePayload> {
        let text =
            serde_json::to_string(self).map_err(|e| StreamError::codec("server envelope", e))?;
        Ok(WirePayload::Text(text))
    }
}

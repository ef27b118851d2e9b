//! Transport seam for outbound payloads.

use crate::codec::WirePayload;
use crate::error::Result;

/// Trait for the outbound half of one viewer connection.
///
/// A resolved `send` future means the transport has accepted the write;
/// that completion is the playback loop's resumption point, so a slow or
/// congested transport naturally delays all subsequent pacing. Errors mean
/// the peer is unreachable and end the owning session.
#[async_trait::async_trait]
pub trait FrameSink: Send {
    /// Send one payload, resolving once the transport accepts it.
    async fn send(&mut self, payload: WirePayload) -> Result<()>;
}

/// Sink that records every payload, for exercising playback without a
/// network. Shared between unit and integration tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub sent: Vec<WirePayload>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text payloads in send order, for envelope assertions.
    pub fn texts(&self) -> Vec<&str> {
        self.sent
            .iter()
            .filter_map(|p| match p {
                WirePayload::Text(text) => Some(text.as_str()),
                WirePayload::Binary(_) => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl FrameSink for RecordingSink {
    async fn send(&mut self, payload: WirePayload) -> Result<()> {
        self.sent.push(payload);
        Ok(())
    }
}

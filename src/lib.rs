//! Paced websocket playback of timestamped visualization frame logs.
//!
//! vizstream serves a log of pre-encoded frames to remote viewers over a
//! persistent connection, under viewer-directed time-window control. The
//! heart of the crate is the per-connection [`PlaybackController`]: a state
//! machine that resolves a viewer's time-range request into an indexed
//! window over the shared [`FrameStore`], paces frame delivery against the
//! transport's write completion, replaces an in-flight request with a newer
//! one without restarting the connection, and rebases timestamps across
//! loop restarts so they stay monotonic for the viewer.
//!
//! # Example (driving playback without a network)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vizstream::{
//!     ConnectionSession, FrameStore, RecordingSink, Settings, TickOutcome,
//! };
//!
//! #[tokio::main]
//! async fn main() -> vizstream::Result<()> {
//!     let store = FrameStore::load_dir("/data/demo-log")?;
//!     let settings = Arc::new(Settings::default());
//!
//!     let mut session = ConnectionSession::new(1, store, settings);
//!     let mut sink = RecordingSink::new();
//!
//!     session.send_metadata(&mut sink).await?;
//!     session
//!         .handle_message(r#"{"type":"xviz/transform_log","data":{"id":"req-1"}}"#)
//!         .await?;
//!     while session.tick(&mut sink).await? == TickOutcome::Continue {}
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod controller;
mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod settings;
pub mod source;
pub mod store;
pub mod transport;
pub mod window;

pub use codec::{FrameEncoding, StructuredFrame, WirePayload};
pub use controller::{PlaybackController, TickOutcome};
pub use error::{Result, StreamError};
pub use protocol::{ClientMessage, ServerMessage, TransformLogRequest};
pub use session::ConnectionSession;
pub use settings::Settings;
pub use source::FrameSource;
pub use store::{Frame, FrameStore};
pub use transport::{FrameSink, RecordingSink};
pub use window::{PlaybackWindow, TimeRange};

//! Error types for frame streaming and playback.
//!
//! All errors implement `std::error::Error` and carry enough context to be
//! logged at the session boundary. Encode/decode failures propagate to the
//! playback controller, which drops the affected frame and keeps advancing;
//! transport failures end the owning session's loop.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for streaming operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for frame streaming operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    /// Inbound payload was neither a recognized binary container nor JSON text.
    #[error("malformed frame payload: {details}")]
    MalformedFrame { details: String },

    #[error("frame codec error in {context}")]
    Codec {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("frame store error: {path}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frame index {index} out of bounds (store has {count} frames)")]
    IndexOutOfBounds { index: usize, count: usize },

    #[error("transport error: {details}")]
    Transport {
        details: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StreamError {
    /// Helper constructor for malformed-payload errors.
    pub fn malformed(details: impl Into<String>) -> Self {
        StreamError::MalformedFrame { details: details.into() }
    }

    /// Helper constructor for codec errors with context.
    pub fn codec(context: impl Into<String>, source: serde_json::Error) -> Self {
        StreamError::Codec { context: context.into(), source }
    }

    /// Helper constructor for store I/O errors with path context.
    pub fn store(path: PathBuf, source: std::io::Error) -> Self {
        StreamError::Store { path, source }
    }

    /// Helper constructor for transport errors.
    pub fn transport(details: impl Into<String>) -> Self {
        StreamError::Transport { details: details.into(), source: None }
    }

    /// Helper constructor for transport errors with an underlying cause.
    pub fn transport_with_source(
        details: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Transport { details: details.into(), source: Some(source) }
    }

    /// Whether the owning session can keep running after this error.
    ///
    /// Codec failures affect a single frame; the delivery loop skips it and
    /// advances. Transport failures mean the peer is unreachable.
    pub fn is_frame_local(&self) -> bool {
        match self {
            StreamError::MalformedFrame { .. } => true,
            StreamError::Codec { .. } => true,
            StreamError::IndexOutOfBounds { .. } => true,
            StreamError::Store { .. } => true,
            StreamError::Transport { .. } => false,
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Store { path: PathBuf::from("<unknown>"), source: err }
    }
}

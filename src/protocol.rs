//! Wire format for chat frames.
//!
//! Every WebSocket text message carries one JSON object:
//!
//! ```json
//! {"type":"message","username":"alice","message":"hello","timestamp":"2024-01-01 12:00:00"}
//! ```
//!
//! All four fields are required. Payloads that fail to decode are rejected
//! with a [`ProtocolError`]; callers on the server drop them without closing
//! the connection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `strftime` format used for frame timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maximum accepted payload size (64 KiB). Larger payloads are rejected
/// before any JSON parsing happens.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// A frame serialized to its wire representation.
///
/// This is what the history log stores and what gets fanned out to peers.
/// Cloning is a reference-count bump.
pub type EncodedFrame = Arc<str>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("payload too large ({0} bytes, max {MAX_FRAME_BYTES})")]
    TooLarge(usize),

    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The `type` tag of a frame. Only chat messages exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Message,
}

/// One unit of chat payload. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    kind: FrameKind,
    username: String,
    message: String,
    timestamp: String,
}

impl Frame {
    /// Build a message frame stamped with the current local time.
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::with_timestamp(username, message, timestamp)
    }

    pub fn with_timestamp(
        username: impl Into<String>,
        message: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            kind: FrameKind::Message,
            username: username.into(),
            message: message.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Decode a text payload into a frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        if text.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::TooLarge(text.len()));
        }
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    /// Decode a binary payload. The bytes must be UTF-8 JSON.
    pub fn decode_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::TooLarge(data.len()));
        }
        let text = std::str::from_utf8(data).map_err(|_| ProtocolError::NotUtf8)?;
        Self::decode(text)
    }

    /// Serialize to the wire representation.
    pub fn encode(&self) -> Result<EncodedFrame, ProtocolError> {
        serde_json::to_string(self)
            .map(Arc::from)
            .map_err(ProtocolError::Encode)
    }

    /// The line shown in the client's message view.
    pub fn display_line(&self) -> String {
        format!("[{}] {}: {}", self.timestamp, self.username, self.message)
    }
}

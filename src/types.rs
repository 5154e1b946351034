//! Shared value types for the live view session manager

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque camera identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Media server location of a device's live stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPath {
    pub app: String,
    pub stream: String,
    /// Request type understood by the signaling endpoint, usually "play"
    #[serde(rename = "type")]
    pub kind: String,
}

impl StreamPath {
    pub fn new(app: impl Into<String>, stream: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            stream: stream.into(),
            kind: kind.into(),
        }
    }

    /// A path is usable only when both app and stream are present
    pub fn is_usable(&self) -> bool {
        !self.app.trim().is_empty() && !self.stream.trim().is_empty()
    }
}

impl fmt::Display for StreamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.app, self.stream, self.kind)
    }
}

/// Negotiated stream descriptor published once a session connects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPayload {
    pub stream_id: String,
    pub remote_sdp: String,
}

/// Pixel or bitstream layout of a frame handed to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    I420,
    Rgb24,
    H264AnnexB,
}

/// A frame produced by an engine's decode thread
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub timestamp_us: u64,
    pub sequence: u64,
    pub data: Bytes,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, format: FrameFormat, data: Bytes) -> Self {
        Self {
            width,
            height,
            format,
            timestamp_us: 0,
            sequence: 0,
            data,
        }
    }

    pub fn with_sequence(mut self, sequence: u64, timestamp_us: u64) -> Self {
        self.sequence = sequence;
        self.timestamp_us = timestamp_us;
        self
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// State the coordinator publishes for the UI
///
/// Every update replaces the whole snapshot, so readers never observe a
/// half-applied switch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub current_device_id: Option<DeviceId>,
    pub connection_payload: Option<ConnectionPayload>,
    pub is_switching: bool,
}

impl SessionSnapshot {
    /// True when a device is active with a negotiated payload
    pub fn is_connected(&self) -> bool {
        self.current_device_id.is_some() && self.connection_payload.is_some()
    }

    /// The UI renders this as "not connected" rather than a spinner
    pub fn is_idle(&self) -> bool {
        !self.is_switching && !self.is_connected()
    }
}

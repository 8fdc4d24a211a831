//! Event records and their wire encoding
//!
//! Every event is written to subscribers as one Server-Sent Events frame:
//!
//! ```text
//! data: {"type":"connection_created","data":{...},"timestamp":"2026-01-01T00:00:00Z"}\n\n
//! ```
//!
//! `serde_json` never emits raw newlines in compact output, so a frame always
//! holds exactly one `data:` line.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Greeting sent on every newly opened subscriber stream
pub const CONNECTED: &str = "connected";
/// Liveness-only frame
pub const HEARTBEAT: &str = "heartbeat";
/// A connection record was created
pub const CONNECTION_CREATED: &str = "connection_created";
/// A connection was executed (source fetched, destination written)
pub const CONNECTION_EXECUTED: &str = "connection_executed";
/// Both endpoints of a connection were probed
pub const CONNECTION_TESTED: &str = "connection_tested";
/// A connection record was deleted
pub const CONNECTION_DELETED: &str = "connection_deleted";

const FRAME_PREFIX: &[u8] = b"data: ";
const FRAME_SUFFIX: &[u8] = b"\n\n";

/// A broadcast notification
///
/// Immutable once built; the dispatcher consumes each published event once
/// and fans it out to every registered subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind, serialized as `type`
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque payload, serialized as `data`
    #[serde(rename = "data", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Human-readable message (greeting only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the event was produced
    pub timestamp: DateTime<Utc>,

    /// Position in publish order, assigned by the bus. Zero until published.
    #[serde(skip)]
    pub sequence: u64,
}

impl Event {
    /// Create an event carrying a payload
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload),
            message: None,
            timestamp: Utc::now(),
            sequence: 0,
        }
    }

    /// The greeting written to a stream right after it opens
    pub fn connected() -> Self {
        Self {
            kind: CONNECTED.to_string(),
            payload: None,
            message: Some("SSE connection established".to_string()),
            timestamp: Utc::now(),
            sequence: 0,
        }
    }

    /// A heartbeat: only `type` and `timestamp` on the wire
    pub fn heartbeat() -> Self {
        Self {
            kind: HEARTBEAT.to_string(),
            payload: None,
            message: None,
            timestamp: Utc::now(),
            sequence: 0,
        }
    }

    /// Whether this is a heartbeat frame
    pub fn is_heartbeat(&self) -> bool {
        self.kind == HEARTBEAT
    }

    /// Encode as a single SSE frame
    pub fn to_frame(&self) -> Result<Bytes, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        let mut frame = Vec::with_capacity(FRAME_PREFIX.len() + json.len() + FRAME_SUFFIX.len());
        frame.extend_from_slice(FRAME_PREFIX);
        frame.extend_from_slice(&json);
        frame.extend_from_slice(FRAME_SUFFIX);
        Ok(Bytes::from(frame))
    }

    /// Decode one frame produced by [`Event::to_frame`]
    ///
    /// Accepts the frame with or without its trailing blank line. Returns
    /// `None` for anything that is not a `data:` line holding an event.
    pub fn from_frame(frame: &str) -> Option<Self> {
        let line = frame.trim_end_matches('\n');
        let json = line.strip_prefix("data:")?.trim_start();
        serde_json::from_str(json).ok()
    }
}

/// Split a byte stream of SSE frames into decoded events
///
/// Incomplete trailing data is left in `buf` for the next call.
pub fn drain_frames(buf: &mut String) -> Vec<Event> {
    let mut events = Vec::new();

    while let Some(end) = buf.find("\n\n") {
        let frame: String = buf.drain(..end + 2).collect();
        if let Some(event) = Event::from_frame(&frame) {
            events.push(event);
        }
    }

    events
}

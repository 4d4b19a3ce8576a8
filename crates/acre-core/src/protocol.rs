//! Wire protocol for the realtime channel.
//!
//! Clients send `{"type": "...", "payload": ...}` frames; the server answers
//! with `{"type": "...", "value": ...}` envelopes. Drawing payloads are
//! opaque to the server and forwarded verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::UserId;

/// Broadcast kind whose value is always the full presence snapshot.
pub const USERS_STATUS: &str = "users_status";

/// One user's presence entry as shipped in `users_status` broadcasts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub id: UserId,
    pub display_name: String,
    pub is_active: bool,
}

/// Server-to-client message envelope. Serialized once per broadcast.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, value: Value) -> Self {
        Self {
            kind: kind.into(),
            value,
        }
    }
}

/// A parsed client-to-server frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// `draw:start` / `draw:move` / `draw:end` / `drawing:update` with an
    /// opaque payload to re-broadcast.
    Drawing { kind: String, payload: Value },
    /// `user:active` / `user:inactive`.
    PresenceFlip { active: bool },
    /// Recognized JSON, unrecognized type. Logged and ignored upstream.
    Unknown { kind: String },
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(String),
    #[error("frame has no \"type\" field")]
    MissingType,
}

fn is_drawing_kind(kind: &str) -> bool {
    matches!(
        kind,
        "draw:start" | "draw:move" | "draw:end" | "drawing:update"
    )
}

/// Parse one inbound text frame. Malformed frames are an error for the
/// caller to log; they never terminate the connection.
pub fn parse_frame(text: &str) -> Result<InboundFrame, FrameError> {
    let mut value: Value =
        serde_json::from_str(text).map_err(|e| FrameError::NotJson(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?
        .to_owned();

    let frame = match kind.as_str() {
        "user:active" => InboundFrame::PresenceFlip { active: true },
        "user:inactive" => InboundFrame::PresenceFlip { active: false },
        k if is_drawing_kind(k) => {
            let payload = value
                .get_mut("payload")
                .map(Value::take)
                .unwrap_or(Value::Null);
            InboundFrame::Drawing { kind, payload }
        }
        _ => InboundFrame::Unknown { kind },
    };

    Ok(frame)
}

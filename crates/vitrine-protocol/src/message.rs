//! Message types exchanged with screens and HTTP callers.

use serde::{Deserialize, Serialize};
use vitrine_core::DisplayState;

/// Reply envelope returned by every JSON HTTP endpoint.
///
/// Serializes as `{"type": "message", "content": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// Plain message carrying arbitrary content
    Message {
        /// Payload (string, object, list or null)
        content: serde_json::Value,
    },
}

impl Reply {
    /// Wraps any serializable content in a message reply.
    ///
    /// Content that cannot be represented as JSON becomes `null`.
    pub fn message<T: Serialize>(content: T) -> Self {
        Self::Message {
            content: serde_json::to_value(content).unwrap_or(serde_json::Value::Null),
        }
    }

    /// The standard acknowledgement for a successful state change.
    pub fn success() -> Self {
        Self::message("success")
    }

    /// Returns the wrapped content.
    pub fn content(&self) -> &serde_json::Value {
        match self {
            Self::Message { content } => content,
        }
    }
}

/// Current display state as pushed to screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayUpdate {
    /// Object being displayed
    pub object_name: String,

    /// Confidence for the object
    pub prob: f64,
}

impl From<&DisplayState> for DisplayUpdate {
    fn from(state: &DisplayState) -> Self {
        Self {
            object_name: state.object_name.as_str().to_string(),
            prob: state.probability.value(),
        }
    }
}

/// Type-tagged control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// Keepalive with no state attached
    Heartbeat,
}

/// Anything the server pushes down a websocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PushMessage {
    /// `{"object_name": ..., "prob": ...}`
    Update(DisplayUpdate),

    /// `{"type": "heartbeat"}`
    Signal(Signal),
}

impl PushMessage {
    /// Creates an update message from the given state.
    pub fn update(state: &DisplayState) -> Self {
        Self::Update(DisplayUpdate::from(state))
    }

    /// Creates a heartbeat message.
    pub fn heartbeat() -> Self {
        Self::Signal(Signal::Heartbeat)
    }

    /// Serializes to the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

//! Push-channel frame types and parser.
//!
//! The backend sends JSON text frames shaped `{"type": "<kind>", ...}`.
//! Only `task_update` frames are understood; their remaining keys are the
//! partial task record. The client sends `subscribe`/`unsubscribe` frames
//! carrying a single `task_id`.

use serde::Deserialize;
use serde_json::{Map, Value};
use tmon_core::push_events::{MSG_TYPE_SUBSCRIBE, MSG_TYPE_TASK_UPDATE, MSG_TYPE_UNSUBSCRIBE};
use tmon_core::types::TaskId;

/// A frame pushed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    TaskUpdate(TaskUpdate),
}

/// Partial task record for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub task_id: TaskId,
    /// Every other key of the frame, uninterpreted.
    pub fields: Map<String, Value>,
}

impl TaskUpdate {
    pub fn new(task_id: impl Into<TaskId>, fields: Map<String, Value>) -> Self {
        Self {
            task_id: task_id.into(),
            fields,
        }
    }
}

/// A frame sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Subscribe(TaskId),
    Unsubscribe(TaskId),
}

impl ClientMessage {
    pub fn task_id(&self) -> &str {
        match self {
            ClientMessage::Subscribe(id) | ClientMessage::Unsubscribe(id) => id,
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> String {
        let kind = match self {
            ClientMessage::Subscribe(_) => MSG_TYPE_SUBSCRIBE,
            ClientMessage::Unsubscribe(_) => MSG_TYPE_UNSUBSCRIBE,
        };
        serde_json::json!({ "type": kind, "task_id": self.task_id() }).to_string()
    }
}

/// Errors from [`parse_message`].
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown frame type: {0}")]
    UnknownType(String),

    #[error("Frame is missing a usable task_id")]
    MissingTaskId,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Parse a push-channel text frame.
///
/// Callers should log errors and keep reading.
pub fn parse_message(text: &str) -> Result<PushMessage, MessageError> {
    let RawFrame { kind, mut rest } = serde_json::from_str(text)?;

    if kind != MSG_TYPE_TASK_UPDATE {
        return Err(MessageError::UnknownType(kind));
    }

    // Older backends send integer ids.
    let task_id = match rest.remove("task_id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(MessageError::MissingTaskId),
    };

    Ok(PushMessage::TaskUpdate(TaskUpdate {
        task_id,
        fields: rest,
    }))
}

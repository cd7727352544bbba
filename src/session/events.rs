//! Typed events and tool-call payloads exchanged with a session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::AudioChunk;

/// One named invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique within the owning session only.
    pub call_id: String,
    pub name: String,
    pub args: Value,
}

/// The single result returned upstream for a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    /// Backend JSON on success, `{"error": "..."}` on failure.
    pub payload: Value,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(call: &ToolCallRequest, payload: Value) -> Self {
        Self {
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            payload,
            is_error: false,
        }
    }

    pub fn error(call: &ToolCallRequest, message: impl Into<String>) -> Self {
        Self {
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            payload: serde_json::json!({ "error": message.into() }),
            is_error: true,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        if !self.is_error {
            return None;
        }
        self.payload.get("error").and_then(Value::as_str)
    }
}

/// How a provider expects tool results to be framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultDelivery {
    /// All results of one inbound batch go back in one message.
    Batched,
    /// Each result is sent as soon as it resolves, followed by a continue trigger.
    PerCall,
}

/// Inbound session events, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Assistant text; `is_final` marks the end of a turn.
    Text { text: String, is_final: bool },
    /// Synthesized speech for the voice bus.
    Audio(AudioChunk),
    /// One or more invocations from a single server message.
    ToolCalls(Vec<ToolCallRequest>),
    /// The provider detected the user speaking over the assistant.
    Interrupted,
    /// Non-fatal provider error, or the transport failure that ended the session.
    Error { message: String },
    Closed,
}

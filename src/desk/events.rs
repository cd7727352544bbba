//! Events emitted to the surrounding application.

use serde::Serialize;

use crate::audio::SpeakerId;
use crate::dispatch::ToolInvocation;
use crate::error::{RecoverySuggestion, VoiceError};
use crate::room::RoomId;
use crate::session::SessionState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeskEvent {
    ConnectionStatus {
        room: RoomId,
        state: SessionState,
    },
    /// `None` when nobody is speaking.
    ActiveSpeaker {
        speaker: Option<SpeakerId>,
    },
    Transcript {
        room: RoomId,
        speaker: SpeakerId,
        text: String,
        is_final: bool,
    },
    ToolActivity {
        invocation: ToolInvocation,
    },
    Error {
        message: String,
        suggestion: RecoverySuggestion,
    },
}

impl DeskEvent {
    pub fn from_error(error: &VoiceError) -> Self {
        DeskEvent::Error {
            message: error.to_string(),
            suggestion: error.recovery_suggestion(),
        }
    }
}

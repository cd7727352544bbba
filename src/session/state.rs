//! Session lifecycle state machine.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Lifecycle of one duplex provider connection.
///
/// `Idle → Connecting → Active ⇄ ToolSuspended → Closing → Closed`, with
/// `Error` reachable from every non-idle state and `Closed` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    /// Active, with at least one tool call awaiting its result.
    ToolSuspended,
    Closing,
    Closed,
    Error,
}

impl SessionState {
    /// Whether text, audio, and tool results may be sent.
    pub fn accepts_input(self) -> bool {
        matches!(self, Self::Active | Self::ToolSuspended)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Connecting) => true,
            (Connecting, Active) => true,
            (Active, ToolSuspended) | (ToolSuspended, Active) => true,
            (Connecting | Active | ToolSuspended | Error, Closing) => true,
            (Connecting | Active | ToolSuspended | Closing, Error) => true,
            _ => false,
        }
    }
}

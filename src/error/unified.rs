//! Error classification and recovery hints.

use serde::{Deserialize, Serialize};

/// Broad error category, following the session layer's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connection refused, abrupt close, failed send.
    Transport,
    /// Backend failure or unknown tool; always contained by the dispatcher.
    ToolExecution,
    /// Microphone access denied.
    Permission,
    /// Missing URL, key, or schema encoding.
    Configuration,
    Authentication,
    Network,
    Timeout,
    Server,
    Api,
    Serialization,
    Audio,
    Unknown,
}

/// Suggested recovery action surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverySuggestion {
    GrantMicrophoneAccess,
    CheckAudioDevice,
    CheckCredentials,
    CheckConfiguration,
    RejoinRoom,
    RetryLater,
    CheckBackend,
    ContactSupport,
}

//! Error types for deskvoice.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for the voice session layer.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Microphone permission denied: {0}")]
    Permission(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl VoiceError {
    /// Create an API error from a status code and response body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Network(_) => ErrorCategory::Network,
            Self::Io(_) | Self::Transport(_) => ErrorCategory::Transport,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Permission(_) => ErrorCategory::Permission,
            Self::AudioDevice(_) => ErrorCategory::Audio,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::ToolExecution { .. } | Self::InvalidArgument(_) => ErrorCategory::ToolExecution,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether the user can fix this error themselves (grant access, fix config).
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Permission
                | ErrorCategory::Configuration
                | ErrorCategory::Authentication
                | ErrorCategory::Audio
        )
    }

    /// Suggest recovery actions for display next to the error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Permission => RecoverySuggestion::GrantMicrophoneAccess,
            ErrorCategory::Audio => RecoverySuggestion::CheckAudioDevice,
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Transport | ErrorCategory::Network | ErrorCategory::Timeout => {
                RecoverySuggestion::RejoinRoom
            }
            ErrorCategory::Server => RecoverySuggestion::RetryLater,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckBackend,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, VoiceError>;

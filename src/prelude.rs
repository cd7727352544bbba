//! Convenience re-exports for common use.

pub use crate::audio::{
    AudioCapture, AudioChunk, MicrophoneSource, PlaybackSink, SimulatedPlayback, SpeakerId,
    UnavailableMicrophone, VoiceBus,
};
pub use crate::config::VoiceConfig;
pub use crate::desk::{DeskEvent, DeskSetup, VoiceDesk};
pub use crate::dispatch::{ActivityLog, ToolDispatcher, ToolInvocation};
pub use crate::error::{Result, VoiceError};
pub use crate::provider::{ProviderKind, ProviderSessionFactory};
pub use crate::room::{RoomId, RoomRegistry, SquadRole};
pub use crate::session::{RealtimeSession, SessionEvent, SessionFactory, SessionState};
pub use crate::tools::{FnTool, Tool, ToolArguments, ToolParameters, ToolSpec};

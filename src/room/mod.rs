//! Room/context registry: per-room instructions, lead voice, and tool set.

pub mod catalog;
pub mod registry;

pub use catalog::{desk_tool_specs, ToolCatalog};
pub use registry::RoomRegistry;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::audio::SpeakerId;
use crate::provider::ProviderKind;

/// A scoped conversational context on the desk.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RoomId {
    Desk,
    Autopilot,
    Journal,
}

impl RoomId {
    pub const ALL: [RoomId; 3] = [RoomId::Desk, RoomId::Autopilot, RoomId::Journal];
}

/// Members of the AI squad. Each room is led by one role.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SquadRole {
    Strategist,
    Risk,
    Quant,
    Execution,
    Journal,
}

impl SquadRole {
    /// Provider voice preset for this role.
    pub fn voice(self, provider: ProviderKind) -> &'static str {
        match (provider, self) {
            (ProviderKind::Gemini, SquadRole::Strategist) => "Puck",
            (ProviderKind::Gemini, SquadRole::Risk) => "Charon",
            (ProviderKind::Gemini, SquadRole::Quant) => "Kore",
            (ProviderKind::Gemini, SquadRole::Execution) => "Fenrir",
            (ProviderKind::Gemini, SquadRole::Journal) => "Aoede",
            (ProviderKind::OpenAi, SquadRole::Strategist) => "ash",
            (ProviderKind::OpenAi, SquadRole::Risk) => "echo",
            (ProviderKind::OpenAi, SquadRole::Quant) => "sage",
            (ProviderKind::OpenAi, SquadRole::Execution) => "verse",
            (ProviderKind::OpenAi, SquadRole::Journal) => "shimmer",
        }
    }

    pub fn speaker_id(self) -> SpeakerId {
        SpeakerId::new(self.to_string())
    }
}

/// Static definition of a room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomProfile {
    pub room: RoomId,
    pub lead: SquadRole,
    pub instruction: String,
    /// Logical tool names, in declaration order.
    pub tools: Vec<String>,
}

/// Everything a provider session needs at setup time.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct SessionProfile {
    pub room: RoomId,
    pub provider: ProviderKind,
    /// Playback attribution for synthesized speech.
    pub speaker: SpeakerId,
    pub voice: String,
    pub system_instruction: String,
    /// Provider-encoded tool declarations.
    #[builder(default)]
    pub tools: Vec<Value>,
    #[builder(default)]
    pub tool_names: Vec<String>,
}

impl SessionProfile {
    pub fn has_tool(&self, name: &str) -> bool {
        self.tool_names.iter().any(|tool| tool == name)
    }
}

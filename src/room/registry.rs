//! Resolves a room to the instruction and tool declarations for a provider.

use std::collections::HashMap;

use tracing::debug;

use super::catalog::ToolCatalog;
use super::{RoomId, RoomProfile, SessionProfile, SquadRole};
use crate::error::{Result, VoiceError};
use crate::provider::ProviderKind;

const DESK_INSTRUCTION: &str = "You are the strategist on a discretionary trading desk. \
Keep answers short and spoken. Use the broker snapshot, playbooks, chart summaries, and \
risk review tools before commenting on a live position. Never place orders.";

const AUTOPILOT_INSTRUCTION: &str = "You supervise the desk autopilot. Generate proposals \
with the autopilot tool, always run them through the risk review, and state the stop and \
size out loud. The trader approves every trade.";

const JOURNAL_INSTRUCTION: &str = "You are the trading coach. Help the trader reflect on \
today's trades, ask one question at a time, and log each reviewed trade to the journal. \
Refer to playbooks when a mistake repeats.";

/// Room profiles validated against a tool catalog.
#[derive(Debug, Clone)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, RoomProfile>,
    catalog: ToolCatalog,
}

impl RoomRegistry {
    /// Build a registry, rejecting any room that names a tool without a
    /// spec or without an encoding for every provider.
    pub fn new(rooms: Vec<RoomProfile>, catalog: ToolCatalog) -> Result<Self> {
        for profile in &rooms {
            for name in &profile.tools {
                if catalog.spec(name).is_none() {
                    return Err(VoiceError::Configuration(format!(
                        "Room '{}' lists unknown tool '{name}'",
                        profile.room
                    )));
                }
                for provider in ProviderKind::ALL {
                    if catalog.encoding(provider, name).is_none() {
                        return Err(VoiceError::Configuration(format!(
                            "Tool '{name}' in room '{}' has no {provider} schema encoding",
                            profile.room
                        )));
                    }
                }
            }
        }

        Ok(Self {
            rooms: rooms
                .into_iter()
                .map(|profile| (profile.room, profile))
                .collect(),
            catalog,
        })
    }

    /// The built-in desk, autopilot, and journal rooms.
    pub fn desk_default() -> Result<Self> {
        Self::new(default_rooms(), ToolCatalog::desk())
    }

    pub fn profile(&self, room: RoomId) -> Option<&RoomProfile> {
        self.rooms.get(&room)
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Session setup for `room` on `provider`.
    pub fn resolve(&self, room: RoomId, provider: ProviderKind) -> Result<SessionProfile> {
        let profile = self
            .profile(room)
            .ok_or_else(|| VoiceError::Configuration(format!("Room '{room}' is not configured")))?;

        let tools = profile
            .tools
            .iter()
            .map(|name| {
                self.catalog.encoding(provider, name).cloned().ok_or_else(|| {
                    VoiceError::Configuration(format!(
                        "Tool '{name}' has no {provider} schema encoding"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(%room, %provider, tools = tools.len(), "resolved room profile");
        Ok(SessionProfile::builder()
            .room(room)
            .provider(provider)
            .speaker(profile.lead.speaker_id())
            .voice(profile.lead.voice(provider).to_string())
            .system_instruction(profile.instruction.clone())
            .tools(tools)
            .tool_names(profile.tools.clone())
            .build())
    }
}

pub fn default_rooms() -> Vec<RoomProfile> {
    let room = |room, lead, instruction: &str, tools: &[&str]| RoomProfile {
        room,
        lead,
        instruction: instruction.to_string(),
        tools: tools.iter().map(|tool| tool.to_string()).collect(),
    };
    vec![
        room(
            RoomId::Desk,
            SquadRole::Strategist,
            DESK_INSTRUCTION,
            &[
                "get_broker_snapshot",
                "lookup_playbook",
                "review_risk",
                "get_vision_summary",
            ],
        ),
        room(
            RoomId::Autopilot,
            SquadRole::Execution,
            AUTOPILOT_INSTRUCTION,
            &["get_autopilot_proposal", "review_risk", "get_broker_snapshot"],
        ),
        room(
            RoomId::Journal,
            SquadRole::Journal,
            JOURNAL_INSTRUCTION,
            &["log_trade_journal", "list_journal_entries", "lookup_playbook"],
        ),
    ]
}

//! OpenAI Realtime client.
//!
//! Readiness is implicit: once the socket is open and `session.update` has
//! been written, the session is treated as active without waiting for an
//! acknowledgement. Each tool result is sent as its own
//! `function_call_output` item followed by `response.create`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::ProviderKind;
use crate::audio::pcm::{decode_base64, encode_base64};
use crate::audio::{AudioChunk, SpeakerId};
use crate::config::{ProviderSettings, VoiceConfig};
use crate::error::{Result, VoiceError};
use crate::room::SessionProfile;
use crate::session::lifecycle::SessionCore;
use crate::session::transport::{self, FrameDecoder, Inbound};
use crate::session::{
    RealtimeSession, ResultDelivery, SessionEvent, SessionState, ToolCallRequest, ToolResult,
};
use crate::util::timeout::with_timeout;

pub struct OpenAiRealtimeSession {
    core: SessionCore,
    settings: ProviderSettings,
    profile: SessionProfile,
    handshake_timeout: Duration,
    heartbeat_interval: Duration,
}

impl OpenAiRealtimeSession {
    pub fn new(config: &VoiceConfig, profile: SessionProfile) -> Self {
        Self {
            core: SessionCore::new(ProviderKind::OpenAi),
            settings: config.openai.clone(),
            profile,
            handshake_timeout: config.handshake_timeout,
            heartbeat_interval: config.heartbeat_interval,
        }
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    fn connection_url(&self) -> Result<String> {
        let base = self.settings.require_base_url(ProviderKind::OpenAi)?;
        let separator = if base.contains('?') { '&' } else { '?' };
        Ok(format!("{base}{separator}model={}", self.settings.model))
    }

    fn headers(&self) -> Result<Vec<(&'static str, String)>> {
        let key = self.settings.require_api_key(ProviderKind::OpenAi)?;
        Ok(vec![
            ("Authorization", format!("Bearer {key}")),
            ("OpenAI-Beta", "realtime=v1".to_string()),
        ])
    }

    /// The one-time `session.update` frame.
    pub fn session_update(&self) -> Value {
        json!({
            "type": "session.update",
            "session": {
                "modalities": ["audio", "text"],
                "voice": self.profile.voice,
                "instructions": self.profile.system_instruction,
                "input_audio_format": "pcm16",
                "output_audio_format": "pcm16",
                "tools": self.profile.tools,
                "tool_choice": "auto",
            }
        })
    }

    fn decoder(&self) -> OpenAiDecoder {
        OpenAiDecoder {
            speaker: self.profile.speaker.clone(),
            output_sample_rate: self.settings.output_sample_rate,
        }
    }
}

#[async_trait]
impl RealtimeSession for OpenAiRealtimeSession {
    fn session_id(&self) -> &str {
        self.core.session_id()
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn state(&self) -> SessionState {
        self.core.state()
    }

    fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.core.subscribe_state()
    }

    fn input_sample_rate(&self) -> u32 {
        self.settings.input_sample_rate
    }

    fn result_delivery(&self) -> ResultDelivery {
        ResultDelivery::PerCall
    }

    async fn connect(&self) -> Result<()> {
        let url = self.connection_url()?;
        let headers = self.headers()?;
        self.core.begin_connect()?;
        info!(
            session_id = %self.session_id(),
            room = %self.profile.room,
            model = %self.settings.model,
            "connecting to OpenAI Realtime"
        );

        let handshake = async {
            let mut socket = transport::connect(&url, &headers).await?;
            transport::send_json(&mut socket, &self.session_update()).await?;
            self.core
                .start_pump(socket, self.decoder(), self.heartbeat_interval);
            Ok::<(), VoiceError>(())
        };

        let result = match with_timeout(self.handshake_timeout, handshake).await {
            // No acknowledgement is awaited for this provider.
            Ok(()) => self.core.mark_active(),
            Err(error) => Err(error),
        };

        if let Err(error) = &result {
            warn!(session_id = %self.session_id(), %error, "OpenAI connect failed");
            self.core.fail(error);
        }
        result
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.core.take_events()
    }

    fn send_user_text(&self, text: &str, end_of_turn: bool) -> Result<()> {
        let state = self.core.state();
        if !state.accepts_input() {
            return Err(VoiceError::InvalidState(format!(
                "Cannot send on a session that is {state}"
            )));
        }
        self.core.link.send_json(&json!({
            "type": "conversation.item.create",
            "item": {
                "type": "message",
                "role": "user",
                "content": [{ "type": "input_text", "text": text }],
            }
        }))?;
        if end_of_turn {
            self.core.link.send_json(&json!({ "type": "response.create" }))?;
        }
        Ok(())
    }

    fn send_realtime_audio(&self, pcm16: &[i16]) {
        if !self.core.state().accepts_input() || pcm16.is_empty() {
            return;
        }
        let frame = json!({
            "type": "input_audio_buffer.append",
            "audio": encode_base64(pcm16),
        });
        if let Err(error) = self.core.link.send_json(&frame) {
            debug!(session_id = %self.session_id(), %error, "dropping capture frame");
        }
    }

    fn send_tool_results(&self, results: Vec<ToolResult>) -> Result<()> {
        for result in self.core.link.claim_results(results) {
            debug!(
                session_id = %self.session_id(),
                call_id = %result.call_id,
                "sending function output"
            );
            self.core.link.send_json(&function_output(&result))?;
            self.core.link.send_json(&json!({ "type": "response.create" }))?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.core.close().await
    }
}

fn function_output(result: &ToolResult) -> Value {
    json!({
        "type": "conversation.item.create",
        "item": {
            "type": "function_call_output",
            "call_id": result.call_id,
            "output": result.payload.to_string(),
        }
    })
}

/// Decodes OpenAI Realtime server events. Stateless across frames.
pub(crate) struct OpenAiDecoder {
    speaker: SpeakerId,
    output_sample_rate: u32,
}

impl OpenAiDecoder {
    fn audio_event(&self, data: &str) -> Option<Inbound> {
        match decode_base64(data) {
            Ok(samples) => Some(Inbound::Event(SessionEvent::Audio(AudioChunk::playback(
                self.speaker.clone(),
                samples,
                self.output_sample_rate,
            )))),
            Err(error) => {
                warn!(%error, "dropping undecodable audio delta");
                None
            }
        }
    }
}

impl FrameDecoder for OpenAiDecoder {
    fn decode(&self, payload: &Value) -> Vec<Inbound> {
        let Some(kind) = payload.get("type").and_then(Value::as_str) else {
            return Vec::new();
        };

        let inbound = match kind {
            "response.delta" => payload
                .pointer("/delta/text")
                .and_then(Value::as_str)
                .map(|text| text_event(text, false)),
            "response.text.delta" | "response.audio_transcript.delta" => payload
                .get("delta")
                .and_then(Value::as_str)
                .map(|text| text_event(text, false)),
            "response.completed" | "response.done" => {
                let text = payload
                    .pointer("/response/output_text")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Some(text_event(text, true))
            }
            "response.audio.delta" => {
                let delta = payload.get("delta");
                delta
                    .and_then(|delta| delta.get("audio"))
                    .or(delta)
                    .and_then(Value::as_str)
                    .and_then(|data| self.audio_event(data))
            }
            "response.output_item.done" => payload
                .get("item")
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("function_call"))
                .and_then(function_call)
                .map(|call| Inbound::Event(SessionEvent::ToolCalls(vec![call]))),
            "input_audio_buffer.speech_started" => Some(Inbound::Event(SessionEvent::Interrupted)),
            "error" => {
                let message = payload
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("OpenAI realtime error")
                    .to_string();
                Some(Inbound::Event(SessionEvent::Error { message }))
            }
            other => {
                debug!(event = other, "ignoring realtime event");
                None
            }
        };
        inbound.into_iter().collect()
    }
}

fn function_call(item: &Value) -> Option<ToolCallRequest> {
    let (Some(call_id), Some(name)) = (
        item.get("call_id").and_then(Value::as_str),
        item.get("name").and_then(Value::as_str),
    ) else {
        warn!(%item, "dropping function call without call_id or name");
        return None;
    };
    // Arguments arrive as a JSON string; keep the raw text if it does not parse
    // so argument decoding can report it.
    let args = match item.get("arguments") {
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(other) => other.clone(),
        None => json!({}),
    };
    Some(ToolCallRequest {
        call_id: call_id.to_string(),
        name: name.to_string(),
        args,
    })
}

fn text_event(text: &str, is_final: bool) -> Inbound {
    Inbound::Event(SessionEvent::Text {
        text: text.to_string(),
        is_final,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::{RoomId, RoomRegistry};
    use pretty_assertions::assert_eq;

    fn events(payload: Value) -> Vec<Inbound> {
        OpenAiDecoder {
            speaker: SpeakerId::new("execution"),
            output_sample_rate: 24_000,
        }
        .decode(&payload)
    }

    #[test]
    fn decodes_text_deltas_and_completion() {
        assert_eq!(
            events(json!({ "type": "response.delta", "delta": { "text": "Size is" } })),
            vec![text_event("Size is", false)]
        );
        assert_eq!(
            events(json!({ "type": "response.completed", "response": { "output_text": "Size is fine." } })),
            vec![text_event("Size is fine.", true)]
        );
    }

    #[test]
    fn decodes_audio_delta_in_both_shapes() {
        let data = encode_base64(&[5, -5]);
        for payload in [
            json!({ "type": "response.audio.delta", "delta": { "audio": data } }),
            json!({ "type": "response.audio.delta", "delta": data }),
        ] {
            let decoded = events(payload);
            let [Inbound::Event(SessionEvent::Audio(chunk))] = decoded.as_slice() else {
                panic!("expected one audio chunk, got {decoded:?}");
            };
            assert_eq!(&*chunk.samples, &[5, -5]);
            assert_eq!(chunk.speaker.as_str(), "execution");
        }
    }

    #[test]
    fn decodes_function_call_with_string_arguments() {
        let decoded = events(json!({
            "type": "response.output_item.done",
            "item": {
                "type": "function_call",
                "name": "review_risk",
                "call_id": "call_7",
                "arguments": "{\"symbol\":\"NQ\",\"side\":\"short\",\"quantity\":1}"
            }
        }));
        let [Inbound::Event(SessionEvent::ToolCalls(calls))] = decoded.as_slice() else {
            panic!("expected a tool call, got {decoded:?}");
        };
        assert_eq!(calls[0].call_id, "call_7");
        assert_eq!(calls[0].args["symbol"], "NQ");
    }

    #[test]
    fn message_items_are_not_tool_calls() {
        let decoded = events(json!({
            "type": "response.output_item.done",
            "item": { "type": "message", "content": [] }
        }));
        assert!(decoded.is_empty());
    }

    #[test]
    fn speech_started_and_error_events() {
        assert_eq!(
            events(json!({ "type": "input_audio_buffer.speech_started" })),
            vec![Inbound::Event(SessionEvent::Interrupted)]
        );
        assert_eq!(
            events(json!({ "type": "error", "error": { "message": "bad item" } })),
            vec![Inbound::Event(SessionEvent::Error { message: "bad item".into() })]
        );
    }

    #[test]
    fn function_output_serializes_payload_as_string() {
        let frame = function_output(&ToolResult {
            call_id: "call_1".into(),
            name: "lookup_playbook".into(),
            payload: json!({ "setups": [] }),
            is_error: false,
        });
        assert_eq!(frame["item"]["type"], "function_call_output");
        assert_eq!(frame["item"]["output"], "{\"setups\":[]}");
    }

    #[test]
    fn session_update_lists_room_tools() {
        let profile = RoomRegistry::desk_default()
            .unwrap()
            .resolve(RoomId::Autopilot, ProviderKind::OpenAi)
            .unwrap();
        let session = OpenAiRealtimeSession::new(&VoiceConfig::default(), profile);

        let update = session.session_update();
        assert_eq!(update["type"], "session.update");
        assert_eq!(update["session"]["voice"], "verse");
        assert_eq!(update["session"]["tools"][0]["type"], "function");
        assert_eq!(update["session"]["tool_choice"], "auto");
    }
}

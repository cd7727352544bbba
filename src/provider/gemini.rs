//! Gemini Live client.
//!
//! Readiness is explicit: the session stays `connecting` until the server
//! answers the setup message with `setupComplete`. Tool results for one
//! `toolCall` batch go back in a single `toolResponse`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::ProviderKind;
use crate::audio::pcm::{decode_base64, encode_base64, is_pcm_mime, parse_pcm_rate, pcm_mime};
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

pub struct GeminiLiveSession {
    core: SessionCore,
    settings: ProviderSettings,
    profile: SessionProfile,
    handshake_timeout: Duration,
    heartbeat_interval: Duration,
}

impl GeminiLiveSession {
    pub fn new(config: &VoiceConfig, profile: SessionProfile) -> Self {
        Self {
            core: SessionCore::new(ProviderKind::Gemini),
            settings: config.gemini.clone(),
            profile,
            handshake_timeout: config.handshake_timeout,
            heartbeat_interval: config.heartbeat_interval,
        }
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    fn connection_url(&self) -> Result<String> {
        let base = self.settings.require_base_url(ProviderKind::Gemini)?;
        let key = self.settings.require_api_key(ProviderKind::Gemini)?;
        let separator = if base.contains('?') { '&' } else { '?' };
        Ok(format!("{base}{separator}key={key}"))
    }

    /// The one-time setup frame.
    pub fn setup_message(&self) -> Value {
        let mut setup = json!({
            "model": self.settings.model,
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.profile.voice }
                    }
                }
            },
            "systemInstruction": {
                "parts": [{ "text": self.profile.system_instruction }]
            },
            "outputAudioTranscription": {},
        });
        if !self.profile.tools.is_empty() {
            setup["tools"] = json!([{ "functionDeclarations": self.profile.tools }]);
        }
        json!({ "setup": setup })
    }

    fn decoder(&self) -> GeminiDecoder {
        GeminiDecoder {
            speaker: self.profile.speaker.clone(),
            output_sample_rate: self.settings.output_sample_rate,
        }
    }

    fn require_active(&self) -> Result<()> {
        let state = self.core.state();
        if state.accepts_input() {
            Ok(())
        } else {
            Err(VoiceError::InvalidState(format!(
                "Cannot send on a session that is {state}"
            )))
        }
    }
}

#[async_trait]
impl RealtimeSession for GeminiLiveSession {
    fn session_id(&self) -> &str {
        self.core.session_id()
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Gemini
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
        ResultDelivery::Batched
    }

    async fn connect(&self) -> Result<()> {
        let url = self.connection_url()?;
        self.core.begin_connect()?;
        info!(
            session_id = %self.session_id(),
            room = %self.profile.room,
            model = %self.settings.model,
            "connecting to Gemini Live"
        );

        let handshake = async {
            let mut socket = transport::connect(&url, &[]).await?;
            transport::send_json(&mut socket, &self.setup_message()).await?;
            self.core
                .start_pump(socket, self.decoder(), self.heartbeat_interval);
            Ok::<(), VoiceError>(())
        };
        let result = match with_timeout(self.handshake_timeout, handshake).await {
            Ok(()) => self.core.wait_until_active(self.handshake_timeout).await,
            Err(error) => Err(error),
        };

        if let Err(error) = &result {
            warn!(session_id = %self.session_id(), %error, "Gemini handshake failed");
            self.core.fail(error);
        }
        result
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.core.take_events()
    }

    fn send_user_text(&self, text: &str, end_of_turn: bool) -> Result<()> {
        self.require_active()?;
        self.core.link.send_json(&json!({
            "clientContent": {
                "turns": [{ "role": "user", "parts": [{ "text": text }] }],
                "turnComplete": end_of_turn,
            }
        }))
    }

    fn send_realtime_audio(&self, pcm16: &[i16]) {
        if !self.core.state().accepts_input() || pcm16.is_empty() {
            return;
        }
        let frame = json!({
            "realtimeInput": {
                "mediaChunks": [{
                    "mimeType": pcm_mime(self.settings.input_sample_rate),
                    "data": encode_base64(pcm16),
                }]
            }
        });
        if let Err(error) = self.core.link.send_json(&frame) {
            debug!(session_id = %self.session_id(), %error, "dropping capture frame");
        }
    }

    fn send_tool_results(&self, results: Vec<ToolResult>) -> Result<()> {
        let results = self.core.link.claim_results(results);
        if results.is_empty() {
            return Ok(());
        }
        debug!(session_id = %self.session_id(), count = results.len(), "sending tool responses");
        self.core.link.send_json(&tool_response(&results))
    }

    async fn close(&self) -> Result<()> {
        self.core.close().await
    }
}

fn tool_response(results: &[ToolResult]) -> Value {
    let responses: Vec<Value> = results
        .iter()
        .map(|result| {
            let response = match &result.payload {
                Value::Object(_) => result.payload.clone(),
                other => json!({ "result": other }),
            };
            json!({ "id": result.call_id, "name": result.name, "response": response })
        })
        .collect();
    json!({ "toolResponse": { "functionResponses": responses } })
}

/// Decodes Gemini Live server frames. Stateless across frames.
pub(crate) struct GeminiDecoder {
    speaker: SpeakerId,
    output_sample_rate: u32,
}

impl GeminiDecoder {
    fn decode_server_content(&self, content: &Value, out: &mut Vec<Inbound>) {
        if content.get("interrupted").and_then(Value::as_bool) == Some(true) {
            out.push(Inbound::Event(SessionEvent::Interrupted));
        }

        let parts = content
            .pointer("/modelTurn/parts")
            .and_then(Value::as_array)
            .into_iter()
            .flatten();
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                out.push(text_event(text, false));
            }
            if let Some(inline) = part.get("inlineData") {
                if let Some(chunk) = self.decode_inline_audio(inline) {
                    out.push(Inbound::Event(SessionEvent::Audio(chunk)));
                }
            }
        }

        if let Some(text) = content
            .pointer("/outputTranscription/text")
            .and_then(Value::as_str)
        {
            out.push(text_event(text, false));
        }

        // End of the model turn; carries no text of its own.
        if content.get("turnComplete").and_then(Value::as_bool) == Some(true) {
            out.push(text_event("", true));
        }
    }

    fn decode_inline_audio(&self, inline: &Value) -> Option<AudioChunk> {
        let mime = inline.get("mimeType").and_then(Value::as_str).unwrap_or_default();
        if !is_pcm_mime(mime) {
            debug!(%mime, "ignoring non-PCM inline data");
            return None;
        }
        let data = inline.get("data").and_then(Value::as_str)?;
        match decode_base64(data) {
            Ok(samples) => Some(AudioChunk::playback(
                self.speaker.clone(),
                samples,
                parse_pcm_rate(mime).unwrap_or(self.output_sample_rate),
            )),
            Err(error) => {
                warn!(%error, "dropping undecodable audio part");
                None
            }
        }
    }
}

impl FrameDecoder for GeminiDecoder {
    fn decode(&self, payload: &Value) -> Vec<Inbound> {
        let mut out = Vec::new();

        if payload.get("setupComplete").is_some() {
            out.push(Inbound::SetupComplete);
        }
        if let Some(content) = payload.get("serverContent") {
            self.decode_server_content(content, &mut out);
        }
        if let Some(calls) = payload
            .pointer("/toolCall/functionCalls")
            .and_then(Value::as_array)
        {
            let calls: Vec<ToolCallRequest> = calls.iter().filter_map(function_call).collect();
            if !calls.is_empty() {
                out.push(Inbound::Event(SessionEvent::ToolCalls(calls)));
            }
        }
        if payload.get("goAway").is_some() {
            out.push(Inbound::Event(SessionEvent::Error {
                message: "Gemini server is ending the session".into(),
            }));
        }
        out
    }
}

fn function_call(call: &Value) -> Option<ToolCallRequest> {
    let (Some(id), Some(name)) = (
        call.get("id").and_then(Value::as_str),
        call.get("name").and_then(Value::as_str),
    ) else {
        warn!(%call, "dropping function call without id or name");
        return None;
    };
    Some(ToolCallRequest {
        call_id: id.to_string(),
        name: name.to_string(),
        args: call.get("args").cloned().unwrap_or_else(|| json!({})),
    })
}

fn text_event(text: &str, is_final: bool) -> Inbound {
    Inbound::Event(SessionEvent::Text {
        text: text.to_string(),
        is_final,
    })
}

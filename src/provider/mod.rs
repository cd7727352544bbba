//! Realtime voice provider clients.
//!
//! Each provider implements [`RealtimeSession`] with its own wire framing.
//! The two protocols are deliberately not unified: Gemini acknowledges setup
//! and accepts batched tool responses, OpenAI is ready as soon as the session
//! update is sent and wants one output plus a continue trigger per call.

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::config::VoiceConfig;
use crate::error::{Result, VoiceError};
use crate::room::SessionProfile;
use crate::session::{RealtimeSession, SessionFactory};

/// The upstream realtime backends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Gemini, ProviderKind::OpenAi];
}

/// Builds provider sessions from a [`VoiceConfig`].
#[derive(Debug, Clone)]
pub struct ProviderSessionFactory {
    config: Arc<VoiceConfig>,
}

impl ProviderSessionFactory {
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }
}

impl SessionFactory for ProviderSessionFactory {
    fn create(&self, profile: SessionProfile) -> Result<Arc<dyn RealtimeSession>> {
        match profile.provider {
            #[cfg(feature = "gemini")]
            ProviderKind::Gemini => Ok(Arc::new(gemini::GeminiLiveSession::new(
                &self.config,
                profile,
            ))),
            #[cfg(feature = "openai")]
            ProviderKind::OpenAi => Ok(Arc::new(openai::OpenAiRealtimeSession::new(
                &self.config,
                profile,
            ))),
            #[allow(unreachable_patterns)]
            other => Err(VoiceError::Configuration(format!(
                "Provider '{other}' is not enabled in this build"
            ))),
        }
    }
}

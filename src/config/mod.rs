//! Configuration system (layered: code > env > config file > defaults).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, VoiceError};
use crate::provider::ProviderKind;

pub const DEFAULT_GEMINI_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_OPENAI_URL: &str = "wss://api.openai.com/v1/realtime";

/// Connection settings for one realtime provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Capture rate the provider expects for inbound PCM16.
    pub input_sample_rate: u32,
    /// Rate assumed for synthesized audio when a frame does not declare one.
    pub output_sample_rate: u32,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("input_sample_rate", &self.input_sample_rate)
            .field("output_sample_rate", &self.output_sample_rate)
            .finish()
    }
}

impl ProviderSettings {
    pub fn gemini_defaults() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GEMINI_URL.to_string(),
            model: "models/gemini-2.0-flash-exp".to_string(),
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
        }
    }

    pub fn openai_defaults() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_URL.to_string(),
            model: "gpt-4o-realtime-preview".to_string(),
            input_sample_rate: 24_000,
            output_sample_rate: 24_000,
        }
    }

    /// The API key, or a configuration error naming the provider.
    pub fn require_api_key(&self, provider: ProviderKind) -> Result<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                VoiceError::Configuration(format!("Missing API key for provider '{provider}'"))
            })
    }

    /// The connection URL, or a configuration error when it is blank.
    pub fn require_base_url(&self, provider: ProviderKind) -> Result<&str> {
        let trimmed = self.base_url.trim();
        if trimmed.is_empty() {
            return Err(VoiceError::Configuration(format!(
                "Missing connection URL for provider '{provider}'"
            )));
        }
        Ok(trimmed)
    }
}

/// Top-level configuration for the voice desk.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub gemini: ProviderSettings,
    pub openai: ProviderSettings,
    /// Base URL of the desk backend answering tool calls.
    pub backend_url: Option<String>,
    /// Upper bound on waiting for the provider to acknowledge setup.
    pub handshake_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Number of tool invocations retained for display.
    pub activity_log_capacity: usize,
    /// Samples per capture frame.
    pub capture_buffer_size: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            gemini: ProviderSettings::gemini_defaults(),
            openai: ProviderSettings::openai_defaults(),
            backend_url: None,
            handshake_timeout: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(20),
            activity_log_capacity: 50,
            capture_buffer_size: 4096,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    backend_url: Option<String>,
    handshake_timeout_ms: Option<u64>,
    heartbeat_interval_ms: Option<u64>,
    activity_log_capacity: Option<usize>,
    capture_buffer_size: Option<usize>,
    gemini: ProviderFile,
    openai: ProviderFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ProviderFile {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    input_sample_rate: Option<u32>,
    output_sample_rate: Option<u32>,
}

impl ProviderFile {
    fn apply(self, settings: &mut ProviderSettings) {
        if let Some(key) = self.api_key {
            settings.api_key = Some(key);
        }
        if let Some(url) = self.base_url {
            settings.base_url = url;
        }
        if let Some(model) = self.model {
            settings.model = model;
        }
        if let Some(rate) = self.input_sample_rate {
            settings.input_sample_rate = rate;
        }
        if let Some(rate) = self.output_sample_rate {
            settings.output_sample_rate = rate;
        }
    }
}

impl VoiceConfig {
    /// Defaults overlaid with environment variables (and `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.apply_env_with(|name| std::env::var(name).ok());
        config
    }

    /// Defaults, then the per-user config file if one exists, then environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        if let Some(path) = default_config_path().filter(|path| path.exists()) {
            config.merge_file(&path)?;
        }
        config.apply_env_with(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Defaults overlaid with a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        config.merge_file(path.as_ref())?;
        Ok(config)
    }

    /// Defaults overlaid with TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config = Self::default();
        config.merge_toml_str(text)?;
        Ok(config)
    }

    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        self.merge_toml_str(&text).map_err(|error| {
            VoiceError::Configuration(format!("{}: {error}", path.display()))
        })
    }

    pub fn merge_toml_str(&mut self, text: &str) -> Result<()> {
        let file: ConfigFile = toml::from_str(text)
            .map_err(|error| VoiceError::Configuration(format!("Invalid config file: {error}")))?;

        if let Some(url) = file.backend_url {
            self.backend_url = Some(url);
        }
        if let Some(ms) = file.handshake_timeout_ms {
            self.handshake_timeout = positive_millis("handshake_timeout_ms", ms)?;
        }
        if let Some(ms) = file.heartbeat_interval_ms {
            self.heartbeat_interval = positive_millis("heartbeat_interval_ms", ms)?;
        }
        if let Some(capacity) = file.activity_log_capacity {
            self.activity_log_capacity = capacity;
        }
        if let Some(size) = file.capture_buffer_size {
            self.capture_buffer_size = size;
        }
        file.gemini.apply(&mut self.gemini);
        file.openai.apply(&mut self.openai);
        Ok(())
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let key_mappings = [
            ("GOOGLE_API_KEY", ProviderKind::Gemini),
            ("GEMINI_API_KEY", ProviderKind::Gemini),
            ("OPENAI_API_KEY", ProviderKind::OpenAi),
        ];
        for (env_var, provider) in key_mappings {
            if let Some(key) = lookup(env_var) {
                self.provider_mut(provider).api_key = Some(key);
            }
        }

        let url_mappings = [
            ("DESKVOICE_GEMINI_URL", ProviderKind::Gemini),
            ("DESKVOICE_OPENAI_URL", ProviderKind::OpenAi),
        ];
        for (env_var, provider) in url_mappings {
            if let Some(url) = lookup(env_var) {
                self.provider_mut(provider).base_url = url;
            }
        }

        let model_mappings = [
            ("DESKVOICE_GEMINI_MODEL", ProviderKind::Gemini),
            ("DESKVOICE_OPENAI_MODEL", ProviderKind::OpenAi),
        ];
        for (env_var, provider) in model_mappings {
            if let Some(model) = lookup(env_var) {
                self.provider_mut(provider).model = model;
            }
        }

        if let Some(url) = lookup("DESKVOICE_BACKEND_URL") {
            self.backend_url = Some(url);
        }
        if let Some(ms) = lookup("DESKVOICE_HANDSHAKE_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
        {
            self.handshake_timeout = Duration::from_millis(ms);
        }
    }

    pub fn provider(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::OpenAi => &self.openai,
        }
    }

    pub fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::Gemini => &mut self.gemini,
            ProviderKind::OpenAi => &mut self.openai,
        }
    }

    /// The backend URL, or a configuration error when tools cannot be served.
    pub fn require_backend_url(&self) -> Result<&str> {
        self.backend_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                VoiceError::Configuration(
                    "Missing backend URL (set DESKVOICE_BACKEND_URL)".into(),
                )
            })
    }
}

/// Per-user config file location (`deskvoice.toml` in the platform config dir).
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "deskvoice", "deskvoice")
        .map(|dirs| dirs.config_dir().join("deskvoice.toml"))
}

fn positive_millis(field: &str, ms: u64) -> Result<Duration> {
    if ms == 0 {
        return Err(VoiceError::Configuration(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(Duration::from_millis(ms))
}

//! HTTP client for the desk backend that answers tool calls.

pub mod tools;

pub use tools::{desk_tools, BackendTool, Method, Route, DESK_ROUTES};

use serde_json::{json, Value};
use tracing::debug;

use crate::config::VoiceConfig;
use crate::error::{Result, VoiceError};

/// JSON client for the desk backend.
///
/// No request timeout is set; calls are bounded by the backend's own limits.
#[derive(Debug, Clone)]
pub struct DeskBackend {
    client: reqwest::Client,
    base_url: String,
}

impl DeskBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("deskvoice/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(4)
            .build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(VoiceError::Configuration(
                "Missing desk backend URL".to_string(),
            ));
        }
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &VoiceConfig) -> Result<Self> {
        Self::new(config.require_backend_url()?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        debug!(%path, "backend GET");
        let response = self.client.get(self.url(path)).query(query).send().await?;
        read_json(response).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        debug!(%path, "backend POST");
        let response = self.client.post(self.url(path)).json(body).send().await?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(status_to_error(status.as_u16(), &body));
    }
    if body.trim().is_empty() {
        return Ok(json!({ "ok": true }));
    }
    Ok(serde_json::from_str(&body)?)
}

fn status_to_error(status: u16, body: &str) -> VoiceError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.as_str().or_else(|| error.get("message")?.as_str()))
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    match status {
        401 | 403 => VoiceError::Authentication(message),
        _ => VoiceError::api(status, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_base_url_is_a_configuration_error() {
        assert!(matches!(
            DeskBackend::new("  "),
            Err(VoiceError::Configuration(_))
        ));
    }

    #[test]
    fn joins_paths_without_double_slashes() {
        let backend = DeskBackend::new("http://desk.local/").unwrap();
        assert_eq!(backend.url("/api/journal"), "http://desk.local/api/journal");
    }

    #[test]
    fn status_errors_prefer_backend_message() {
        let error = status_to_error(500, r#"{"error":"ledger offline"}"#);
        assert_eq!(error.to_string(), "API error (status 500): ledger offline");

        let error = status_to_error(422, r#"{"error":{"message":"bad symbol"}}"#);
        assert!(error.to_string().contains("bad symbol"));

        assert!(matches!(status_to_error(401, "nope"), VoiceError::Authentication(_)));
    }
}

//! Model endpoint configuration.

use serde::Deserialize;

/// Configuration of the OpenAI-compatible endpoint used for both routing
/// verdicts and fallback completions.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Base URL up to and including the API version, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub model_name: String,
    /// Bearer token. Empty means no `Authorization` header is sent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Send `response_format: json_object` on routing requests.
    #[serde(default = "default_true")]
    pub json_verdicts: bool,
}

fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl ModelConfig {
    /// The API key, if one is configured and non-empty.
    pub fn bearer_token(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

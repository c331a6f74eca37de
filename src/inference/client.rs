//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests to the configured model
//! endpoint and returns the assistant's text.

use std::time::Duration;

use reqwest::Client as HttpClient;

use super::config::ModelConfig;
use super::errors::InferenceError;
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ResponseFormat};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the model endpoint.
///
/// Cheap to share behind an `Arc`: every method takes `&self`, so concurrent
/// runs can issue requests at the same time.
pub struct InferenceClient {
    http: HttpClient,
    model: ModelConfig,
}

impl InferenceClient {
    /// Create a client for `model`.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn new(model: ModelConfig) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(model.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: model.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, model })
    }

    /// The name of the configured model.
    pub fn model_name(&self) -> &str {
        &self.model.model_name
    }

    /// Whether routing requests should ask for a JSON object response.
    pub fn json_verdicts(&self) -> bool {
        self.model.json_verdicts
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.model.base_url.trim_end_matches('/'))
    }

    // ─── Chat Completion ─────────────────────────────────────────────────

    /// Send a chat completion request and return the assistant's text.
    ///
    /// With `json_mode`, the backend is asked to constrain output to a JSON
    /// object. An empty or missing `content` is an error.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        json_mode: bool,
    ) -> Result<String, InferenceError> {
        let url = self.endpoint("chat/completions");

        let body = ChatCompletionRequest {
            model: self.model.model_name.clone(),
            messages,
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
            stream: false,
            response_format: json_mode.then(ResponseFormat::json_object),
        };

        // Log the request metadata (not the full body, it can be large)
        tracing::debug!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            json_mode,
            max_tokens = body.max_tokens,
            "sending chat completion request"
        );

        let mut request = self.http.post(&url).json(&body);
        if let Some(token) = self.model.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| InferenceError::from_send(e, &url, self.model.request_timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::MalformedResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion_body(&body_text)
    }

    // ─── Health Check ────────────────────────────────────────────────────

    /// Check if the model endpoint is reachable.
    ///
    /// Hits `/models`, which does not consume inference tokens.
    pub async fn health_check(&self) -> bool {
        let url = self.endpoint("models");
        let mut request = self.http.get(&url).timeout(CONNECT_TIMEOUT);
        if let Some(token) = self.model.bearer_token() {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Pull the assistant text out of a non-streaming completion body.
///
/// Only `content` is used. Reasoning models put their chain of thought in a
/// separate `reasoning` field, which is ignored.
pub fn parse_completion_body(body: &str) -> Result<String, InferenceError> {
    let resp: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or(InferenceError::MalformedResponse {
            reason: "completion has no content".into(),
        })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

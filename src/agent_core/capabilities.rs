//! The two model-side capabilities the orchestrator depends on.
//!
//! `DecisionCapability` picks a route for a query; `CompletionCapability`
//! generates free text on the fallback route. Both are implemented for
//! [`InferenceClient`]; tests substitute scripted doubles.

use async_trait::async_trait;

use crate::inference::{ChatMessage, InferenceClient, InferenceError};
use crate::mcp_client::ToolCatalog;

use super::types::{Decision, Turn};
use super::verdict::parse_verdict;

// ─── Traits ─────────────────────────────────────────────────────────────────

/// Chooses between a tool call, a direct answer, or neither.
///
/// Output is untrusted: the orchestrator resolves any tool name against the
/// catalog before acting on it.
#[async_trait]
pub trait DecisionCapability: Send + Sync {
    async fn decide(
        &self,
        query: &str,
        catalog: &ToolCatalog,
        history: &[Turn],
    ) -> Result<Decision, InferenceError>;
}

/// Generates a response from a self-contained prompt.
#[async_trait]
pub trait CompletionCapability: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError>;
}

// ─── Prompts ────────────────────────────────────────────────────────────────

const ROUTING_INSTRUCTIONS: &str = "\
You route user queries for a chat assistant that can call external tools.
Reply with exactly one JSON object and nothing else, using these keys:
  needs_tool (bool): true if one of the tools below should be called
  tool_name (string or null): exact name of the tool to call
  arguments (object): arguments for the tool, matching its parameters
  needs_direct_response (bool): true if you can answer without a tool
  direct_response (string or null): the answer, when needs_direct_response is true
Set both flags to false if neither applies.

Available tools (* marks a required parameter):
";

/// System and user messages for a routing request.
pub fn routing_messages(query: &str, catalog: &ToolCatalog, history: &[Turn]) -> Vec<ChatMessage> {
    let system = format!("{ROUTING_INSTRUCTIONS}{}", catalog.summary());

    let mut user = String::new();
    if !history.is_empty() {
        user.push_str("Recent conversation:\n");
        for turn in history {
            user.push_str(&turn.render());
            user.push('\n');
        }
        user.push('\n');
    }
    user.push_str("Query: ");
    user.push_str(query);

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Prompt for the fallback route: the query plus the recent ledger window.
pub fn fallback_prompt(query: &str, window: &[Turn]) -> String {
    let history = if window.is_empty() {
        "(none)".to_string()
    } else {
        window
            .iter()
            .map(Turn::render)
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are a helpful assistant responding to the following query:\n\
         QUERY: {query}\n\
         CONVERSATION HISTORY:\n{history}\n\
         Please provide an accurate response that considers the conversation history \
         and any responses from the tool server.\n\
         If you are not able to generate a response, say that this is the limit of \
         what the tool server can answer."
    )
}

// ─── InferenceClient ────────────────────────────────────────────────────────

#[async_trait]
impl DecisionCapability for InferenceClient {
    async fn decide(
        &self,
        query: &str,
        catalog: &ToolCatalog,
        history: &[Turn],
    ) -> Result<Decision, InferenceError> {
        let messages = routing_messages(query, catalog, history);
        let raw = self.chat_completion(messages, self.json_verdicts()).await?;

        let decision = parse_verdict(&raw).map_err(|reason| InferenceError::VerdictParseError {
            raw_response: raw.clone(),
            reason,
        })?;
        tracing::debug!(model = %self.model_name(), ?decision, "routing verdict");
        Ok(decision)
    }
}

#[async_trait]
impl CompletionCapability for InferenceClient {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        self.chat_completion(vec![ChatMessage::user(prompt)], false)
            .await
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;
use crate::mcp_client::McpError;

/// Upper bound on the cause shown to the user, in bytes.
const MAX_USER_CAUSE_BYTES: usize = 200;

/// Errors that can end an orchestration run, plus ledger store failures.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The peer channel could not be opened, handshaken, or kept alive.
    #[error("tool session failed: {reason}")]
    Session { reason: String },

    /// The chosen tool is unknown, got bad arguments, timed out, or failed.
    #[error("tool '{tool_name}' failed: {reason}")]
    ToolInvocation { tool_name: String, reason: String },

    /// The decision capability produced no usable verdict.
    #[error("routing decision failed: {reason}")]
    Decision { reason: String },

    /// The completion capability failed during fallback.
    #[error("response generation failed: {reason}")]
    Completion { reason: String },

    /// Ledger store operation failed.
    #[error("ledger store error: {reason}")]
    Store { reason: String },
}

impl AgentError {
    pub fn session(err: McpError) -> Self {
        AgentError::Session {
            reason: err.to_string(),
        }
    }

    pub fn tool(tool_name: &str, err: McpError) -> Self {
        AgentError::ToolInvocation {
            tool_name: tool_name.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn decision(err: InferenceError) -> Self {
        AgentError::Decision {
            reason: err.to_string(),
        }
    }

    pub fn completion(err: InferenceError) -> Self {
        AgentError::Completion {
            reason: err.to_string(),
        }
    }

    /// The single message shown to the user when a run fails.
    pub fn user_message(&self) -> String {
        let cause = self.to_string();
        let short = truncate_utf8(&cause, MAX_USER_CAUSE_BYTES);
        let ellipsis = if short.len() < cause.len() { "..." } else { "" };
        format!("An error occurred while processing your request: {short}{ellipsis}")
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::Store {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Store {
            reason: format!("turn serialization: {e}"),
        }
    }
}

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char boundary.
fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    // Walk backward to find a valid char boundary
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

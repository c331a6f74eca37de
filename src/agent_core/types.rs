//! Shared types for the agent core.
//!
//! Conversation turns, ledger entries, and the routing verdict used across
//! the ledger, the store, and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Turns ──────────────────────────────────────────────────────────────────

/// One entry in the conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// The user's utterance.
    User { content: String },
    /// Free-form text produced by the completion capability.
    Assistant { content: String },
    /// A tool the orchestrator chose to invoke.
    ToolInvocation {
        tool_name: String,
        arguments: serde_json::Value,
    },
    /// The peer's raw, unnormalized reply to a tool invocation.
    ToolResult {
        tool_name: String,
        raw_result: serde_json::Value,
    },
    /// Text the decision capability answered with directly.
    DirectResponse { content: String },
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Turn::Assistant {
            content: content.into(),
        }
    }

    pub fn direct(content: impl Into<String>) -> Self {
        Turn::DirectResponse {
            content: content.into(),
        }
    }

    /// Stable lower-case tag, used as the stored `kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Turn::User { .. } => "user",
            Turn::Assistant { .. } => "assistant",
            Turn::ToolInvocation { .. } => "tool_invocation",
            Turn::ToolResult { .. } => "tool_result",
            Turn::DirectResponse { .. } => "direct_response",
        }
    }

    /// One-line rendering used when turns are embedded in a prompt.
    pub fn render(&self) -> String {
        match self {
            Turn::User { content } => format!("user: {content}"),
            Turn::Assistant { content } => format!("assistant: {content}"),
            Turn::ToolInvocation {
                tool_name,
                arguments,
            } => format!("tool_invocation: {tool_name}({arguments})"),
            Turn::ToolResult {
                tool_name,
                raw_result,
            } => format!("tool_result: {tool_name} -> {raw_result}"),
            Turn::DirectResponse { content } => format!("direct_response: {content}"),
        }
    }
}

/// A turn as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Position in the conversation, starting at 1.
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub turn: Turn,
}

// ─── Routing ────────────────────────────────────────────────────────────────

/// Verdict of the decision capability for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Invoke `tool_name` with `arguments`.
    NeedsTool {
        tool_name: String,
        arguments: serde_json::Value,
    },
    /// Answer with `text` as-is.
    NeedsDirectResponse { text: String },
    /// Neither; generate a response from the query and recent history.
    Unresolved,
}

/// Which branch a completed run took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Tool,
    Direct,
    Fallback,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Route::Tool => "tool",
            Route::Direct => "direct",
            Route::Fallback => "fallback",
        })
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub route: Route,
    pub text: String,
}

// ─── Tests ──────────────────────────────────────────────────────────────────

//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur while talking to the tool-providing peer.
#[derive(Debug, Error)]
pub enum McpError {
    /// The peer process failed to start.
    #[error("failed to spawn peer '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// The initialization handshake failed or timed out.
    #[error("peer '{name}' initialization failed: {reason}")]
    InitFailed { name: String, reason: String },

    /// JSON-RPC communication error (malformed message, I/O error, closed pipe).
    #[error("transport error for peer '{server}': {reason}")]
    TransportError { server: String, reason: String },

    /// Peer returned a JSON-RPC error response.
    #[error("peer error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The tool ran but reported a failure (`isError: true`).
    #[error("tool '{tool}' failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    /// Tool not present in the session's last-fetched catalog.
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    /// `tools/call` issued before `tools/list`.
    #[error("tool catalog not fetched before calling '{tool}'")]
    CatalogNotLoaded { tool: String },

    /// Tool call arguments failed schema validation.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// A tool call timed out.
    #[error("tool call '{tool}' timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
}

impl McpError {
    /// Whether this error means the channel itself is unusable.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            McpError::SpawnFailed { .. }
                | McpError::InitFailed { .. }
                | McpError::TransportError { .. }
        )
    }
}

//! MCP Client: JSON-RPC over stdio to a single tool-providing peer.
//!
//! This module handles:
//! - Spawning the peer child process and the `initialize` handshake
//! - Newline-delimited JSON-RPC 2.0 over the peer's stdio
//! - Tool discovery into a per-session capability catalog
//! - Tool invocation with catalog checks and timeouts
//! - Decoding heterogeneous tool replies into plain text
//!
//! Sessions are never shared: every orchestration run connects its own.

pub mod catalog;
pub mod errors;
pub mod result;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod mock_peer;

// Re-exports for convenience
pub use catalog::ToolCatalog;
pub use errors::McpError;
pub use result::{normalize, ToolReply};
pub use session::{Connector, PeerSession, ProcessConnector, SessionTimeouts};
pub use types::{McpToolDefinition, ServerConfig};

//! Peer session lifecycle.
//!
//! A [`PeerSession`] is one live, handshaken channel to a tool-providing
//! peer. It is acquired per orchestration run through a [`Connector`] and
//! released with [`PeerSession::shutdown`]. The child process is spawned with
//! `kill_on_drop`, so a session dropped on an error path or by cancellation
//! still takes its peer down with it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use super::catalog::ToolCatalog;
use super::errors::McpError;
use super::result::{is_error_reply, normalize};
use super::transport::{extract_result, LineTransport, PeerReader, PeerWriter};
use super::types::{
    InitializeResult, ListToolsResult, ServerConfig, MCP_PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default bound on spawn + `initialize` round trip.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a single `tools/call`.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for the peer to exit after its input is closed.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lines of peer stderr kept for failure diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// Upper bound on `tools/list` pages followed via `nextCursor`.
const MAX_LIST_PAGES: usize = 32;

// ─── Timeouts ────────────────────────────────────────────────────────────────

/// Time bounds for the suspension points of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Bounds the `initialize` round trip and each `tools/list` page.
    pub handshake: Duration,
    /// Bounds a single `tools/call`.
    pub call: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            handshake: DEFAULT_HANDSHAKE_TIMEOUT,
            call: DEFAULT_CALL_TIMEOUT,
        }
    }
}

// ─── PeerSession ─────────────────────────────────────────────────────────────

/// A handshaken channel to one peer, with the catalog fetched over it.
pub struct PeerSession {
    name: String,
    transport: LineTransport,
    /// `None` for in-process peers.
    process: Option<Child>,
    stderr_tail: Option<Arc<Mutex<VecDeque<String>>>>,
    /// Catalog from the most recent `list_tools`.
    catalog: Option<ToolCatalog>,
    timeouts: SessionTimeouts,
}

impl PeerSession {
    /// Spawn the peer process described by `config` and perform the handshake.
    pub async fn spawn(config: &ServerConfig, timeouts: SessionTimeouts) -> Result<Self, McpError> {
        let name = config.display_name().to_string();

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &config.cwd {
            cmd.current_dir(dir);
        }

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or(McpError::SpawnFailed {
            name: name.clone(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or(McpError::SpawnFailed {
            name: name.clone(),
            reason: "failed to capture stdout".into(),
        })?;
        let stderr_tail = child.stderr.take().map(|s| drain_stderr(&name, s));

        tracing::info!(peer = %name, pid = ?child.id(), "spawned tool peer");

        let session = Self {
            transport: LineTransport::new(&name, Box::new(stdin), Box::new(stdout)),
            name,
            process: Some(child),
            stderr_tail,
            catalog: None,
            timeouts,
        };
        session.handshake().await?;
        Ok(session)
    }

    /// Handshake with a peer reachable over an already-open pair of pipes.
    pub async fn over_pipes(
        name: &str,
        writer: PeerWriter,
        reader: PeerReader,
        timeouts: SessionTimeouts,
    ) -> Result<Self, McpError> {
        let session = Self {
            name: name.to_string(),
            transport: LineTransport::new(name, writer, reader),
            process: None,
            stderr_tail: None,
            catalog: None,
            timeouts,
        };
        session.handshake().await?;
        Ok(session)
    }

    /// `initialize` request followed by the `initialized` notification.
    ///
    /// Any failure, including expiry of the handshake timeout, is reported as
    /// `InitFailed` with the peer's recent stderr attached.
    async fn handshake(&self) -> Result<(), McpError> {
        let params = serde_json::json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let outcome = tokio::time::timeout(self.timeouts.handshake, async {
            let response = self.transport.request("initialize", Some(params)).await?;
            let result = extract_result(response)?;
            let init: InitializeResult =
                serde_json::from_value(result).map_err(|e| McpError::InitFailed {
                    name: self.name.clone(),
                    reason: format!("failed to parse initialize response: {e}"),
                })?;
            self.transport
                .notify("notifications/initialized", None)
                .await?;
            Ok::<_, McpError>(init)
        })
        .await;

        let reason = match outcome {
            Ok(Ok(init)) => {
                let info = init.server_info.as_ref();
                tracing::info!(
                    peer = %self.name,
                    server_name = info.and_then(|i| i.name.as_deref()).unwrap_or("unknown"),
                    server_version = info.and_then(|i| i.version.as_deref()).unwrap_or("unknown"),
                    protocol = init.protocol_version.as_deref().unwrap_or("unspecified"),
                    "peer handshake complete"
                );
                return Ok(());
            }
            Ok(Err(McpError::InitFailed { reason, .. })) => reason,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "initialization timed out after {}ms",
                self.timeouts.handshake.as_millis()
            ),
        };

        let stderr_ctx = self.stderr_tail();
        if !stderr_ctx.is_empty() {
            tracing::warn!(peer = %self.name, stderr = %stderr_ctx, "peer stderr captured on failed handshake");
        }
        Err(McpError::InitFailed {
            name: self.name.clone(),
            reason: format!("{reason}{}", format_stderr_suffix(&stderr_ctx)),
        })
    }

    // ─── Discovery ───────────────────────────────────────────────────────

    /// Fetch the peer's tools and replace this session's catalog.
    ///
    /// Each page is bounded by the handshake timeout. A peer that stops
    /// answering here is treated as a dead channel.
    pub async fn list_tools(&mut self) -> Result<ToolCatalog, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let response = tokio::time::timeout(
                self.timeouts.handshake,
                self.transport.request("tools/list", params),
            )
            .await
            .map_err(|_| McpError::TransportError {
                server: self.name.clone(),
                reason: format!(
                    "tools/list timed out after {}ms",
                    self.timeouts.handshake.as_millis()
                ),
            })??;
            let result = extract_result(response)?;

            cursor = result
                .get("nextCursor")
                .and_then(|c| c.as_str())
                .map(str::to_string);

            let page: ListToolsResult =
                serde_json::from_value(result).map_err(|e| McpError::TransportError {
                    server: self.name.clone(),
                    reason: format!("failed to parse tools/list response: {e}"),
                })?;
            tools.extend(page.tools);

            if cursor.is_none() {
                break;
            }
        }

        let catalog = ToolCatalog::from_tools(tools);
        tracing::info!(peer = %self.name, tools = ?catalog.tool_names(), "discovered tools");
        self.catalog = Some(catalog.clone());
        Ok(catalog)
    }

    // ─── Invocation ──────────────────────────────────────────────────────

    /// Invoke a tool and return its raw, unnormalized reply.
    ///
    /// The name must be in the last-fetched catalog; otherwise the peer is
    /// never contacted.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let catalog = self.catalog.as_ref().ok_or(McpError::CatalogNotLoaded {
            tool: tool_name.to_string(),
        })?;
        catalog.validate_arguments(tool_name, &arguments)?;

        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });

        let timeout_ms = self.timeouts.call.as_millis() as u64;
        let response = tokio::time::timeout(
            self.timeouts.call,
            self.transport.request("tools/call", Some(params)),
        )
        .await
        .map_err(|_| McpError::Timeout {
            tool: tool_name.to_string(),
            timeout_ms,
        })??;

        let raw = extract_result(response)?;
        if is_error_reply(&raw) {
            return Err(McpError::ToolFailed {
                tool: tool_name.to_string(),
                reason: normalize(&raw),
            });
        }
        Ok(raw)
    }

    // ─── Teardown ────────────────────────────────────────────────────────

    /// Close the channel and reap the peer, force-killing it if it lingers.
    pub async fn shutdown(mut self) {
        self.transport.close().await;

        if let Some(mut child) = self.process.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(peer = %self.name, %status, "peer exited");
                }
                _ => {
                    let _ = child.kill().await;
                    tracing::debug!(peer = %self.name, "peer force-killed on shutdown");
                }
            }
        }
    }

    fn stderr_tail(&self) -> String {
        self.stderr_tail
            .as_ref()
            .and_then(|tail| {
                tail.lock()
                    .ok()
                    .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
            })
            .unwrap_or_default()
    }
}

/// Drain peer stderr into debug logs, keeping the last few lines.
///
/// A piped stderr that nobody reads eventually blocks the peer once the pipe
/// buffer fills.
fn drain_stderr(name: &str, stderr: ChildStderr) -> Arc<Mutex<VecDeque<String>>> {
    let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
    let sink = Arc::clone(&tail);
    let name = name.to_string();

    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(peer = %name, "stderr: {line}");
            if let Ok(mut buf) = sink.lock() {
                if buf.len() == STDERR_TAIL_LINES {
                    buf.pop_front();
                }
                buf.push_back(line);
            }
        }
    });

    tail
}

/// Format a stderr suffix for error messages (empty string if no stderr).
fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

// ─── Connector ───────────────────────────────────────────────────────────────

/// Source of fresh sessions; each orchestration run acquires its own.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<PeerSession, McpError>;
}

/// Spawns the configured peer process for every session.
#[derive(Debug, Clone)]
pub struct ProcessConnector {
    config: ServerConfig,
    timeouts: SessionTimeouts,
}

impl ProcessConnector {
    pub fn new(config: ServerConfig, timeouts: SessionTimeouts) -> Self {
        Self { config, timeouts }
    }
}

#[async_trait]
impl Connector for ProcessConnector {
    async fn connect(&self) -> Result<PeerSession, McpError> {
        PeerSession::spawn(&self.config, self.timeouts).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Scripted in-process MCP peer for tests.
//!
//! Serves newline-delimited JSON-RPC over a `tokio::io::duplex` pipe and
//! records every message it receives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::errors::McpError;
use super::session::{Connector, PeerSession, SessionTimeouts};
use super::types::McpToolDefinition;

/// How the mock peer misbehaves, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    Normal,
    /// Every `tools/call` returns `isError: true`.
    ToolErrors,
    /// Every `tools/call` returns a JSON-RPC error.
    RpcErrors,
    /// `tools/call` never answers.
    HangOnCall,
    /// Nothing is ever answered.
    Silent,
    /// `initialize` returns a JSON-RPC error.
    RejectInitialize,
    /// `tools/list` is split over two pages.
    PaginateList,
    /// Handshake succeeds, `tools/list` never answers.
    SilentOnList,
    /// Closes both pipes as soon as a `tools/call` arrives.
    ClosesOnCall,
}

#[derive(Clone)]
pub struct MockPeer {
    tools: Vec<McpToolDefinition>,
    replies: HashMap<String, Value>,
    behavior: PeerBehavior,
    timeouts: SessionTimeouts,
    /// `(method, params)` of every message received, in order.
    log: Arc<Mutex<Vec<(String, Value)>>>,
}

fn text_reply(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}], "isError": false})
}

impl MockPeer {
    /// A peer exposing `predict_winner` and `get_player_stats`.
    pub fn cricket() -> Self {
        let tools = vec![
            McpToolDefinition {
                name: "predict_winner".into(),
                description: "Predict the winner between two cricket teams (mock implementation).".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "team1": {"type": "string"},
                        "team2": {"type": "string"}
                    },
                    "required": ["team1", "team2"]
                }),
            },
            McpToolDefinition {
                name: "get_player_stats".into(),
                description: "Get mock stats for a cricket player.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"player_name": {"type": "string"}},
                    "required": ["player_name"]
                }),
            },
        ];

        let mut replies = HashMap::new();
        replies.insert(
            "predict_winner".to_string(),
            text_reply("Predicted winner: India (mock prediction)"),
        );
        replies.insert(
            "get_player_stats".to_string(),
            json!({
                "content": [{"type": "text", "text": "{\"result\": \"Stats for Kohli\"}"}],
                "structuredContent": {"result": "Stats for Kohli: 1200 runs, 40 wickets (mock data)."},
                "isError": false
            }),
        );

        Self {
            tools,
            replies,
            behavior: PeerBehavior::Normal,
            timeouts: SessionTimeouts {
                handshake: Duration::from_millis(500),
                call: Duration::from_millis(500),
            },
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_behavior(mut self, behavior: PeerBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_reply(mut self, tool: &str, reply: Value) -> Self {
        self.replies.insert(tool.to_string(), reply);
        self
    }

    /// Methods received, in order.
    pub fn methods(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    /// `(tool name, arguments)` of every `tools/call` received.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == "tools/call")
            .map(|(_, p)| {
                (
                    p["name"].as_str().unwrap_or_default().to_string(),
                    p["arguments"].clone(),
                )
            })
            .collect()
    }

    /// Start serving and handshake a session against it.
    pub async fn session(&self, timeouts: SessionTimeouts) -> Result<PeerSession, McpError> {
        let (client_side, peer_side) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        tokio::spawn(self.clone().serve(peer_side));
        PeerSession::over_pipes(
            "mock",
            Box::new(client_write),
            Box::new(client_read),
            timeouts,
        )
        .await
    }

    async fn serve(self, stream: tokio::io::DuplexStream) {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(msg) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            let method = msg["method"].as_str().unwrap_or_default().to_string();
            let params = msg.get("params").cloned().unwrap_or(Value::Null);
            self.log.lock().unwrap().push((method.clone(), params.clone()));

            let Some(id) = msg.get("id").cloned() else {
                continue;
            };
            if self.behavior == PeerBehavior::Silent {
                continue;
            }

            let outcome = match method.as_str() {
                "initialize" if self.behavior == PeerBehavior::RejectInitialize => {
                    Err((-32600, "unsupported protocol version"))
                }
                "initialize" => Ok(json!({
                    "protocolVersion": "2025-06-18",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "cricket_prediction", "version": "1.0.0"}
                })),
                "tools/list" if self.behavior == PeerBehavior::SilentOnList => continue,
                "tools/list" => Ok(self.list_page(&params)),
                "tools/call" => match self.behavior {
                    PeerBehavior::HangOnCall => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        continue;
                    }
                    PeerBehavior::ClosesOnCall => break,
                    PeerBehavior::ToolErrors => Ok(json!({
                        "content": [{"type": "text", "text": "stats backend unavailable"}],
                        "isError": true
                    })),
                    PeerBehavior::RpcErrors => Err((-32603, "internal error")),
                    _ => {
                        let name = params["name"].as_str().unwrap_or_default();
                        self.replies
                            .get(name)
                            .cloned()
                            .ok_or((-32602, "Unknown tool"))
                    }
                },
                _ => Err((-32601, "Method not found")),
            };

            let reply = match outcome {
                Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                Err((code, message)) => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": code, "message": message}
                }),
            };
            let mut out = reply.to_string();
            out.push('\n');
            if write.write_all(out.as_bytes()).await.is_err() {
                break;
            }
        }
    }

    fn list_page(&self, params: &Value) -> Value {
        if self.behavior != PeerBehavior::PaginateList {
            return json!({"tools": self.tools});
        }
        let (first, rest) = self.tools.split_at(1.min(self.tools.len()));
        if params.get("cursor").is_some() {
            json!({"tools": rest})
        } else {
            json!({"tools": first, "nextCursor": "page-2"})
        }
    }
}

#[async_trait]
impl Connector for MockPeer {
    async fn connect(&self) -> Result<PeerSession, McpError> {
        self.session(self.timeouts).await
    }
}

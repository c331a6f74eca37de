//! Newline-delimited JSON-RPC transport.
//!
//! One JSON object per line in each direction. The transport is generic over
//! the byte pipes so a spawned child's stdio and an in-process duplex pipe
//! look the same to the session layer.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Boxed write half of a peer channel.
pub type PeerWriter = Box<dyn AsyncWrite + Send + Unpin>;
/// Boxed read half of a peer channel.
pub type PeerReader = Box<dyn AsyncRead + Send + Unpin>;

// ─── Transport ───────────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a pair of byte pipes.
///
/// Request ids are allocated per transport, starting at 1.
pub struct LineTransport {
    peer_name: String,
    next_id: AtomicU64,
    writer: Mutex<PeerWriter>,
    reader: Mutex<BufReader<PeerReader>>,
}

impl LineTransport {
    pub fn new(peer_name: &str, writer: PeerWriter, reader: PeerReader) -> Self {
        Self {
            peer_name: peer_name.to_string(),
            next_id: AtomicU64::new(1),
            writer: Mutex::new(writer),
            reader: Mutex::new(BufReader::new(reader)),
        }
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.peer_name.clone(),
            reason,
        }
    }

    /// Send a JSON-RPC request and wait for the response carrying its id.
    ///
    /// Lines that are not responses (peer log output, peer-initiated
    /// notifications or requests, replies to other ids) are skipped.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        let line = serde_json::to_string(&req)
            .map_err(|e| self.transport_error(format!("failed to serialize request: {e}")))?;

        // Hold the reader across write + read so concurrent callers on one
        // transport cannot steal each other's replies.
        let mut reader = self.reader.lock().await;
        self.write_line(line).await?;

        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.transport_error(format!("failed to read from peer: {e}")))?;

            if bytes_read == 0 {
                return Err(self.transport_error(
                    "peer output closed (process may have exited)".into(),
                ));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
                tracing::debug!(peer = %self.peer_name, line = %trimmed, "skipping non-JSON peer output");
                continue;
            };
            if value.get("method").is_some() {
                tracing::debug!(
                    peer = %self.peer_name,
                    method = %value["method"],
                    "ignoring peer-initiated message"
                );
                continue;
            }
            match serde_json::from_value::<JsonRpcResponse>(value) {
                Ok(resp) if resp.id == Some(id) => return Ok(resp),
                Ok(resp) if resp.id.is_none() && resp.error.is_some() => {
                    // Peer could not parse our request and could not echo the id.
                    return Ok(resp);
                }
                _ => continue,
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let line = serde_json::to_string(&notification).map_err(|e| {
            self.transport_error(format!("failed to serialize notification: {e}"))
        })?;
        self.write_line(line).await
    }

    async fn write_line(&self, mut line: String) -> Result<(), McpError> {
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to peer: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush peer input: {e}")))
    }

    /// Close the write half so the peer sees end-of-input.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: super::types::error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// A transport whose far end is handed back to the test.
    fn paired() -> (
        LineTransport,
        BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
        tokio::io::WriteHalf<tokio::io::DuplexStream>,
    ) {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (our_read, our_write) = tokio::io::split(ours);
        let (their_read, their_write) = tokio::io::split(theirs);
        let transport = LineTransport::new("test", Box::new(our_write), Box::new(our_read));
        (transport, BufReader::new(their_read), their_write)
    }

    #[tokio::test]
    async fn test_request_skips_noise_and_other_ids() {
        let (transport, mut peer_in, mut peer_out) = paired();

        let peer = tokio::spawn(async move {
            let mut line = String::new();
            peer_in.read_line(&mut line).await.unwrap();
            let req: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(req["method"], "tools/list");
            let id = req["id"].as_u64().unwrap();

            let noise = format!(
                "starting up...\n\
                 {{\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\",\"params\":{{}}}}\n\
                 {{\"jsonrpc\":\"2.0\",\"id\":{},\"result\":{{\"wrong\":true}}}}\n\
                 {{\"jsonrpc\":\"2.0\",\"id\":{id},\"result\":{{\"tools\":[]}}}}\n",
                id + 100
            );
            peer_out.write_all(noise.as_bytes()).await.unwrap();
        });

        let resp = transport.request("tools/list", None).await.unwrap();
        let result = extract_result(resp).unwrap();
        assert!(result["tools"].as_array().unwrap().is_empty());
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_ids_are_monotonic_per_transport() {
        let (transport, mut peer_in, mut peer_out) = paired();

        let peer = tokio::spawn(async move {
            let mut ids = Vec::new();
            for _ in 0..2 {
                let mut line = String::new();
                peer_in.read_line(&mut line).await.unwrap();
                let req: serde_json::Value = serde_json::from_str(&line).unwrap();
                let id = req["id"].as_u64().unwrap();
                ids.push(id);
                let reply = format!("{{\"jsonrpc\":\"2.0\",\"id\":{id},\"result\":{{}}}}\n");
                peer_out.write_all(reply.as_bytes()).await.unwrap();
            }
            ids
        });

        transport.request("ping", None).await.unwrap();
        transport.request("ping", None).await.unwrap();
        assert_eq!(peer.await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_closed_peer_is_transport_error() {
        let (transport, peer_in, peer_out) = paired();
        drop(peer_in);
        drop(peer_out);

        let err = transport.request("tools/list", None).await.unwrap_err();
        assert!(err.is_transport_failure());
    }

    #[test]
    fn test_extract_result_error() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: Some(1),
            result: None,
            error: Some(super::super::types::JsonRpcError {
                code: -32601,
                message: "Method not found".into(),
                data: None,
            }),
        };
        match extract_result(resp).unwrap_err() {
            McpError::ServerError { code, message, .. } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_result_missing_both() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: Some(1),
            result: None,
            error: None,
        };
        assert!(matches!(
            extract_result(resp).unwrap_err(),
            McpError::ServerError { .. }
        ));
    }
}

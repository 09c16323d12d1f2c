//! WebSocket transport
//!
//! One connection per call: the facade connects, runs the handshake, sends
//! the call, and closes. Framing is one JSON message per text frame. The
//! connect timeout is separate from the RPC timeout so an unreachable host
//! fails fast without eating into the call window.

use crate::protocol::{
    normalize_response_id, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
use crate::transport::Transport;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use lf_types::{ClientError, ClientResult};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

/// Bound on establishing the connection, distinct from the RPC timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport implementation
///
/// The connection lives for one call (or one short call sequence: handshake
/// plus call); there is no cross-call session state to correlate, so
/// responses are matched by scanning incoming frames for the request id.
pub struct WebSocketTransport {
    url: String,

    stream: tokio::sync::Mutex<Option<WsStream>>,
}

impl WebSocketTransport {
    /// Connect to a WebSocket tool server (ws:// or wss://)
    pub async fn connect(url: String, connect_timeout: Duration) -> ClientResult<Self> {
        tracing::debug!("Connecting to WebSocket tool server: {}", url);

        let (ws_stream, _) = tokio::time::timeout(connect_timeout, connect_async(&url))
            .await
            .map_err(|_| {
                ClientError::Connection(format!(
                    "Timed out connecting to WebSocket server {} after {:?}",
                    url, connect_timeout
                ))
            })?
            .map_err(|e| {
                ClientError::Connection(format!("Failed to connect to WebSocket server: {}", e))
            })?;

        Ok(Self {
            url,
            stream: tokio::sync::Mutex::new(Some(ws_stream)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_request(
        &self,
        mut request: JsonRpcRequest,
        timeout: Duration,
    ) -> ClientResult<JsonRpcResponse> {
        let request_id = crate::protocol::random_id();
        request.id = Some(Value::String(request_id.clone()));

        let json = serde_json::to_string(&request)
            .map_err(|e| ClientError::Protocol(format!("Failed to serialize request: {}", e)))?;

        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| ClientError::Connection("WebSocket already closed".to_string()))?;

        stream
            .send(Message::Text(json))
            .await
            .map_err(|e| ClientError::Connection(format!("Failed to send message: {}", e)))?;

        // Scan incoming frames for our id; foreign responses and
        // notifications are skipped, not errors
        let response = tokio::time::timeout(timeout, async {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<JsonRpcMessage>(&text) {
                            Ok(JsonRpcMessage::Response(response)) => {
                                if response.is_session_fatal() {
                                    let detail = response
                                        .error
                                        .map(|e| e.message)
                                        .unwrap_or_default();
                                    return Err(ClientError::Protocol(format!(
                                        "Server reported session error: {}",
                                        detail
                                    )));
                                }
                                if normalize_response_id(&response.id) == request_id {
                                    return Ok(response);
                                }
                                tracing::debug!(
                                    "Skipping response for foreign id: {}",
                                    response.id
                                );
                            }
                            Ok(JsonRpcMessage::Notification(notification)) => {
                                tracing::debug!(
                                    "Notification during call: {}",
                                    notification.method
                                );
                            }
                            Ok(JsonRpcMessage::Request(_)) => {
                                tracing::warn!("Ignoring unexpected request from server");
                            }
                            Err(e) => {
                                tracing::debug!("Skipping unparseable frame: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Err(ClientError::Connection(
                            "WebSocket closed before response".to_string(),
                        ));
                    }
                    Some(Ok(_)) => {
                        // Ping/pong/binary frames
                    }
                    Some(Err(e)) => {
                        return Err(ClientError::Connection(format!(
                            "WebSocket read error: {}",
                            e
                        )));
                    }
                    None => {
                        return Err(ClientError::Connection(
                            "WebSocket stream ended before response".to_string(),
                        ));
                    }
                }
            }
        })
        .await
        .map_err(|_| {
            ClientError::Timeout(format!(
                "No response within {:?} for id {}",
                timeout, request_id
            ))
        })??;

        Ok(response)
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> ClientResult<()> {
        let json = serde_json::to_string(&notification)
            .map_err(|e| ClientError::Protocol(format!("Failed to serialize notification: {}", e)))?;

        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| ClientError::Connection("WebSocket already closed".to_string()))?;

        stream
            .send(Message::Text(json))
            .await
            .map_err(|e| ClientError::Connection(format!("Failed to send notification: {}", e)))
    }

    async fn is_healthy(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    async fn close(&self) -> ClientResult<()> {
        let stream = self.stream.lock().await.take();
        if let Some(mut stream) = stream {
            // Best-effort close frame; the connection is per-call anyway
            if let Err(e) = stream.close(None).await {
                tracing::debug!("WebSocket close failed: {}", e);
            }
        }
        Ok(())
    }
}

//! SSE transport
//!
//! Dual-channel: a GET event stream carries responses, and requests go to a
//! sibling POST endpoint. The stream lives for one call only; the adapter
//! scans `data:` lines for the response whose id matches, then drops the
//! stream. No session state is reused across calls.

use crate::protocol::{
    normalize_response_id, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    METHOD_INITIALIZE, METHOD_INITIALIZED,
};
use crate::transport::Transport;
use crate::handshake;
use async_trait::async_trait;
use futures_util::StreamExt;
use lf_types::{ClientError, ClientResult};
use serde_json::Value;
use std::time::Duration;

/// Bound on establishing either HTTP connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Derive the side-channel POST endpoint from the stream URL.
///
/// This deployment's servers expose the event stream at `…/sse` and accept
/// messages at the sibling `…/message` path. That is a convention of the
/// servers we talk to, not a protocol requirement; other SSE tool servers
/// may advertise their endpoint differently.
pub fn derive_post_url(stream_url: &str) -> String {
    match stream_url.strip_suffix("/sse") {
        Some(base) => format!("{}/message", base),
        None => format!("{}/message", stream_url.trim_end_matches('/')),
    }
}

/// SSE transport implementation
pub struct SseTransport {
    stream_url: String,
    post_url: String,
    client: reqwest::Client,
}

impl SseTransport {
    /// Create a transport for one call against `stream_url`
    pub fn connect(stream_url: String) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        let post_url = derive_post_url(&stream_url);

        Ok(Self {
            stream_url,
            post_url,
            client,
        })
    }

    /// POST one message to the side channel
    async fn post_message(&self, payload: &impl serde::Serialize) -> ClientResult<()> {
        let response = self
            .client
            .post(&self.post_url)
            .json(payload)
            .timeout(handshake::HANDSHAKE_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClientError::Connection(format!("Failed to POST to {}: {}", self.post_url, e)))?;

        if !response.status().is_success() {
            return Err(ClientError::Connection(format!(
                "Side-channel POST returned status {}",
                response.status()
            )));
        }

        Ok(())
    }

    /// Best-effort initialize/initialized; failures are logged and ignored
    async fn best_effort_handshake(&self) {
        let init = JsonRpcRequest::with_random_id(
            METHOD_INITIALIZE,
            Some(handshake::initialize_params()),
        );
        if let Err(e) = self.post_message(&init).await {
            tracing::debug!("SSE handshake initialize failed (ignored): {}", e);
            return;
        }
        let initialized = JsonRpcNotification::new(METHOD_INITIALIZED, None);
        if let Err(e) = self.post_message(&initialized).await {
            tracing::debug!("SSE handshake initialized failed (ignored): {}", e);
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send_request(
        &self,
        mut request: JsonRpcRequest,
        timeout: Duration,
    ) -> ClientResult<JsonRpcResponse> {
        let request_id = crate::protocol::random_id();
        request.id = Some(Value::String(request_id.clone()));

        tokio::time::timeout(timeout, async {
            // Open the stream first so the response cannot race past us
            let stream_response = self
                .client
                .get(&self.stream_url)
                .header("Accept", "text/event-stream")
                .send()
                .await
                .map_err(|e| {
                    ClientError::Connection(format!(
                        "Failed to open event stream {}: {}",
                        self.stream_url, e
                    ))
                })?;

            if !stream_response.status().is_success() {
                return Err(ClientError::Connection(format!(
                    "Event stream returned status {}",
                    stream_response.status()
                )));
            }

            if request.method != METHOD_INITIALIZE {
                self.best_effort_handshake().await;
            }

            self.post_message(&request).await?;

            // Scan data: lines for our id; everything else on the stream is
            // skipped
            let mut body = stream_response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| {
                    ClientError::Connection(format!("Event stream read error: {}", e))
                })?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let line = line.trim();

                    let Some(data) = line.strip_prefix("data:") else {
                        // Event boundaries, comments, and field lines other
                        // than data are irrelevant here
                        continue;
                    };

                    match serde_json::from_str::<JsonRpcMessage>(data.trim()) {
                        Ok(JsonRpcMessage::Response(response)) => {
                            if response.is_session_fatal() {
                                let detail =
                                    response.error.map(|e| e.message).unwrap_or_default();
                                return Err(ClientError::Protocol(format!(
                                    "Server reported session error: {}",
                                    detail
                                )));
                            }
                            if normalize_response_id(&response.id) == request_id {
                                // Dropping the body aborts the stream
                                return Ok(response);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::debug!("Skipping unparseable SSE data line: {}", e);
                        }
                    }
                }
            }

            Err(ClientError::Connection(
                "Event stream ended before response".to_string(),
            ))
        })
        .await
        .map_err(|_| {
            ClientError::Timeout(format!(
                "No response within {:?} for id {}",
                timeout, request_id
            ))
        })?
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> ClientResult<()> {
        self.post_message(&notification).await
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn close(&self) -> ClientResult<()> {
        Ok(())
    }
}

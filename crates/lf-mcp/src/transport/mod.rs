//! Transport adapters
//!
//! Four transports, one contract. Framing discipline and connection lifetime
//! differ per adapter:
//! - Stdio: persistent subprocess session, incremental frame extraction
//! - WebSocket: one connection per call, one JSON message per text frame
//! - SSE: one event stream per call plus a side-channel POST endpoint
//! - HTTP: one POST per call, whole-body JSON

pub mod http;
pub mod sse;
pub mod stdio;
pub mod websocket;

pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use websocket::WebSocketTransport;

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use lf_types::ClientResult;
use std::time::Duration;

/// Default wait for a tool-call response
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport contract shared by all four adapters
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and await its correlated response, bounded by `timeout`
    async fn send_request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> ClientResult<JsonRpcResponse>;

    /// Send a notification; no response follows
    async fn send_notification(&self, notification: JsonRpcNotification) -> ClientResult<()>;

    /// Whether the transport can currently carry a call
    async fn is_healthy(&self) -> bool;

    /// Close/cleanup the transport
    async fn close(&self) -> ClientResult<()>;
}

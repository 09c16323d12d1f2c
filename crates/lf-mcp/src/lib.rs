//! Multi-transport tool-calling client
//!
//! Invokes named tools on independent tool-server processes and services
//! over a JSON-RPC-shaped protocol (MCP). Four transports are supported:
//! a spawned subprocess over stdin/stdout, WebSocket, an SSE stream paired
//! with a side-channel POST endpoint, and plain HTTP. All of them present
//! the same contract: send a named call with arguments, get back a
//! correlated result or error, with a bounded wait.

pub mod client;
pub mod correlation;
pub mod framing;
pub mod handshake;
pub mod protocol;
pub mod transport;

pub use client::{McpClient, RestartPredicate};
pub use lf_types::{
    ClientError, ClientResult, ContentPart, ServerDiagnostics, ToolCallResult, ToolDescriptor,
};
pub use protocol::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
pub use transport::{HttpTransport, SseTransport, StdioTransport, Transport, WebSocketTransport};

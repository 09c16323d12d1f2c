//! Session handshake
//!
//! Stateful transports require an `initialize` request followed by an
//! `initialized` notification before any tool call. The handshake runs under
//! its own timeout, shorter than the per-call default, so a wedged server
//! surfaces quickly instead of consuming a whole call window.

use crate::protocol::{
    JsonRpcNotification, JsonRpcRequest, METHOD_INITIALIZE, METHOD_INITIALIZED,
};
use crate::transport::Transport;
use lf_types::{ClientError, ClientResult};
use serde_json::{json, Value};
use std::time::Duration;

/// Bound on the initialize round-trip
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Protocol revision this client speaks
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const CLIENT_NAME: &str = "listingforge";

/// Parameters of the `initialize` request: client identity, no capabilities
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Run the initialize/initialized exchange on `transport`.
///
/// Callers that require the handshake (stdio, WebSocket) propagate the
/// error; the per-call transports (SSE, HTTP) invoke this best-effort and
/// ignore failures.
pub async fn run_handshake<T: Transport + ?Sized>(transport: &T) -> ClientResult<()> {
    let request = JsonRpcRequest::new(None, METHOD_INITIALIZE, Some(initialize_params()));

    let response = transport
        .send_request(request, HANDSHAKE_TIMEOUT)
        .await
        .map_err(|e| match e {
            ClientError::Timeout(msg) => {
                ClientError::Handshake(format!("initialize timed out: {}", msg))
            }
            ClientError::Connection(_) | ClientError::ProcessExit(_) => e,
            other => ClientError::Handshake(format!("initialize failed: {}", other)),
        })?;

    if let Some(error) = response.error {
        return Err(ClientError::Handshake(format!(
            "initialize rejected ({}): {}",
            error.code, error.message
        )));
    }

    transport
        .send_notification(JsonRpcNotification::new(METHOD_INITIALIZED, None))
        .await?;

    Ok(())
}

//! Client facade
//!
//! Resolves a server reference to its configured transport and dispatches
//! `tools/list` / `tools/call` to the right adapter. Process sessions are
//! cached and reused; the network transports open a fresh connection per
//! call. All registries are instance state so independent clients can
//! coexist (notably in tests); there is no module-level registry.

use crate::handshake;
use crate::protocol::{
    JsonRpcRequest, JsonRpcResponse, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
};
use crate::transport::{
    websocket, HttpTransport, SseTransport, StdioTransport, Transport, WebSocketTransport,
    DEFAULT_CALL_TIMEOUT,
};
use dashmap::DashMap;
use lf_config::{McpServerConfig, McpTransportType};
use lf_types::{ClientError, ClientResult, ServerDiagnostics, ToolCallResult, ToolDescriptor};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a live process session should be discarded before reuse.
///
/// Receives the server id and the current stderr tail. Used for servers that
/// wedge themselves into a bad session state recognizable from their stderr;
/// install a predicate matching that specific signature. This is a narrow
/// workaround hook, not general self-healing: the predicate should match one
/// known server's known failure text, nothing broader.
pub type RestartPredicate = Arc<dyn Fn(&str, &[String]) -> bool + Send + Sync>;

/// Tool-server client
///
/// One instance owns its config registry and its live process sessions.
#[derive(Default)]
pub struct McpClient {
    /// Server configurations (server id -> config)
    configs: DashMap<String, McpServerConfig>,

    /// Live process sessions (server id -> transport)
    sessions: DashMap<String, Arc<StdioTransport>>,

    /// Serializes session acquisition so concurrent first calls cannot
    /// spawn two processes for one server id
    spawn_lock: tokio::sync::Mutex<()>,

    restart_predicate: Option<RestartPredicate>,
}

impl McpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a stuck-session predicate (see [`RestartPredicate`])
    pub fn with_restart_predicate(mut self, predicate: RestartPredicate) -> Self {
        self.restart_predicate = Some(predicate);
        self
    }

    /// Replace the config registry with `configs`
    pub fn load_configs(&self, configs: Vec<McpServerConfig>) {
        self.configs.clear();
        for config in configs {
            self.configs.insert(config.id.clone(), config);
        }
    }

    pub fn add_config(&self, config: McpServerConfig) {
        self.configs.insert(config.id.clone(), config);
    }

    pub fn get_config(&self, server_ref: &str) -> Option<McpServerConfig> {
        self.configs.get(server_ref).map(|entry| entry.value().clone())
    }

    /// List the tools a server exposes
    pub async fn list_tools(&self, server_ref: &str) -> ClientResult<Vec<ToolDescriptor>> {
        let response = self
            .request(server_ref, METHOD_TOOLS_LIST, None, None)
            .await?;
        let result = expect_result(response)?;

        let tools = result
            .get("tools")
            .cloned()
            .unwrap_or_else(|| Value::Array(vec![]));
        serde_json::from_value(tools)
            .map_err(|e| ClientError::Protocol(format!("Malformed tools/list result: {}", e)))
    }

    /// Invoke a named tool with `args`
    ///
    /// `timeout` bounds the wait for a response; it does not cancel work on
    /// the server side, and for process servers it never kills the process.
    pub async fn call_tool(
        &self,
        server_ref: &str,
        tool_name: &str,
        args: Value,
        timeout: Option<Duration>,
    ) -> ClientResult<ToolCallResult> {
        let params = json!({
            "name": tool_name,
            "arguments": args,
        });
        let response = self
            .request(server_ref, METHOD_TOOLS_CALL, Some(params), timeout)
            .await?;
        let result = expect_result(response)?;

        serde_json::from_value(result)
            .map_err(|e| ClientError::Protocol(format!("Malformed tools/call result: {}", e)))
    }

    /// Diagnostics for a server's live process session.
    ///
    /// Empty/uninitialized for servers without one (network transports, or a
    /// process server that has not been called yet).
    pub fn diagnostics(&self, server_ref: &str) -> ServerDiagnostics {
        self.sessions
            .get(server_ref)
            .map(|session| session.diagnostics())
            .unwrap_or_default()
    }

    /// Tear down a server's process session, if any
    pub async fn stop_server(&self, server_ref: &str) -> ClientResult<()> {
        if let Some((_, session)) = self.sessions.remove(server_ref) {
            session.kill().await?;
        }
        Ok(())
    }

    /// Tear down every live process session
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, session)) = self.sessions.remove(&id) {
                if let Err(e) = session.kill().await {
                    tracing::warn!("Failed to kill session '{}': {}", id, e);
                }
            }
        }
    }

    /// Dispatch one request over the server's configured transport
    async fn request(
        &self,
        server_ref: &str,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> ClientResult<JsonRpcResponse> {
        let config = self.get_config(server_ref).ok_or_else(|| {
            ClientError::Connection(format!("Unknown server: {}", server_ref))
        })?;

        if !config.enabled {
            return Err(ClientError::Connection(format!(
                "Server is disabled: {}",
                server_ref
            )));
        }

        let timeout = timeout.unwrap_or(DEFAULT_CALL_TIMEOUT);
        let request = JsonRpcRequest::new(None, method, params);

        match config.transport {
            McpTransportType::Stdio => {
                let session = self.stdio_session(&config).await?;
                session.ensure_initialized().await?;
                session.send_request(request, timeout).await
            }
            McpTransportType::WebSocket => {
                let url = network_url(&config)?;
                let transport =
                    WebSocketTransport::connect(url, websocket::CONNECT_TIMEOUT).await?;
                let result = async {
                    handshake::run_handshake(&transport).await?;
                    transport.send_request(request, timeout).await
                }
                .await;
                let _ = transport.close().await;
                result
            }
            McpTransportType::Sse => {
                let transport = SseTransport::connect(network_url(&config)?)?;
                transport.send_request(request, timeout).await
            }
            McpTransportType::Http => {
                let transport = HttpTransport::connect(network_url(&config)?)?;
                transport.send_request(request, timeout).await
            }
        }
    }

    /// Get or (re)spawn the process session for `config`.
    ///
    /// A dead session, or a live one flagged by the restart predicate, is
    /// discarded here so the next spawn starts clean.
    async fn stdio_session(&self, config: &McpServerConfig) -> ClientResult<Arc<StdioTransport>> {
        let _guard = self.spawn_lock.lock().await;

        if let Some(existing) = self
            .sessions
            .get(&config.id)
            .map(|entry| entry.value().clone())
        {
            let flagged = self
                .restart_predicate
                .as_ref()
                .map(|predicate| predicate(&config.id, &existing.stderr_tail()))
                .unwrap_or(false);

            if existing.is_alive() && !flagged {
                return Ok(existing);
            }

            self.sessions.remove(&config.id);
            if flagged {
                tracing::warn!(
                    "Discarding stuck session for '{}' (restart predicate matched)",
                    config.id
                );
                let _ = existing.kill().await;
            }
        }

        let (command, args, env) = config
            .transport_config
            .parse_stdio_command()
            .map_err(ClientError::Connection)?;

        let session = Arc::new(StdioTransport::spawn(&config.id, command, args, env).await?);
        self.sessions.insert(config.id.clone(), session.clone());
        Ok(session)
    }
}

fn network_url(config: &McpServerConfig) -> ClientResult<String> {
    config
        .transport_config
        .url()
        .map(str::to_string)
        .ok_or_else(|| {
            ClientError::Connection(format!(
                "Server '{}' has no URL configured for its transport",
                config.id
            ))
        })
}

/// Unwrap a response into its result, mapping a JSON-RPC error to the
/// remote-tool error kind
fn expect_result(response: JsonRpcResponse) -> ClientResult<Value> {
    if let Some(error) = response.error {
        return Err(ClientError::RemoteTool {
            code: error.code,
            message: error.message,
        });
    }
    response.result.ok_or_else(|| {
        ClientError::Protocol("Response carried neither result nor error".to_string())
    })
}

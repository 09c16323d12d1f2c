//! Stdio transport
//!
//! Spawns a tool-server subprocess and speaks JSON-RPC over its piped
//! stdin/stdout. The session is persistent: one live process per server id,
//! shared by concurrent callers through the correlation table. Stderr is
//! retained in a bounded ring for diagnostics.

use crate::correlation::CorrelationTable;
use crate::framing::FrameBuffer;
use crate::handshake;
use crate::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use lf_types::{ClientError, ClientResult, ServerDiagnostics};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// Maximum retained stderr lines per session (oldest evicted first)
pub const STDERR_TAIL_MAX: usize = 50;

/// Stdio transport implementation
///
/// Owns the child process exclusively; external code reaches it only through
/// the facade. Supports concurrent requests with request/response
/// correlation, and tolerates log noise on stdout.
pub struct StdioTransport {
    /// Server id this session belongs to, for log and error context
    server_id: String,

    /// Child process
    child: Arc<RwLock<Option<Child>>>,

    /// Stdin handle for sending requests
    /// Mutex rather than RwLock so concurrent writers serialize cleanly
    stdin: Arc<tokio::sync::Mutex<Option<ChildStdin>>>,

    /// Pending requests waiting for responses
    correlation: Arc<CorrelationTable>,

    /// One-time initialize/initialized exchange, shared by concurrent
    /// first callers
    initialized: tokio::sync::OnceCell<()>,

    /// Most recent stderr lines, oldest first
    stderr_tail: Arc<RwLock<VecDeque<String>>>,

    /// Whether the session is closed
    closed: Arc<RwLock<bool>>,
}

impl StdioTransport {
    /// Spawn a new tool-server process.
    ///
    /// # Arguments
    /// * `server_id` - Logical server id owning this session
    /// * `command` - The executable (e.g., "npx")
    /// * `args` - Command arguments
    /// * `env` - Environment variables to set
    pub async fn spawn(
        server_id: &str,
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    ) -> ClientResult<Self> {
        tracing::info!(
            "Spawning tool-server process for '{}': {} {:?}",
            server_id,
            command,
            args
        );

        let mut child = Command::new(&command)
            .args(&args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ClientError::Connection(format!(
                    "Failed to spawn tool-server process '{}': {}",
                    command, e
                ))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            ClientError::Connection("Failed to capture stdin of tool-server process".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ClientError::Connection("Failed to capture stdout of tool-server process".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ClientError::Connection("Failed to capture stderr of tool-server process".to_string())
        })?;

        let transport = Self {
            server_id: server_id.to_string(),
            child: Arc::new(RwLock::new(Some(child))),
            stdin: Arc::new(tokio::sync::Mutex::new(Some(stdin))),
            correlation: Arc::new(CorrelationTable::new()),
            initialized: tokio::sync::OnceCell::new(),
            stderr_tail: Arc::new(RwLock::new(VecDeque::new())),
            closed: Arc::new(RwLock::new(false)),
        };

        transport.start_stdout_reader(stdout);
        transport.start_stderr_reader(stderr);

        tracing::info!("Tool-server process for '{}' spawned", server_id);

        Ok(transport)
    }

    /// Background task: feed stdout through the frame extractor and dispatch
    fn start_stdout_reader(&self, stdout: ChildStdout) {
        let server_id = self.server_id.clone();
        let correlation = self.correlation.clone();
        let closed = self.closed.clone();

        tokio::spawn(async move {
            let mut stdout = stdout;
            let mut frames = FrameBuffer::new();
            let mut chunk = [0u8; 4096];

            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) => {
                        tracing::info!("Tool-server '{}' stdout closed", server_id);
                        break;
                    }
                    Ok(n) => {
                        let text = String::from_utf8_lossy(&chunk[..n]);
                        for message in frames.push(&text) {
                            Self::dispatch(&server_id, &correlation, message);
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading tool-server '{}' stdout: {}", server_id, e);
                        break;
                    }
                }
            }

            // Process is gone; every waiter fails together
            *closed.write() = true;
            correlation.fail_all(ClientError::ProcessExit(format!(
                "Tool-server process '{}' exited",
                server_id
            )));
        });
    }

    fn dispatch(server_id: &str, correlation: &CorrelationTable, message: JsonRpcMessage) {
        match message {
            // A null-id error frame is addressed to no particular call; it
            // poisons the whole session
            JsonRpcMessage::Response(JsonRpcResponse {
                id: Value::Null,
                error: Some(error),
                ..
            }) => {
                correlation.fail_all(ClientError::Protocol(format!(
                    "Tool-server '{}' reported session error ({}): {}",
                    server_id, error.code, error.message
                )));
            }
            JsonRpcMessage::Response(response) => {
                correlation.settle(response);
            }
            JsonRpcMessage::Notification(notification) => {
                tracing::debug!(
                    "Notification from tool-server '{}': {}",
                    server_id,
                    notification.method
                );
            }
            JsonRpcMessage::Request(request) => {
                tracing::warn!(
                    "Ignoring unexpected request from tool-server '{}': {}",
                    server_id,
                    request.method
                );
            }
        }
    }

    /// Background task: retain the most recent stderr lines
    fn start_stderr_reader(&self, stderr: ChildStderr) {
        let server_id = self.server_id.clone();
        let tail = self.stderr_tail.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim_end();
                        tracing::debug!("[{} stderr] {}", server_id, trimmed);
                        let mut tail = tail.write();
                        if tail.len() == STDERR_TAIL_MAX {
                            tail.pop_front();
                        }
                        tail.push_back(trimmed.to_string());
                    }
                    Err(e) => {
                        tracing::debug!("Error reading tool-server '{}' stderr: {}", server_id, e);
                        break;
                    }
                }
            }
        });
    }

    /// Run the handshake once per process instance.
    ///
    /// Concurrent first callers await the same in-flight exchange; a failed
    /// handshake leaves the cell empty so the next caller retries.
    pub async fn ensure_initialized(&self) -> ClientResult<()> {
        self.initialized
            .get_or_try_init(|| async {
                tracing::debug!("Initializing session for tool-server '{}'", self.server_id);
                handshake::run_handshake(self).await
            })
            .await
            .map(|_| ())
    }

    /// Whether the process is still running
    pub fn is_alive(&self) -> bool {
        if *self.closed.read() {
            return false;
        }

        let mut child = self.child.write();
        if let Some(ref mut process) = *child {
            match process.try_wait() {
                Ok(Some(_status)) => false,
                Ok(None) => true,
                Err(e) => {
                    tracing::error!("Error checking process status: {}", e);
                    false
                }
            }
        } else {
            false
        }
    }

    /// Diagnostics snapshot for error messages
    pub fn diagnostics(&self) -> ServerDiagnostics {
        ServerDiagnostics {
            initialized: self.initialized.initialized(),
            stderr_tail: self.stderr_tail.read().iter().cloned().collect(),
        }
    }

    /// Current stderr tail, oldest first
    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail.read().iter().cloned().collect()
    }

    /// Kill the child process
    pub async fn kill(&self) -> ClientResult<()> {
        tracing::info!("Killing tool-server process for '{}'", self.server_id);

        *self.closed.write() = true;

        let child_process = {
            let mut child = self.child.write();
            child.take()
        };

        if let Some(mut process) = child_process {
            process.kill().await.map_err(|e| {
                ClientError::Connection(format!("Failed to kill tool-server process: {}", e))
            })?;
        }

        Ok(())
    }

    /// Serialize a message and write it to stdin as one line.
    ///
    /// `pending_id` is removed from the correlation table on write failure so
    /// the entry cannot leak.
    async fn write_line(&self, payload: &str, pending_id: Option<&str>) -> ClientResult<()> {
        let mut json = payload.to_string();
        json.push('\n');

        let mut stdin_guard = self.stdin.lock().await;
        let stdin = match stdin_guard.as_mut() {
            Some(stdin) => stdin,
            None => {
                if let Some(id) = pending_id {
                    self.correlation.remove(id);
                }
                return Err(ClientError::Connection("Stdin not available".to_string()));
            }
        };

        if let Err(e) = stdin.write_all(json.as_bytes()).await {
            if let Some(id) = pending_id {
                self.correlation.remove(id);
            }
            return Err(ClientError::Connection(format!(
                "Failed to write to stdin: {}",
                e
            )));
        }

        if let Err(e) = stdin.flush().await {
            if let Some(id) = pending_id {
                self.correlation.remove(id);
            }
            return Err(ClientError::Connection(format!(
                "Failed to flush stdin: {}",
                e
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send_request(
        &self,
        mut request: JsonRpcRequest,
        timeout: Duration,
    ) -> ClientResult<JsonRpcResponse> {
        if *self.closed.read() {
            return Err(ClientError::ProcessExit(format!(
                "Tool-server process '{}' is not running",
                self.server_id
            )));
        }

        // The table owns id generation: fresh token, no collision with any
        // pending call on this session
        let (request_id, rx) = self.correlation.register();
        request.id = Some(Value::String(request_id.clone()));

        let json = serde_json::to_string(&request).map_err(|e| {
            self.correlation.remove(&request_id);
            ClientError::Protocol(format!("Failed to serialize request: {}", e))
        })?;

        self.write_line(&json, Some(&request_id)).await?;

        self.correlation.wait(&request_id, rx, timeout).await
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> ClientResult<()> {
        if *self.closed.read() {
            return Err(ClientError::ProcessExit(format!(
                "Tool-server process '{}' is not running",
                self.server_id
            )));
        }

        let json = serde_json::to_string(&notification)
            .map_err(|e| ClientError::Protocol(format!("Failed to serialize notification: {}", e)))?;

        self.write_line(&json, None).await
    }

    async fn is_healthy(&self) -> bool {
        self.is_alive()
    }

    async fn close(&self) -> ClientResult<()> {
        self.kill().await
    }
}

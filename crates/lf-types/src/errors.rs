//! Error types and conversions

use thiserror::Error;

/// Failure taxonomy for tool-server calls.
///
/// Every failed operation surfaces exactly one of these kinds. The client
/// never retries and never substitutes a fallback value; retry policy belongs
/// to the orchestration layer above.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Transport or process could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// The initialize exchange failed or timed out
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Unparseable or structurally invalid frame reached dispatch,
    /// or the server emitted an id-null error frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A well-formed JSON-RPC error returned for a specific call
    #[error("Remote tool error {code}: {message}")]
    RemoteTool { code: i32, message: String },

    /// No response within the configured window
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The server process terminated while calls were pending
    #[error("Process exited: {0}")]
    ProcessExit(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<ClientError> for String {
    fn from(err: ClientError) -> String {
        err.to_string()
    }
}

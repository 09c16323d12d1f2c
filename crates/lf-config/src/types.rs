//! Configuration types for tool servers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn default_true() -> bool {
    true
}

/// Tool-server configuration
///
/// Identity of one tool server: its id, transport kind, and the parameters
/// needed to reach it. Immutable once read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpServerConfig {
    /// Unique identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Transport type
    pub transport: McpTransportType,

    /// Transport-specific configuration
    pub transport_config: McpTransportConfig,

    /// Whether the server is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Transport type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum McpTransportType {
    /// Spawn a subprocess with piped stdin/stdout
    Stdio,

    /// Bidirectional WebSocket connection
    WebSocket,

    /// Server-Sent Events stream with a side-channel POST endpoint
    Sse,

    /// Plain request/response HTTP
    Http,
}

/// Transport-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpTransportConfig {
    /// Subprocess configuration
    Stdio {
        /// Full command to execute, parsed with shell-words at runtime
        /// Example: "npx -y @modelcontextprotocol/server-everything"
        command: String,
        /// Explicit arguments; when non-empty these take precedence over
        /// words parsed out of `command`
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        /// Environment variables for the child process
        #[serde(default)]
        env: HashMap<String, String>,
    },

    /// WebSocket configuration (ws:// or wss:// URL)
    WebSocket { url: String },

    /// SSE configuration: URL of the event stream endpoint
    Sse { url: String },

    /// Plain HTTP configuration: URL receiving one POST per call
    Http { url: String },
}

impl McpTransportConfig {
    /// Parse the stdio command into executable, arguments, and environment.
    ///
    /// Accepts either a single command string split with shell-words or the
    /// explicit command + args form.
    #[allow(clippy::type_complexity)]
    pub fn parse_stdio_command(
        &self,
    ) -> Result<(String, Vec<String>, HashMap<String, String>), String> {
        match self {
            McpTransportConfig::Stdio { command, args, env } => {
                if !args.is_empty() {
                    return Ok((command.clone(), args.clone(), env.clone()));
                }

                let parts = shell_words::split(command)
                    .map_err(|e| format!("Failed to parse command '{}': {}", command, e))?;

                if parts.is_empty() {
                    return Err("Command is empty".to_string());
                }

                let executable = parts[0].clone();
                let parsed_args = parts[1..].to_vec();

                Ok((executable, parsed_args, env.clone()))
            }
            _ => Err("Not a stdio transport".to_string()),
        }
    }

    /// URL of a network transport, if this is one
    pub fn url(&self) -> Option<&str> {
        match self {
            McpTransportConfig::Stdio { .. } => None,
            McpTransportConfig::WebSocket { url }
            | McpTransportConfig::Sse { url }
            | McpTransportConfig::Http { url } => Some(url),
        }
    }
}

impl McpServerConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        transport: McpTransportType,
        transport_config: McpTransportConfig,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transport,
            transport_config,
            enabled: true,
        }
    }

    /// Check that the transport kind and transport config agree
    pub fn validate(&self) -> Result<(), ConfigError> {
        let matches = matches!(
            (self.transport, &self.transport_config),
            (McpTransportType::Stdio, McpTransportConfig::Stdio { .. })
                | (McpTransportType::WebSocket, McpTransportConfig::WebSocket { .. })
                | (McpTransportType::Sse, McpTransportConfig::Sse { .. })
                | (McpTransportType::Http, McpTransportConfig::Http { .. })
        );
        if !matches {
            return Err(ConfigError::Invalid(format!(
                "Server '{}': transport kind does not match transport config",
                self.id
            )));
        }
        Ok(())
    }
}

/// Top-level configuration document
///
/// TOML shape:
///
/// ```toml
/// [[mcp_servers]]
/// id = "everything"
/// name = "Everything server"
/// transport = "stdio"
/// transport_config = { type = "stdio", command = "npx -y @modelcontextprotocol/server-everything" }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
}

impl McpConfig {
    /// Parse a TOML document and validate every server entry
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: McpConfig = toml::from_str(input)?;
        for server in &config.mcp_servers {
            server.validate()?;
        }
        let mut seen = std::collections::HashSet::new();
        for server in &config.mcp_servers {
            if !seen.insert(server.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate server id: {}",
                    server.id
                )));
            }
        }
        Ok(config)
    }

    /// Load and parse a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::debug!("Loading tool-server config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

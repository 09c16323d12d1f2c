//! Tool-server configuration
//!
//! Static configuration describing which tool servers exist and how to reach
//! them. Configs are read once at startup and never mutated at runtime.

pub mod types;

pub use types::{ConfigError, McpConfig, McpServerConfig, McpTransportConfig, McpTransportType};

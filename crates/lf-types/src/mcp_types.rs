//! Tool-call types shared across crates
//!
//! These are pass-through shapes: the client transports them between the
//! orchestration layer and tool servers without interpreting their content.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named tool exposed by a tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// One content part of a tool-call result
///
/// Servers may emit kinds other than text (images, resources); those are
/// carried opaquely and left to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },

    #[serde(untagged)]
    Other(Value),
}

impl ContentPart {
    /// Text of this part, if it is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            ContentPart::Other(_) => None,
        }
    }
}

/// Result of a `tools/call` invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentPart>,

    /// Set by the server when the tool itself failed; distinct from a
    /// JSON-RPC error, which rejects the call instead
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Diagnostics snapshot for a server, used when building error messages
///
/// Only the process transport populates this; for the network transports
/// `initialized` is false and the tail is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerDiagnostics {
    pub initialized: bool,

    /// Most recent stderr lines, oldest first, bounded
    pub stderr_tail: Vec<String>,
}

//! WebSocket transport tests
//!
//! The adapter opens one connection per call: connect, handshake, call,
//! close. The mock answers from canned maps with built-in initialize and
//! echo behavior.

use super::common::*;
use super::request_validation::*;
use lf_mcp::{ClientError, McpClient};
use serde_json::json;
use std::time::Duration;

async fn client_with_mock(id: &str) -> (McpClient, WebSocketMockServer) {
    init_tracing();
    let mock = WebSocketMockServer::new().await;
    let client = McpClient::new();
    client.add_config(websocket_server_config(id, mock.server_url()));
    (client, mock)
}

#[tokio::test]
async fn test_websocket_list_tools() {
    let (client, mock) = client_with_mock("ws").await;
    mock.mock_method(
        "tools/list",
        json!({"tools": [{"name": "generate_listing"}, {"name": "echo"}]}),
    );

    let tools = client.list_tools("ws").await.expect("tools/list failed");
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].name, "generate_listing");

    mock.shutdown().await;
}

#[tokio::test]
async fn test_websocket_call_tool_echo() {
    let (client, mock) = client_with_mock("ws").await;

    let result = client
        .call_tool("ws", "echo", json!({"text": "over the wire"}), None)
        .await
        .expect("tools/call failed");
    assert_text_content(&result, "over the wire");

    mock.shutdown().await;
}

#[tokio::test]
async fn test_websocket_sequential_calls_use_fresh_connections() {
    let (client, mock) = client_with_mock("ws").await;

    // Connection-per-call: each call handshakes and completes on its own
    for text in ["one", "two", "three"] {
        let result = client
            .call_tool("ws", "echo", json!({"text": text}), None)
            .await
            .unwrap();
        assert_text_content(&result, text);
    }

    mock.shutdown().await;
}

#[tokio::test]
async fn test_websocket_remote_tool_error() {
    let (client, mock) = client_with_mock("ws").await;
    mock.mock_error("tools/call", -32001, "tool exploded");

    let err = client
        .call_tool("ws", "echo", json!({}), None)
        .await
        .unwrap_err();
    assert_remote_tool_error(&err, -32001);

    mock.shutdown().await;
}

#[tokio::test]
async fn test_websocket_call_timeout() {
    let (client, mock) = client_with_mock("ws").await;
    mock.mock_silent("tools/call");

    let err = client
        .call_tool("ws", "echo", json!({}), Some(Duration::from_millis(300)))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)), "got: {:?}", err);

    mock.shutdown().await;
}

#[tokio::test]
async fn test_websocket_handshake_failure() {
    let (client, mock) = client_with_mock("ws").await;
    mock.mock_error("initialize", -32600, "unsupported protocol revision");

    let err = client.list_tools("ws").await.unwrap_err();
    assert!(matches!(err, ClientError::Handshake(_)), "got: {:?}", err);

    mock.shutdown().await;
}

#[tokio::test]
async fn test_websocket_unreachable_server_is_connection_error() {
    init_tracing();
    let client = McpClient::new();
    // Nothing listens here
    client.add_config(websocket_server_config(
        "nowhere",
        "ws://127.0.0.1:1/".to_string(),
    ));

    let err = client.list_tools("nowhere").await.unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)), "got: {:?}", err);
}

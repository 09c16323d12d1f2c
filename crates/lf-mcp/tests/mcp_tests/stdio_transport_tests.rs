//! Stdio transport tests
//!
//! Process session lifecycle: spawn, handshake, correlation under
//! concurrency, crash handling, respawn, diagnostics, and the restart
//! heuristic. All of these spawn the Python mock tool server.

use super::common::*;
use super::request_validation::*;
use lf_mcp::{ClientError, McpClient, ToolCallResult};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn first_text(result: &ToolCallResult) -> String {
    result
        .content
        .first()
        .and_then(|part| part.as_text())
        .unwrap_or_default()
        .to_string()
}

fn client_with_mock(id: &str, mock: &StdioMockConfig) -> McpClient {
    init_tracing();
    let client = McpClient::new();
    client.add_config(stdio_server_config(id, mock));
    client
}

#[tokio::test]
async fn test_stdio_list_and_call_echo() {
    let mock = StdioMockBuilder::new().build();
    let client = client_with_mock("srv", &mock);

    let tools = client.list_tools("srv").await.expect("tools/list failed");
    assert!(tools.iter().any(|t| t.name == "echo"));

    let result = client
        .call_tool("srv", "echo", json!({"text": "hi"}), None)
        .await
        .expect("tools/call failed");
    assert_text_content(&result, "hi");
    assert_ne!(result.is_error, Some(true));
}

#[tokio::test]
async fn test_stdio_concurrent_calls_resolve_by_id() {
    let mock = StdioMockBuilder::new().build();
    let client = Arc::new(client_with_mock("srv", &mock));

    // The slow call responds last; every caller must still get its own
    // payload back
    let slow = {
        let client = client.clone();
        async move {
            client
                .call_tool("srv", "sleep", json!({"delay_ms": 400}), None)
                .await
        }
    };
    let fast_a = {
        let client = client.clone();
        async move { client.call_tool("srv", "echo", json!({"text": "alpha"}), None).await }
    };
    let fast_b = {
        let client = client.clone();
        async move { client.call_tool("srv", "echo", json!({"text": "beta"}), None).await }
    };

    let (slow, fast_a, fast_b) = tokio::join!(slow, fast_a, fast_b);

    assert_eq!(first_text(&slow.unwrap()), "slept");
    assert_eq!(first_text(&fast_a.unwrap()), "alpha");
    assert_eq!(first_text(&fast_b.unwrap()), "beta");
}

#[tokio::test]
async fn test_stdio_session_reused_across_calls() {
    let mock = StdioMockBuilder::new().build();
    let client = client_with_mock("srv", &mock);

    let pid_a = first_text(&client.call_tool("srv", "pid", json!({}), None).await.unwrap());
    let pid_b = first_text(&client.call_tool("srv", "pid", json!({}), None).await.unwrap());
    assert_eq!(pid_a, pid_b, "Sequential calls must reuse the live session");
}

#[tokio::test]
async fn test_stdio_process_exit_rejects_inflight_then_respawns() {
    let mock = StdioMockBuilder::new().exit_on_tool("die").build();
    let client = client_with_mock("srv", &mock);

    // Warm up the session so the crash hits an established process
    let pid_before = first_text(&client.call_tool("srv", "pid", json!({}), None).await.unwrap());

    let err = client
        .call_tool("srv", "die", json!({}), None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ClientError::ProcessExit(_)),
        "Expected ProcessExit, got: {:?}",
        err
    );

    // The next call spawns a fresh process and completes normally
    let pid_after = first_text(&client.call_tool("srv", "pid", json!({}), None).await.unwrap());
    assert_ne!(pid_before, pid_after);

    let result = client
        .call_tool("srv", "echo", json!({"text": "back"}), None)
        .await
        .unwrap();
    assert_text_content(&result, "back");
}

#[tokio::test]
async fn test_stdio_null_id_error_rejects_all_pending() {
    let mock = StdioMockBuilder::new().fatal_on_tool("poison").build();
    let client = Arc::new(client_with_mock("srv", &mock));

    // Establish the session first
    client
        .call_tool("srv", "echo", json!({"text": "warm"}), None)
        .await
        .unwrap();

    // Park one slow call in the correlation table...
    let slow = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .call_tool("srv", "sleep", json!({"delay_ms": 2000}), None)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    // ...then trigger the id-null error frame. It matches no pending id,
    // so every pending call on the session fails together.
    let poison_err = client
        .call_tool("srv", "poison", json!({}), None)
        .await
        .unwrap_err();
    assert!(
        matches!(poison_err, ClientError::Protocol(_)),
        "got: {:?}",
        poison_err
    );

    let slow_err = slow.await.unwrap().unwrap_err();
    assert!(
        matches!(slow_err, ClientError::Protocol(_)),
        "got: {:?}",
        slow_err
    );
}

#[tokio::test]
async fn test_stdio_timeout_leaves_session_usable() {
    let mock = StdioMockBuilder::new().build();
    let client = client_with_mock("srv", &mock);

    let err = client
        .call_tool(
            "srv",
            "sleep",
            json!({"delay_ms": 2000}),
            Some(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)), "got: {:?}", err);

    // The sleep response eventually arrives for an id nobody is waiting on;
    // it must be dropped silently and the session must keep working
    let result = client
        .call_tool("srv", "echo", json!({"text": "still here"}), None)
        .await
        .unwrap();
    assert_text_content(&result, "still here");
}

#[tokio::test]
async fn test_stdio_noise_on_stdout_tolerated() {
    let mock = StdioMockBuilder::new().with_noise().build();
    let client = client_with_mock("srv", &mock);

    let tools = client.list_tools("srv").await.unwrap();
    assert!(!tools.is_empty());

    let result = client
        .call_tool("srv", "echo", json!({"text": "through the noise"}), None)
        .await
        .unwrap();
    assert_text_content(&result, "through the noise");
}

#[tokio::test]
async fn test_stdio_remote_tool_error() {
    let mock = StdioMockBuilder::new()
        .mock_error("tools/call", -32602, "bad arguments")
        .build();
    let client = client_with_mock("srv", &mock);

    let err = client
        .call_tool("srv", "echo", json!({}), None)
        .await
        .unwrap_err();
    assert_remote_tool_error(&err, -32602);
}

#[tokio::test]
async fn test_stdio_diagnostics_capture_stderr_tail() {
    let mock = StdioMockBuilder::new()
        .with_stderr_lines(&["warming up", "ready to serve"])
        .build();
    let client = client_with_mock("srv", &mock);

    client
        .call_tool("srv", "echo", json!({"text": "x"}), None)
        .await
        .unwrap();
    // Stderr is read on its own task; give it a beat to drain
    tokio::time::sleep(Duration::from_millis(200)).await;

    let diagnostics = client.diagnostics("srv");
    assert!(diagnostics.initialized);
    assert!(
        diagnostics
            .stderr_tail
            .iter()
            .any(|line| line.contains("ready to serve")),
        "stderr tail: {:?}",
        diagnostics.stderr_tail
    );
}

#[tokio::test]
async fn test_stdio_restart_predicate_discards_stuck_session() {
    let mock = StdioMockBuilder::new()
        .with_stderr_lines(&["FATAL: legacy session state detected"])
        .build();

    init_tracing();
    let client = McpClient::new().with_restart_predicate(Arc::new(|server_id, tail| {
        server_id == "stuck" && tail.iter().any(|line| line.contains("legacy session state"))
    }));
    client.add_config(stdio_server_config("stuck", &mock));

    let pid_a = first_text(&client.call_tool("stuck", "pid", json!({}), None).await.unwrap());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The predicate now matches the stderr tail, so the session is
    // discarded and this call runs against a fresh process
    let pid_b = first_text(&client.call_tool("stuck", "pid", json!({}), None).await.unwrap());
    assert_ne!(pid_a, pid_b);
}

#[tokio::test]
async fn test_stdio_stop_server_tears_down_session() {
    let mock = StdioMockBuilder::new().build();
    let client = client_with_mock("srv", &mock);

    let pid_a = first_text(&client.call_tool("srv", "pid", json!({}), None).await.unwrap());

    client.stop_server("srv").await.unwrap();
    let diagnostics = client.diagnostics("srv");
    assert!(!diagnostics.initialized, "Stopped session must be forgotten");

    let pid_b = first_text(&client.call_tool("srv", "pid", json!({}), None).await.unwrap());
    assert_ne!(pid_a, pid_b);
}

#[tokio::test]
async fn test_stdio_spawn_failure_is_connection_error() {
    init_tracing();
    let client = McpClient::new();
    let mock = StdioMockConfig {
        command: "definitely-not-a-real-binary-3f9c".to_string(),
        args: vec![],
        env: Default::default(),
    };
    client.add_config(stdio_server_config("ghost", &mock));

    let err = client.list_tools("ghost").await.unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)), "got: {:?}", err);
}

//! End-to-end scenarios driven through `McpServer::dispatch`, the
//! transport-free seam: `StdioTransport` is bound to the process's real
//! stdio, so these tests build requests by hand and inspect responses
//! directly rather than piping through actual stdin/stdout.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use cursor_workspace_mcp::config::ConfigManager;
use cursor_workspace_mcp::executor::ToolExecutor;
use cursor_workspace_mcp::mcp::protocol::{parse_message, IncomingMessage, JsonRpcRequest, RequestId};
use cursor_workspace_mcp::mcp::McpServer;
use cursor_workspace_mcp::registry::ToolRegistry;
use cursor_workspace_mcp::sandbox::PathSandbox;
use cursor_workspace_mcp::schema::{Field, Schema};
use cursor_workspace_mcp::tools::{self, EditorPort, ModelPort};

fn request(id: i64, method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: RequestId::Number(id),
        method: method.to_string(),
        params,
    }
}

fn init_params(protocol_version: &str) -> serde_json::Value {
    json!({
        "protocolVersion": protocol_version,
        "capabilities": {},
        "clientInfo": {"name": "integration-test", "version": "0"},
    })
}

fn server_with_registry(registry: Arc<RwLock<ToolRegistry>>, limit: u32, timeout_ms: u64) -> McpServer {
    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), limit, timeout_ms));
    McpServer::new(registry, executor, CancellationToken::new())
}

fn empty_server() -> McpServer {
    server_with_registry(Arc::new(RwLock::new(ToolRegistry::new())), 10, 5000)
}

/// Scenario 1: an unsupported `protocolVersion` is rejected and the
/// session stays uninitialized.
#[tokio::test]
async fn handshake_with_unsupported_version_is_rejected() {
    let mut server = empty_server();

    let resp = server
        .dispatch(request(1, "initialize", Some(init_params("1999-01-01"))))
        .await
        .unwrap_err();
    let json = serde_json::to_value(&resp).unwrap();

    assert_eq!(json["error"]["code"], -32600);
    assert_eq!(json["error"]["data"]["errorCode"], "UNSUPPORTED_PROTOCOL_VERSION");
    assert_eq!(json["id"], 1);

    // The session never transitioned; a subsequent tools/list still fails.
    let resp = server.dispatch(request(2, "tools/list", None)).await.unwrap_err();
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["error"]["data"]["errorCode"], "NOT_INITIALIZED");
}

/// Scenario 2: calling `tools/list` before `initialize` fails closed.
#[tokio::test]
async fn tools_list_before_initialize_fails() {
    let mut server = empty_server();

    let resp = server.dispatch(request(2, "tools/list", None)).await.unwrap_err();
    let json = serde_json::to_value(&resp).unwrap();

    assert_eq!(json["error"]["code"], -32600);
    assert_eq!(json["error"]["data"]["errorCode"], "NOT_INITIALIZED");
    assert_eq!(json["id"], 2);
}

/// Scenario 3: a path that escapes the workspace root is rejected before
/// any file system read takes place.
#[tokio::test]
async fn read_file_rejects_path_traversal() {
    let workspace = tempdir().unwrap();
    let sandbox = Arc::new(PathSandbox::new(workspace.path(), &[]).unwrap());
    let config = Arc::new(ConfigManager::new(cursor_workspace_mcp::config::config_path(workspace.path())).unwrap());
    let editor = Arc::new(EditorPort::new());
    let model = Arc::new(ModelPort::new());

    let registry = Arc::new(RwLock::new(ToolRegistry::new()));
    {
        let mut reg = registry.write().await;
        tools::register_all(
            &mut reg,
            &["read_file".to_string()],
            sandbox,
            config,
            editor,
            model,
        )
        .unwrap();
    }

    let mut server = server_with_registry(registry, 10, 5000);
    server.dispatch(request(1, "initialize", Some(init_params("2024-11-05")))).await.unwrap();

    let resp = server
        .dispatch(request(2, "tools/call", Some(json!({"name": "read_file", "arguments": {"path": "../etc/passwd"}}))))
        .await
        .unwrap();
    let json = serde_json::to_value(&resp).unwrap();

    assert_eq!(json["result"]["isError"], true);
    let text = json["result"]["content"][0]["text"].as_str().unwrap();
    let payload: serde_json::Value = serde_json::from_str(text).unwrap();
    assert_eq!(payload["errorCode"], "PATH_TRAVERSAL");
    assert_eq!(payload["context"]["attemptedPath"], "../etc/passwd");
}

/// Scenario 4: with a concurrency limit of three, three simultaneous
/// 500 ms calls succeed while a fourth is rejected immediately rather
/// than queued.
#[tokio::test]
async fn fourth_concurrent_call_is_rejected_immediately() {
    let registry = Arc::new(RwLock::new(ToolRegistry::new()));
    registry
        .write()
        .await
        .register(
            "sleep",
            "sleeps for 500ms",
            Schema::default(),
            Arc::new(|_args| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(json!({"slept": true}))
                })
            }),
        )
        .unwrap();

    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), 3, 5000));
    let server = Arc::new(tokio::sync::Mutex::new(McpServer::new(
        registry,
        executor,
        CancellationToken::new(),
    )));

    server
        .lock()
        .await
        .dispatch(request(1, "initialize", Some(init_params("2024-11-05"))))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..3 {
        let server = Arc::clone(&server);
        handles.push(tokio::spawn(async move {
            server
                .lock()
                .await
                .dispatch(request(i + 2, "tools/call", Some(json!({"name": "sleep", "arguments": {}}))))
                .await
        }));
    }

    // Give the three long calls time to be admitted before the fourth arrives.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fourth = server
        .lock()
        .await
        .dispatch(request(5, "tools/call", Some(json!({"name": "sleep", "arguments": {}}))))
        .await
        .unwrap();
    let fourth_json = serde_json::to_value(&fourth).unwrap();
    assert_eq!(fourth_json["result"]["isError"], true);
    let text = fourth_json["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("CONCURRENCY_LIMIT_EXCEEDED"));
    assert_eq!(fourth_json["id"], 5);

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}

/// Scenario 5: overwriting the config file's `logging.level` is picked up
/// by a reload within the hot-reload contract, without disturbing
/// unrelated executor state.
#[tokio::test]
async fn config_reload_picks_up_changed_log_level() {
    let workspace = tempdir().unwrap();
    let path = cursor_workspace_mcp::config::config_path(workspace.path());
    let manager = ConfigManager::new(path.clone()).unwrap();
    assert_eq!(
        manager.current().logging.level,
        cursor_workspace_mcp::config::LogLevel::Info
    );

    let contents = std::fs::read_to_string(&path).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&contents).unwrap();
    value["logging"]["level"] = json!("debug");
    std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

    manager.reload().await.unwrap();
    assert_eq!(
        manager.current().logging.level,
        cursor_workspace_mcp::config::LogLevel::Debug
    );
}

/// Scenario 6: a malformed line produces an error event but does not
/// terminate the stream; a subsequent valid request is handled normally.
#[tokio::test]
async fn malformed_frame_does_not_poison_subsequent_requests() {
    let err = parse_message("not json").unwrap_err();
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["error"]["code"], -32700);
    assert!(json["id"].is_null());

    let mut server = empty_server();
    server.dispatch(request(1, "initialize", Some(init_params("2024-11-05")))).await.unwrap();

    let parsed = parse_message(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).unwrap();
    let IncomingMessage::Request(req) = parsed else {
        panic!("expected a request");
    };
    let resp = server.dispatch(req).await.unwrap();
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["result"]["tools"], json!([]));
}

/// Universal invariant: a schema-validation failure never invokes the
/// handler, and the permit it would have consumed is not held afterward.
#[tokio::test]
async fn invalid_arguments_never_reach_the_handler() {
    let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let invoked_clone = Arc::clone(&invoked);

    let registry = Arc::new(RwLock::new(ToolRegistry::new()));
    registry
        .write()
        .await
        .register(
            "needs_path",
            "needs a path argument",
            Schema::new(vec![Field::string("path", "target path")]),
            Arc::new(move |_args| {
                let invoked = Arc::clone(&invoked_clone);
                Box::pin(async move {
                    invoked.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok(json!({}))
                })
            }),
        )
        .unwrap();

    let mut server = server_with_registry(registry, 1, 5000);
    server.dispatch(request(1, "initialize", Some(init_params("2024-11-05")))).await.unwrap();

    let resp = server
        .dispatch(request(2, "tools/call", Some(json!({"name": "needs_path", "arguments": {}}))))
        .await
        .unwrap();
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["result"]["isError"], true);
    let text = json["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("INVALID_ARGUMENTS"));
    assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));

    // The permit released after the validation failure is available again.
    let resp = server
        .dispatch(request(3, "tools/call", Some(json!({"name": "needs_path", "arguments": {"path": "x"}}))))
        .await
        .unwrap();
    let json = serde_json::to_value(&resp).unwrap();
    assert!(json["result"]["isError"].is_null());
    let text = json["result"]["content"][0]["text"].as_str().unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(text).unwrap(), json!({}));
    assert!(invoked.load(std::sync::atomic::Ordering::SeqCst));
}

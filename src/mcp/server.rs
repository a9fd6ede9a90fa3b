//! MCP server lifecycle.
//!
//! Drives the MCP handshake and method dispatch across four session
//! states:
//!
//! ```text
//! Uninitialized ──initialize(ok)──▶ Initialized ──close──▶ Draining ──▶ Closed
//!       │                                                                  ▲
//!       └──────────────────────────close──────────────────────────────────┘
//! ```
//!
//! Transitions are monotonic; once `Closed`, no further transitions occur.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::executor::ToolExecutor;
use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, ToolCallResult, MCP_PROTOCOL_VERSION, SERVER_NAME,
    SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::transport::StdioTransport;
use crate::registry::ToolRegistry;

/// Session state in the MCP lifecycle. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for `initialize`.
    Uninitialized,
    /// Handshake complete; serving `tools/list` and `tools/call`.
    Initialized,
    /// Shutting down: new `tools/call` requests are rejected, in-flight
    /// calls are being cancelled.
    Draining,
    /// Fully shut down. No further transitions.
    Closed,
}

/// Client information captured once at handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the `initialize` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by the client.
    pub protocol_version: String,
    /// Client capabilities (opaque to this server).
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    pub client_info: ClientInfo,
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// The MCP server: owns the session state, transport, registry and
/// executor, and drives the request/response loop.
pub struct McpServer {
    state: SessionState,
    transport: StdioTransport,
    registry: Arc<RwLock<ToolRegistry>>,
    executor: Arc<ToolExecutor>,
    client_info: Option<ClientInfo>,
    protocol_version: Option<String>,
    shutdown: CancellationToken,
    in_flight: Arc<AtomicU64>,
}

impl McpServer {
    /// Builds a server wired to the given registry and executor, ready to
    /// run once [`Self::run`] is called.
    #[must_use]
    pub fn new(registry: Arc<RwLock<ToolRegistry>>, executor: Arc<ToolExecutor>, shutdown: CancellationToken) -> Self {
        Self {
            state: SessionState::Uninitialized,
            transport: StdioTransport::new(),
            registry,
            executor,
            client_info: None,
            protocol_version: None,
            shutdown,
            in_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the main loop until transport EOF or an external shutdown
    /// signal, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns an error if starting or reading the transport fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        self.transport.start()?;

        loop {
            if self.shutdown.is_cancelled() {
                self.begin_drain().await;
                break;
            }

            let line = tokio::select! {
                line = self.transport.read_line() => line?,
                () = self.shutdown.cancelled() => {
                    self.begin_drain().await;
                    break;
                }
            };

            let Some(line) = line else {
                self.begin_drain().await;
                break;
            };

            self.handle_line(&line).await?;

            if self.state == SessionState::Closed {
                break;
            }
        }

        self.transport.close().await
    }

    async fn begin_drain(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        info!("server draining, cancelling in-flight calls");
        self.state = SessionState::Draining;
        self.shutdown.cancel();

        for _ in 0..50 {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        self.state = SessionState::Closed;
    }

    async fn handle_line(&mut self, line: &str) -> std::io::Result<()> {
        match parse_message(line) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) => {
                warn!(line, "invalid frame received");
                self.transport.write_error(&error).await
            }
        }
    }

    async fn handle_message(&mut self, msg: IncomingMessage) -> std::io::Result<()> {
        match msg {
            IncomingMessage::Request(req) => self.handle_request(req).await,
            IncomingMessage::Notification(notif) => {
                self.handle_notification(&notif);
                Ok(())
            }
        }
    }

    async fn handle_request(&mut self, req: JsonRpcRequest) -> std::io::Result<()> {
        let response = self.dispatch(req).await;

        match response {
            Ok(resp) => self.transport.write_response(&resp).await,
            Err(error) => self.transport.write_error(&error).await,
        }
    }

    /// Dispatches one already-parsed request to the matching handler and
    /// returns its reply, without touching the transport.
    ///
    /// This is the seam used to drive the server from something other than
    /// its own stdio loop (tests, embedding): `run` calls it internally
    /// per request; callers that already have a parsed request and want
    /// the response value rather than a framed write can call it directly.
    pub async fn dispatch(&mut self, req: JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let id = req.id.clone();

        match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req).await,
            "ping" => Ok(JsonRpcResponse::success(id.clone(), json!({}))),
            other => Err(JsonRpcError::method_not_found(id, other)),
        }
    }

    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method != "notifications/initialized" {
            // All other notifications (including unrecognised ones) are
            // ignored, per the JSON-RPC notification contract.
        }
    }

    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != SessionState::Uninitialized {
            return Err(JsonRpcError::invalid_request(Some(req.id.clone())));
        }

        let params: InitializeParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(req.id.clone(), format!("invalid initialize params: {e}")))?
            .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), "missing initialize params"))?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            let err = crate::error::ServerError::UnsupportedProtocolVersion {
                requested: params.protocol_version.clone(),
            };
            return Err(JsonRpcError::from_server_error(Some(req.id.clone()), &err));
        }

        self.client_info = Some(params.client_info);
        self.protocol_version = Some(params.protocol_version.clone());
        self.state = SessionState::Initialized;

        let result = json!({
            "protocolVersion": params.protocol_version,
            "capabilities": { "tools": {}, "logging": {} },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_initialized(&req.id)?;

        let registry = self
            .registry
            .try_read()
            .map_err(|_| JsonRpcError::internal_error(req.id.clone(), "registry temporarily unavailable"))?;
        let tools = registry.list();

        Ok(JsonRpcResponse::success(req.id.clone(), json!({ "tools": tools })))
    }

    async fn handle_tools_call(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_initialized(&req.id)?;

        if self.state == SessionState::Draining {
            let err = crate::error::ServerError::ServerShuttingDown;
            return Err(JsonRpcError::from_server_error(Some(req.id.clone()), &err));
        }

        let params: ToolCallParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(req.id.clone(), format!("invalid tool call params: {e}")))?
            .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), "missing tool call params"))?;

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.executor.execute(&params.name, params.arguments).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(content) => {
                let text = serde_json::to_string(&content).unwrap_or_else(|_| content.to_string());
                let result = serde_json::to_value(ToolCallResult::text(text))
                    .expect("ToolCallResult always serializes");
                Ok(JsonRpcResponse::success(req.id.clone(), result))
            }
            // Lookup-time failures predate dispatch to a tool: these stay
            // genuine JSON-RPC errors, per the handshake/list-before-init
            // treatment of other protocol-level rejections.
            Err(err @ (ServerError::ToolNotFound { .. } | ServerError::ToolDisabled { .. })) => {
                Err(JsonRpcError::from_server_error(Some(req.id.clone()), &err))
            }
            // Everything else happens once the tool is already dispatched
            // (admission, validation, the handler itself): reported as
            // isError content, not a protocol error.
            Err(err) => {
                let result = serde_json::to_value(ToolCallResult::from_server_error(&err))
                    .expect("ToolCallResult always serializes");
                Ok(JsonRpcResponse::success(req.id.clone(), result))
            }
        }
    }

    fn require_initialized(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state == SessionState::Uninitialized {
            let err = crate::error::ServerError::NotInitialized;
            return Err(JsonRpcError::from_server_error(Some(id.clone()), &err));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use std::sync::Arc as StdArc;

    fn make_server() -> McpServer {
        let registry = Arc::new(RwLock::new(ToolRegistry::new()));
        let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), 10, 5000));
        McpServer::new(registry, executor, CancellationToken::new())
    }

    #[test]
    fn initial_state_is_uninitialized() {
        let server = make_server();
        assert_eq!(server.state(), SessionState::Uninitialized);
    }

    #[test]
    fn require_initialized_fails_before_handshake() {
        let server = make_server();
        let err = server.require_initialized(&RequestId::Number(1)).unwrap_err();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["code"], -32600);
    }

    #[test]
    fn handle_initialize_rejects_unsupported_version() {
        let mut server = make_server();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(1),
            method: "initialize".to_string(),
            params: Some(json!({
                "protocolVersion": "1999-01-01",
                "capabilities": {},
                "clientInfo": {"name": "t", "version": "0"}
            })),
        };
        let err = server.handle_initialize(&req).unwrap_err();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["code"], -32600);
        assert_eq!(server.state(), SessionState::Uninitialized);
    }

    #[test]
    fn handle_initialize_succeeds_and_transitions() {
        let mut server = make_server();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(1),
            method: "initialize".to_string(),
            params: Some(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "t", "version": "0"}
            })),
        };
        server.handle_initialize(&req).unwrap();
        assert_eq!(server.state(), SessionState::Initialized);
    }

    #[tokio::test]
    async fn tools_call_before_init_fails_not_initialized() {
        let mut server = make_server();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(2),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "ping", "arguments": {}})),
        };
        let err = server.handle_tools_call(&req).await.unwrap_err();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn tools_call_delegates_to_executor() {
        let mut server = make_server();
        server
            .registry
            .write()
            .await
            .register(
                "echo",
                "echoes",
                Schema::default(),
                StdArc::new(|args| Box::pin(async move { Ok(args) })),
            )
            .unwrap();
        server.state = SessionState::Initialized;

        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(3),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "echo", "arguments": {"x": 1}})),
        };
        let resp = server.handle_tools_call(&req).await.unwrap();
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["result"]["isError"].is_null());
        let text = json["result"]["content"][0]["text"].as_str().unwrap();
        assert_eq!(serde_json::from_str::<Value>(text).unwrap(), json!({"x": 1}));
    }

    #[tokio::test]
    async fn tools_call_reports_tool_error_as_content_not_protocol_error() {
        let mut server = make_server();
        server
            .registry
            .write()
            .await
            .register(
                "fail",
                "always fails",
                Schema::default(),
                StdArc::new(|_args| {
                    Box::pin(async move {
                        Err(ServerError::PathTraversal {
                            attempted_path: "../etc/passwd".to_string(),
                        })
                    })
                }),
            )
            .unwrap();
        server.state = SessionState::Initialized;

        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(4),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "fail", "arguments": {}})),
        };
        let resp = server.handle_tools_call(&req).await.unwrap();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["result"]["isError"], true);
        let text = json["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("PATH_TRAVERSAL"));
        assert!(text.contains("../etc/passwd"));
    }

    #[tokio::test]
    async fn tools_call_unknown_tool_stays_a_protocol_error() {
        let mut server = make_server();
        server.state = SessionState::Initialized;

        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(5),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "missing", "arguments": {}})),
        };
        let err = server.handle_tools_call(&req).await.unwrap_err();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["data"]["errorCode"], "TOOL_NOT_FOUND");
    }
}

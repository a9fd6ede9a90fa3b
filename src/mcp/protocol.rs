//! JSON-RPC 2.0 message types and parsing.
//!
//! This module is the wire-level layer beneath the protocol state machine
//! in `mcp::server`: it knows nothing about sessions or tools, only about
//! turning a line of text into a typed request/notification, and turning a
//! domain error into a correctly shaped JSON-RPC error object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServerError;

/// The MCP protocol version this server implements.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Protocol versions this server will accept during `initialize`, in
/// addition to [`MCP_PROTOCOL_VERSION`]. Selection is exact-match against
/// this closed, ordered set.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[MCP_PROTOCOL_VERSION];

/// The name advertised in `serverInfo`.
pub const SERVER_NAME: &str = "cursor-workspace-mcp";

/// A JSON-RPC request id. May be a number, a string, or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
    /// Null id — valid per the JSON-RPC spec, though discouraged by it.
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A successfully-parsed JSON-RPC request (carries an id and expects a reply).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be exactly `"2.0"`.
    pub jsonrpc: String,
    /// Request id, echoed verbatim in the reply.
    pub id: RequestId,
    /// The method name.
    pub method: String,
    /// Method parameters, if any.
    #[serde(default)]
    pub params: Option<Value>,
}

/// A JSON-RPC notification (no id, no reply expected).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Must be exactly `"2.0"`.
    pub jsonrpc: String,
    /// The method name.
    pub method: String,
    /// Method parameters, if any.
    #[serde(default)]
    pub params: Option<Value>,
}

/// Either shape a parsed line on stdin can take.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A request expecting a reply.
    Request(JsonRpcRequest),
    /// A notification that must not be replied to.
    Notification(JsonRpcNotification),
}

/// A successful JSON-RPC response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: RequestId,
    result: Value,
}

impl JsonRpcResponse {
    /// Builds a success response echoing `id`.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// A single content item in a `tools/call` result.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Plain text content.
    Text {
        /// The text payload.
        text: String,
    },
}

/// The wire shape of every `tools/call` reply. Per MCP, tool-level
/// failures are reported here as `isError: true` content, not as
/// JSON-RPC protocol errors — those are reserved for failures that
/// precede dispatch to a tool (unknown method, bad handshake, tool not
/// found/disabled).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// The result content, always one item in this server.
    pub content: Vec<ToolContent>,
    /// Set when the tool call failed; omitted entirely on success.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Builds a successful result carrying `text`.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Builds a failed result carrying `text`.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Builds a failed result from a domain [`ServerError`] raised during
    /// tool dispatch, rendering the stable error code, message and any
    /// structured context as a single JSON text payload.
    #[must_use]
    pub fn from_server_error(err: &ServerError) -> Self {
        let payload = serde_json::json!({
            "errorCode": err.kind(),
            "message": err.to_string(),
            "context": error_context(err),
        });
        Self::error(payload.to_string())
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received.
    ParseError,
    /// The JSON sent is not a valid request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric wire code for this error class.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }
}

/// The `data` payload carried by every JSON-RPC error, per the error
/// taxonomy's structured-payload requirement.
#[derive(Debug, Clone)]
pub struct JsonRpcErrorData {
    code: ErrorCode,
    message: String,
    /// Machine-readable domain error kind, when one applies.
    error_code: Option<&'static str>,
    /// Free-form context: attempted path, field name, received value, etc.
    context: Option<Value>,
}

// Manual Serialize for ErrorCode since it only needs to appear as the
// sibling numeric `code` field on JsonRpcError, not inside `data`.
impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.code())
    }
}

impl JsonRpcErrorData {
    /// Builds error data carrying only a human-readable message, no
    /// domain `errorCode`. Used for transport/protocol-layer failures that
    /// predate any `ServerError`.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            error_code: None,
            context: None,
        }
    }

    /// Builds error data from a domain [`ServerError`], mapping it to the
    /// deterministic JSON-RPC code per the taxonomy.
    #[must_use]
    pub fn from_server_error(err: &ServerError) -> Self {
        let code = match err {
            ServerError::InvalidArguments { .. } => ErrorCode::InvalidParams,
            ServerError::PathTraversal { .. }
            | ServerError::OutsideRoot { .. }
            | ServerError::BlockedPattern { .. }
            | ServerError::NotFound { .. }
            | ServerError::ToolNotFound { .. }
            | ServerError::ToolDisabled { .. }
            | ServerError::UnsupportedProtocolVersion { .. }
            | ServerError::NotInitialized => ErrorCode::InvalidRequest,
            ServerError::Timeout { .. }
            | ServerError::ConcurrencyLimitExceeded { .. }
            | ServerError::PermissionDenied { .. }
            | ServerError::ServerShuttingDown
            | ServerError::Internal { .. } => ErrorCode::InternalError,
            ServerError::InvalidFrame { .. } => ErrorCode::ParseError,
        };

        let context = error_context(err);

        Self {
            code,
            message: err.to_string(),
            error_code: Some(err.kind()),
            context,
        }
    }
}

/// Extracts structured context fields for an error's `data.context` object.
fn error_context(err: &ServerError) -> Option<Value> {
    match err {
        ServerError::PathTraversal { attempted_path }
        | ServerError::OutsideRoot { attempted_path }
        | ServerError::BlockedPattern { attempted_path } => {
            Some(serde_json::json!({ "attemptedPath": attempted_path }))
        }
        ServerError::NotFound { path } | ServerError::PermissionDenied { path } => {
            Some(serde_json::json!({ "path": path.display().to_string() }))
        }
        ServerError::Timeout { tool, timeout_ms } => {
            Some(serde_json::json!({ "tool": tool, "timeoutMs": timeout_ms }))
        }
        ServerError::ConcurrencyLimitExceeded { limit } => {
            Some(serde_json::json!({ "limit": limit }))
        }
        ServerError::ToolNotFound { name } | ServerError::ToolDisabled { name } => {
            Some(serde_json::json!({ "tool": name }))
        }
        ServerError::UnsupportedProtocolVersion { requested } => {
            Some(serde_json::json!({ "requested": requested, "supported": SUPPORTED_PROTOCOL_VERSIONS }))
        }
        ServerError::InvalidArguments { tool, .. } => Some(serde_json::json!({ "tool": tool })),
        _ => None,
    }
}

/// A JSON-RPC error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    jsonrpc: &'static str,
    id: Option<RequestId>,
    error: JsonRpcErrorInner,
}

#[derive(Debug, Clone, Serialize)]
struct JsonRpcErrorInner {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<JsonRpcErrorDataPayload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonRpcErrorDataPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack_trace: Option<String>,
}

impl JsonRpcError {
    /// Builds an error response from an explicit id (or none) and payload.
    #[must_use]
    pub fn new(id: Option<RequestId>, data: JsonRpcErrorData) -> Self {
        let stack_trace = if cfg!(debug_assertions) {
            Some(std::backtrace::Backtrace::force_capture().to_string())
        } else {
            None
        };

        Self {
            jsonrpc: "2.0",
            id,
            error: JsonRpcErrorInner {
                code: data.code.code(),
                message: data.message,
                data: Some(JsonRpcErrorDataPayload {
                    error_code: data.error_code,
                    context: data.context,
                    stack_trace,
                }),
            },
        }
    }

    /// `-32700`: the line could not be parsed as JSON at all. No id is
    /// available in this case.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(
            None,
            JsonRpcErrorData::with_message(ErrorCode::ParseError, "Parse error"),
        )
    }

    /// `-32600`: the JSON parsed but is not a valid JSON-RPC request
    /// (missing/wrong `jsonrpc` field, wrong shape, etc).
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Invalid Request"),
        )
    }

    /// `-32601`: the method name is not recognised.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// `-32602`: the method's params failed validation or parsing.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// `-32603`: any other failure while handling a well-formed request.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }

    /// Builds an error response from a domain [`ServerError`], mapping it
    /// deterministically.
    #[must_use]
    pub fn from_server_error(id: Option<RequestId>, err: &ServerError) -> Self {
        Self::new(id, JsonRpcErrorData::from_server_error(err))
    }
}

/// Parses one line of input into a request or notification.
///
/// Returns `Err` with a fully-formed [`JsonRpcError`] — either a parse
/// error (no id could be recovered) or an invalid-request error (the id
/// was recoverable but the envelope failed the `jsonrpc: "2.0"` check).
///
/// # Errors
///
/// See above.
pub fn parse_message(line: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(line).map_err(|_| JsonRpcError::parse_error())?;

    let Some(obj) = value.as_object() else {
        return Err(JsonRpcError::invalid_request(None));
    };

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some("2.0") => {}
        _ => {
            let id = obj.get("id").and_then(|v| serde_json::from_value(v.clone()).ok());
            return Err(JsonRpcError::invalid_request(id));
        }
    }

    if obj.contains_key("id") {
        let request: JsonRpcRequest = serde_json::from_value(value).map_err(|_| {
            let id = obj
                .get("id")
                .and_then(|v| serde_json::from_value(v.clone()).ok());
            JsonRpcError::invalid_request(id)
        })?;
        Ok(IncomingMessage::Request(request))
    } else {
        let notification: JsonRpcNotification =
            serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;
        Ok(IncomingMessage::Notification(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_request() {
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":null}"#;
        match parse_message(line).unwrap() {
            IncomingMessage::Request(req) => {
                assert_eq!(req.id, RequestId::Number(1));
                assert_eq!(req.method, "ping");
            }
            IncomingMessage::Notification(_) => panic!("expected request"),
        }
    }

    #[test]
    fn parses_notification_without_id() {
        let line = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        match parse_message(line).unwrap() {
            IncomingMessage::Notification(n) => {
                assert_eq!(n.method, "notifications/initialized");
            }
            IncomingMessage::Request(_) => panic!("expected notification"),
        }
    }

    #[test]
    fn parses_string_and_null_ids() {
        let line = r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#;
        match parse_message(line).unwrap() {
            IncomingMessage::Request(req) => assert_eq!(req.id, RequestId::String("abc".into())),
            IncomingMessage::Notification(_) => panic!("expected request"),
        }

        let line = r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#;
        match parse_message(line).unwrap() {
            IncomingMessage::Request(req) => assert_eq!(req.id, RequestId::Null),
            IncomingMessage::Notification(_) => panic!("expected request"),
        }
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = parse_message("not json").unwrap_err();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["code"], -32700);
    }

    #[test]
    fn wrong_jsonrpc_version_is_invalid_request() {
        let line = r#"{"jsonrpc":"1.0","id":5,"method":"ping"}"#;
        let err = parse_message(line).unwrap_err();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["code"], -32600);
        assert_eq!(json["id"], 5);
    }

    #[test]
    fn missing_jsonrpc_field_is_invalid_request() {
        let line = r#"{"id":5,"method":"ping"}"#;
        let err = parse_message(line).unwrap_err();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["code"], -32600);
    }

    #[test]
    fn server_error_maps_to_expected_codes() {
        let err = ServerError::NotInitialized;
        let resp = JsonRpcError::from_server_error(Some(RequestId::Number(1)), &err);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], -32600);
        assert_eq!(json["error"]["data"]["errorCode"], "NOT_INITIALIZED");

        let err = ServerError::ConcurrencyLimitExceeded { limit: 3 };
        let resp = JsonRpcError::from_server_error(Some(RequestId::Number(2)), &err);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], -32603);

        let err = ServerError::InvalidFrame {
            message: "bad".into(),
        };
        let resp = JsonRpcError::from_server_error(None, &err);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], -32700);
    }
}

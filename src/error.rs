//! Error types for cursor-workspace-mcp.
//!
//! Messages are crafted to stay useful for debugging without ever
//! embedding file contents read from the sandboxed workspace.

use std::path::PathBuf;

use thiserror::Error;

/// The closed set of domain errors the server can raise while handling a
/// request. Every variant maps deterministically to a JSON-RPC error code;
/// see [`crate::mcp::protocol::JsonRpcErrorData::from_server_error`].
#[derive(Error, Debug)]
pub enum ServerError {
    /// Tool argument failed schema validation.
    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidArguments {
        /// Name of the tool whose arguments failed validation.
        tool: String,
        /// Description of the validation failure.
        message: String,
    },

    /// A relative path input resolved outside the sandbox root.
    #[error("path traversal: '{attempted_path}' resolves outside the workspace root")]
    PathTraversal {
        /// The path as supplied by the caller.
        attempted_path: String,
    },

    /// An absolute path input fell outside the sandbox root.
    #[error("path outside root: '{attempted_path}' is not within the workspace root")]
    OutsideRoot {
        /// The path as supplied by the caller.
        attempted_path: String,
    },

    /// A path matched a configured block-pattern.
    #[error("blocked path: '{attempted_path}' matches a blocked pattern")]
    BlockedPattern {
        /// The path as supplied by the caller.
        attempted_path: String,
    },

    /// The requested file or directory does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The path that could not be found.
        path: PathBuf,
    },

    /// The OS denied access to the requested path.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that access was denied for.
        path: PathBuf,
    },

    /// The per-call deadline elapsed before the handler completed.
    #[error("tool '{tool}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Name of the tool that timed out.
        tool: String,
        /// The configured timeout, in milliseconds.
        timeout_ms: u64,
    },

    /// No concurrency permit was immediately available.
    #[error("concurrency limit of {limit} requests exceeded")]
    ConcurrencyLimitExceeded {
        /// The configured `maxConcurrentRequests`.
        limit: usize,
    },

    /// The named tool is not registered.
    #[error("unknown tool: {name}")]
    ToolNotFound {
        /// The requested tool name.
        name: String,
    },

    /// The named tool is registered but currently disabled.
    #[error("tool is disabled: {name}")]
    ToolDisabled {
        /// The requested tool name.
        name: String,
    },

    /// The client requested a protocol version the server does not support.
    #[error("unsupported protocol version: {requested}")]
    UnsupportedProtocolVersion {
        /// The version the client asked for.
        requested: String,
    },

    /// A method was called before the `initialize` handshake completed.
    #[error("server not initialised")]
    NotInitialized,

    /// A request arrived after the server began draining.
    #[error("server is shutting down")]
    ServerShuttingDown,

    /// A line on stdin did not parse as a valid JSON-RPC message.
    #[error("invalid frame: {message}")]
    InvalidFrame {
        /// Description of the parse failure.
        message: String,
    },

    /// Any failure that does not fit the closed set above.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Returns the stable, machine-readable name of this error's kind. This
    /// is the string placed in the JSON-RPC error payload's `data.errorCode`
    /// field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            Self::PathTraversal { .. } => "PATH_TRAVERSAL",
            Self::OutsideRoot { .. } => "OUTSIDE_ROOT",
            Self::BlockedPattern { .. } => "BLOCKED_PATTERN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::ConcurrencyLimitExceeded { .. } => "CONCURRENCY_LIMIT_EXCEEDED",
            Self::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            Self::ToolDisabled { .. } => "TOOL_DISABLED",
            Self::UnsupportedProtocolVersion { .. } => "UNSUPPORTED_PROTOCOL_VERSION",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::ServerShuttingDown => "SERVER_SHUTTING_DOWN",
            Self::InvalidFrame { .. } => "INVALID_FRAME",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Creates a [`ServerError::Internal`] from any error implementing
    /// `std::error::Error`.
    pub fn internal(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file could not be written (used when generating defaults).
    #[error("failed to write configuration file: {path}")]
    WriteError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },

    /// The default configuration directory could not be determined.
    #[error("could not determine a default configuration directory")]
    NoDefaultDirectory,
}

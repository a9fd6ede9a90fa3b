//! Configuration structures for deserialisation and validation.
//!
//! These map directly onto the JSON configuration file format described
//! at `.cursorcli-mcp/config.json` relative to the workspace.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server identity and concurrency/timeout limits.
    #[serde(default)]
    pub server: ServerConfig,

    /// Tool allowlist and file-operation limits.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Security switches.
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            tools: ToolsConfig::default(),
            logging: LoggingConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    /// Validates the configuration against the bounds described by the
    /// configuration file's schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any field is out of its
    /// allowed range or an enumerated value is not recognised.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.tools.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Server identity and request-handling limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ServerConfig {
    /// The server's advertised name. Must be non-empty.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Semver-formatted version string.
    #[serde(default = "default_server_version")]
    pub version: String,

    /// Maximum concurrent tool calls in flight. Range 1–100.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: u32,

    /// Per-call deadline in milliseconds. Range 1000–60000.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server.name must not be empty".to_string(),
            });
        }
        if !is_semver(&self.version) {
            return Err(ConfigError::ValidationError {
                message: format!("server.version '{}' is not a valid semver string", self.version),
            });
        }
        if !(1..=100).contains(&self.max_concurrent_requests) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "server.maxConcurrentRequests must be in 1..=100, got {}",
                    self.max_concurrent_requests
                ),
            });
        }
        if !(1000..=60000).contains(&self.request_timeout_ms) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "server.requestTimeoutMs must be in 1000..=60000, got {}",
                    self.request_timeout_ms
                ),
            });
        }
        Ok(())
    }
}

fn is_semver(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn default_server_name() -> String {
    "cursor-workspace-mcp".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

const fn default_max_concurrent_requests() -> u32 {
    10
}

const fn default_request_timeout_ms() -> u64 {
    5000
}

/// Tool allowlist and file-operation limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToolsConfig {
    /// Names of tools permitted to register. Must have at least one entry.
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,

    /// File operation limits.
    #[serde(default)]
    pub file_operations: FileOperationsConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allowed_tools: default_allowed_tools(),
            file_operations: FileOperationsConfig::default(),
        }
    }
}

impl ToolsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_tools.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "tools.allowedTools must have at least one entry".to_string(),
            });
        }
        self.file_operations.validate()
    }
}

fn default_allowed_tools() -> Vec<String> {
    vec![
        "read_file".to_string(),
        "write_file".to_string(),
        "list_directory".to_string(),
        "project_info".to_string(),
        "search_files".to_string(),
        "workspace_tree".to_string(),
        "editor_status".to_string(),
        "current_model".to_string(),
        "record_token_usage".to_string(),
        "usage_stats".to_string(),
    ]
}

/// File operation size caps and path rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileOperationsConfig {
    /// Maximum file size served or written, in bytes. Range 1 KiB – 100 MiB.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Additional directories (besides the workspace root) that are
    /// accessible. Relative entries are resolved against the workspace root.
    #[serde(default)]
    pub allowed_directories: Vec<String>,

    /// Glob patterns that are always rejected, regardless of root scoping.
    #[serde(default = "default_blocked_patterns")]
    pub blocked_patterns: Vec<String>,
}

impl Default for FileOperationsConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_directories: Vec::new(),
            blocked_patterns: default_blocked_patterns(),
        }
    }
}

impl FileOperationsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        const MIN: u64 = 1024;
        const MAX: u64 = 100 * 1024 * 1024;
        if !(MIN..=MAX).contains(&self.max_file_size) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "tools.fileOperations.maxFileSize must be in {MIN}..={MAX}, got {}",
                    self.max_file_size
                ),
            });
        }
        Ok(())
    }
}

const fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_blocked_patterns() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/*.env".to_string(),
    ]
}

/// Logging level, in increasing severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose.
    Debug,
    /// Default.
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Converts to the corresponding `tracing` level.
    #[must_use]
    pub const fn as_tracing_level(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// A logging sink. The `cursor-output-panel` variant has no local file
/// representation: it is drained by an attached `EditorPort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogOutput {
    /// Human-readable lines on stderr.
    Console,
    /// A rotating file on disk.
    File,
    /// The IDE's own output panel, forwarded via `EditorPort`.
    CursorOutputPanel,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfig {
    /// Minimum level emitted.
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Active sinks. Must be non-empty.
    #[serde(default = "default_log_outputs")]
    pub outputs: Vec<LogOutput>,

    /// Path to the rotating log file, required when `outputs` includes `file`.
    #[serde(default)]
    pub log_file: Option<std::path::PathBuf>,

    /// Maximum size of a single log file, in MiB. Range 1–100.
    #[serde(default = "default_max_log_size")]
    pub max_log_size: u32,

    /// Number of rotated log files retained. Range 1–30.
    #[serde(default = "default_rotation_count")]
    pub rotation_count: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            outputs: default_log_outputs(),
            log_file: None,
            max_log_size: default_max_log_size(),
            rotation_count: default_rotation_count(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.outputs.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "logging.outputs must have at least one entry".to_string(),
            });
        }
        if self.outputs.contains(&LogOutput::File) && self.log_file.is_none() {
            return Err(ConfigError::ValidationError {
                message: "logging.logFile is required when outputs includes 'file'".to_string(),
            });
        }
        if !(1..=100).contains(&self.max_log_size) {
            return Err(ConfigError::ValidationError {
                message: format!("logging.maxLogSize must be in 1..=100, got {}", self.max_log_size),
            });
        }
        if !(1..=30).contains(&self.rotation_count) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "logging.rotationCount must be in 1..=30, got {}",
                    self.rotation_count
                ),
            });
        }
        Ok(())
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_outputs() -> Vec<LogOutput> {
    vec![LogOutput::Console]
}

const fn default_max_log_size() -> u32 {
    10
}

const fn default_rotation_count() -> u32 {
    5
}

/// Security switches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecurityConfig {
    /// Whether every path must resolve within the workspace root.
    #[serde(default = "default_enforce_project_root")]
    pub enforce_project_root: bool,

    /// Whether destructive operations (overwrite, delete) are permitted.
    #[serde(default)]
    pub allow_destructive_operations: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enforce_project_root: default_enforce_project_root(),
            allow_destructive_operations: false,
        }
    }
}

const fn default_enforce_project_root() -> bool {
    true
}

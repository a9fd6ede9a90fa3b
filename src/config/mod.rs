//! Configuration file loading, validation, env overlay, and hot-reload.
//!
//! # Configuration File Location
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path specified via `--config` CLI flag.
//! 2. `<workspace-root>/.cursorcli-mcp/config.json`.
//!
//! If absent, a default configuration is generated and written to disk.
//!
//! # Hot Reload
//!
//! [`ConfigWatcher`] watches the file for changes using `notify` and
//! applies a hand-rolled 200 ms debounce before reloading, preferring
//! explicit, hand-rolled timing logic over a general-purpose debouncer
//! crate.

mod settings;

pub use settings::{
    Config, FileOperationsConfig, LogLevel, LogOutput, LoggingConfig, SecurityConfig, ServerConfig,
    ToolsConfig,
};

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::error::ConfigError;

/// An immutable configuration record. Readers clone the `Arc` and observe
/// a single, atomically-assigned snapshot for the duration of one call.
pub type ConfigSnapshot = Arc<Config>;

/// Returns the configuration directory for a workspace root.
#[must_use]
pub fn config_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".cursorcli-mcp")
}

/// Returns the configuration file path for a workspace root.
#[must_use]
pub fn config_path(workspace_root: &Path) -> PathBuf {
    config_dir(workspace_root).join("config.json")
}

/// Loads and validates the configuration.
///
/// If `path` does not exist, a default configuration is written there
/// (creating parent directories as needed) and returned.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed, if
/// validation fails, or if the default cannot be written when absent.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        let default = Config::default();
        write_default(path, &default)?;
        return Ok(default);
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    config.validate()?;
    apply_env_overlay(&mut config);

    Ok(config)
}

fn write_default(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let pretty = serde_json::to_string_pretty(config).unwrap_or_default();
    std::fs::write(path, pretty).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Overlays a fixed set of environment variables onto an already-validated
/// config. Malformed or out-of-range values are silently ignored, falling
/// back to the file's value.
fn apply_env_overlay(config: &mut Config) {
    if let Ok(raw) = std::env::var("MCP_LOG_LEVEL") {
        if let Ok(level) = serde_json::from_value::<LogLevel>(serde_json::Value::String(raw.to_lowercase())) {
            config.logging.level = level;
        }
    }

    if let Ok(raw) = std::env::var("MCP_MAX_CONCURRENT_REQUESTS") {
        if let Ok(value) = raw.parse::<u32>() {
            if (1..=100).contains(&value) {
                config.server.max_concurrent_requests = value;
            }
        }
    }

    if let Ok(raw) = std::env::var("MCP_REQUEST_TIMEOUT_MS") {
        if let Ok(value) = raw.parse::<u64>() {
            if (1000..=60000).contains(&value) {
                config.server.request_timeout_ms = value;
            }
        }
    }

    if let Ok(raw) = std::env::var("MCP_ENFORCE_PROJECT_ROOT") {
        if let Ok(value) = parse_bool(&raw) {
            config.security.enforce_project_root = value;
        }
    }

    if let Ok(raw) = std::env::var("MCP_ALLOW_DESTRUCTIVE_OPERATIONS") {
        if let Ok(value) = parse_bool(&raw) {
            config.security.allow_destructive_operations = value;
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool, ()> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(()),
    }
}

/// A callback invoked with the freshly reloaded config snapshot, or with
/// the default snapshot when reload validation fails.
pub type ReloadCallback = Box<dyn Fn(ConfigSnapshot) + Send + Sync>;

/// Owns the current [`ConfigSnapshot`] and drives hot-reload.
///
/// `load()` calls are single-flighted: concurrent callers share one
/// in-flight file read via an internal async mutex.
pub struct ConfigManager {
    path: PathBuf,
    snapshot: RwLock<ConfigSnapshot>,
    load_lock: AsyncMutex<()>,
    callbacks: RwLock<Vec<ReloadCallback>>,
}

impl ConfigManager {
    /// Loads the initial configuration from `path` and builds a manager
    /// around it.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`load`].
    pub fn new(path: PathBuf) -> Result<Self, ConfigError> {
        let config = load(&path)?;
        Ok(Self {
            path,
            snapshot: RwLock::new(Arc::new(config)),
            load_lock: AsyncMutex::new(()),
            callbacks: RwLock::new(Vec::new()),
        })
    }

    /// Returns the current snapshot. Cheap: clones an `Arc`.
    #[must_use]
    pub fn current(&self) -> ConfigSnapshot {
        Arc::clone(&self.snapshot.read().expect("config snapshot lock poisoned"))
    }

    /// Registers a callback invoked after every reload (success or
    /// fallback-to-default on validation failure).
    pub fn on_reload(&self, callback: ReloadCallback) {
        self.callbacks
            .write()
            .expect("config callback lock poisoned")
            .push(callback);
    }

    /// Reloads the configuration from disk, single-flighted across
    /// concurrent callers. On validation failure, falls back to defaults
    /// and still invokes registered callbacks with the fallback.
    ///
    /// # Errors
    ///
    /// This method never returns an error to the caller: failures fall back
    /// to defaults per the hot-reload contract. The `Result` return exists
    /// to surface IO errors that prevented even generating the default.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        let _guard = self.load_lock.lock().await;

        let new_config = match load(&self.path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(error = %err, "config reload failed validation, falling back to defaults");
                Config::default()
            }
        };

        let snapshot: ConfigSnapshot = Arc::new(new_config);
        {
            let mut guard = self.snapshot.write().expect("config snapshot lock poisoned");
            *guard = Arc::clone(&snapshot);
        }

        for callback in self.callbacks.read().expect("config callback lock poisoned").iter() {
            callback(Arc::clone(&snapshot));
        }

        Ok(())
    }
}

/// Debounce window applied to raw filesystem events before triggering a
/// reload, matching the shape of a debounced watcher without depending on
/// a debouncer crate.
const DEBOUNCE: Duration = Duration::from_millis(200);

/// Watches the configuration file for changes and drives [`ConfigManager::reload`]
/// after a 200 ms debounce window.
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl ConfigWatcher {
    /// Starts watching `manager`'s configuration file. The returned handle
    /// must be kept alive for the life of the watch; dropping it stops
    /// watching.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying OS file watcher cannot be
    /// installed.
    pub fn start(manager: Arc<ConfigManager>) -> notify::Result<Self> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Event>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })?;

        watcher.watch(&manager.path, RecursiveMode::NonRecursive)?;

        tokio::spawn(async move {
            loop {
                let Some(first) = rx.recv().await else {
                    break;
                };
                debug!(?first, "config file event observed, debouncing");

                loop {
                    match tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                        Ok(Some(_)) => continue,
                        Ok(None) => return,
                        Err(_elapsed) => break,
                    }
                }

                if let Err(err) = manager.reload().await {
                    warn!(error = %err, "config hot-reload failed");
                } else {
                    info!("configuration hot-reloaded");
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_generates_default_when_absent() {
        let dir = tempdir().unwrap();
        let path = config_path(dir.path());
        let config = load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.max_concurrent_requests, 10);
    }

    #[test]
    fn load_reads_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"server":{"maxConcurrentRequests":42}}"#).unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.server.max_concurrent_requests, 42);
    }

    #[test]
    fn env_overlay_applies_valid_values() {
        std::env::set_var("MCP_MAX_CONCURRENT_REQUESTS", "7");
        let mut config = Config::default();
        apply_env_overlay(&mut config);
        assert_eq!(config.server.max_concurrent_requests, 7);
        std::env::remove_var("MCP_MAX_CONCURRENT_REQUESTS");
    }

    #[test]
    fn env_overlay_ignores_malformed_values() {
        std::env::set_var("MCP_MAX_CONCURRENT_REQUESTS", "not-a-number");
        let mut config = Config::default();
        apply_env_overlay(&mut config);
        assert_eq!(config.server.max_concurrent_requests, 10);
        std::env::remove_var("MCP_MAX_CONCURRENT_REQUESTS");
    }

    #[tokio::test]
    async fn manager_reload_updates_snapshot() {
        let dir = tempdir().unwrap();
        let path = config_path(dir.path());
        let manager = ConfigManager::new(path.clone()).unwrap();
        assert_eq!(manager.current().server.max_concurrent_requests, 10);

        std::fs::write(&path, r#"{"server":{"maxConcurrentRequests":33}}"#).unwrap();
        manager.reload().await.unwrap();
        assert_eq!(manager.current().server.max_concurrent_requests, 33);
    }
}

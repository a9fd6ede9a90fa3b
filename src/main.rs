//! cursor-workspace-mcp: local, per-workspace MCP server.
//!
//! Exposes a single workspace's file I/O, project introspection, editor
//! control, and model/usage telemetry as MCP tools over newline-framed
//! JSON-RPC 2.0 on stdio. Intended to be spawned once per editor window,
//! scoped to that window's workspace root.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

use cursor_workspace_mcp::config::{self, ConfigManager, ConfigWatcher};
use cursor_workspace_mcp::executor::ToolExecutor;
use cursor_workspace_mcp::logging;
use cursor_workspace_mcp::mcp::McpServer;
use cursor_workspace_mcp::registry::ToolRegistry;
use cursor_workspace_mcp::sandbox::PathSandbox;
use cursor_workspace_mcp::tools::{self, EditorPort, ModelPort};

/// Local, per-workspace MCP server exposing editor workspace operations.
///
/// Scoped to a single workspace root: every file operation is sandboxed
/// to that directory. Communicates with its client over stdio using
/// newline-framed JSON-RPC 2.0.
#[derive(Parser, Debug)]
#[command(name = "cursor-workspace-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root to scope file operations to. Defaults to the
    /// current working directory.
    #[arg(short = 'w', long, value_name = "DIR")]
    workspace_root: Option<PathBuf>,

    /// Path to configuration file. Defaults to
    /// `<workspace-root>/.cursorcli-mcp/config.json`.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors).
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments, falling back to the
/// configured level when no `-v`/`-q` flags are given.
fn get_log_level(verbose: u8, quiet: bool, config_level: tracing::Level) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => config_level,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let workspace_root = match args.workspace_root.clone().map_or_else(std::env::current_dir, Ok) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Failed to determine workspace root: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config_path = args.config.clone().unwrap_or_else(|| config::config_path(&workspace_root));

    let config_manager = match ConfigManager::new(config_path.clone()) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!("\nExpected config at: {}", config_path.display());
            eprintln!("Create one based on config/example-config.json");
            return ExitCode::FAILURE;
        }
    };

    let initial = config_manager.current();
    let editor = Arc::new(EditorPort::new());

    let requested_level = get_log_level(args.verbose, args.quiet, initial.logging.level.as_tracing_level());
    let mut logging_config = initial.logging.clone();
    logging_config.level = match requested_level {
        Level::TRACE => cursor_workspace_mcp::config::LogLevel::Debug,
        Level::DEBUG => cursor_workspace_mcp::config::LogLevel::Debug,
        Level::INFO => cursor_workspace_mcp::config::LogLevel::Info,
        Level::WARN => cursor_workspace_mcp::config::LogLevel::Warn,
        Level::ERROR => cursor_workspace_mcp::config::LogLevel::Error,
    };
    let (level_handle, _log_guards) = logging::init(&logging_config, Arc::clone(&editor));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        workspace = %workspace_root.display(),
        "starting cursor-workspace-mcp"
    );

    let sandbox = match PathSandbox::new(&workspace_root, &initial.tools.file_operations.blocked_patterns) {
        Ok(sandbox) => Arc::new(sandbox),
        Err(e) => {
            error!(error = %e, "failed to build path sandbox");
            return ExitCode::FAILURE;
        }
    };

    let model = Arc::new(ModelPort::new());
    let registry = Arc::new(RwLock::new(ToolRegistry::new()));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create Tokio runtime");

    let result = runtime.block_on(async_main(
        config_manager,
        registry,
        sandbox,
        editor,
        model,
        level_handle,
    ));

    match result {
        Ok(()) => {
            info!("server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}

async fn async_main(
    config_manager: Arc<ConfigManager>,
    registry: Arc<RwLock<ToolRegistry>>,
    sandbox: Arc<PathSandbox>,
    editor: Arc<EditorPort>,
    model: Arc<ModelPort>,
    level_handle: logging::LevelHandle,
) -> std::io::Result<()> {
    let initial = config_manager.current();

    {
        let mut registry = registry.write().await;
        tools::register_all(
            &mut registry,
            &initial.tools.allowed_tools,
            Arc::clone(&sandbox),
            Arc::clone(&config_manager),
            Arc::clone(&editor),
            Arc::clone(&model),
        )
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    }

    let executor = Arc::new(ToolExecutor::new(
        Arc::clone(&registry),
        initial.server.max_concurrent_requests,
        initial.server.request_timeout_ms,
    ));

    config_manager.on_reload(Box::new({
        let executor = Arc::clone(&executor);
        move |snapshot| {
            executor.reconfigure(snapshot.server.max_concurrent_requests, snapshot.server.request_timeout_ms);
        }
    }));

    config_manager.on_reload(Box::new(move |snapshot| {
        let level = tracing_subscriber::filter::LevelFilter::from_level(snapshot.logging.level.as_tracing_level());
        if level_handle.reload(level).is_ok() {
            info!(?level, "log level updated from reloaded configuration");
        }
    }));

    let _watcher = ConfigWatcher::start(Arc::clone(&config_manager)).map_err(std::io::Error::other)?;

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        signal_shutdown.cancel();
    });

    let mut server = McpServer::new(registry, executor, shutdown);
    info!("MCP server ready, waiting for client requests over stdio");
    server.run().await
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

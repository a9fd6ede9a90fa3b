//! External collaborator ports: `FileSystemPort`, `ProjectPort`,
//! `EditorPort`, `ModelPort`.
//!
//! These are the "tool handler bodies" the core treats as out-of-scope
//! collaborators — only their contracts matter to the executor. Implementations here
//! are real and modest rather than stubs, so the crate runs end-to-end,
//! but each stays thin: the heavy lifting (sandboxing, scheduling,
//! protocol framing) lives in the core modules.
//!
//! [`register_all`] binds each port's methods to a named, schema-checked
//! entry in a [`ToolRegistry`], respecting the configured tool allowlist.

pub mod editor;
pub mod filesystem;
pub mod model;
pub mod project;

pub use editor::EditorPort;
pub use filesystem::FileSystemPort;
pub use model::ModelPort;
pub use project::ProjectPort;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::ConfigManager;
use crate::error::ServerError;
use crate::registry::ToolRegistry;
use crate::sandbox::PathSandbox;
use crate::schema::{Field, Schema};
use filesystem::Encoding;
use model::ModelDescriptor;

fn arg_str<'a>(tool: &str, args: &'a Value, field: &str) -> Result<&'a str, ServerError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ServerError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("missing or non-string field '{field}'"),
        })
}

fn arg_u64(args: &Value, field: &str, default: u64) -> u64 {
    args.get(field).and_then(Value::as_u64).unwrap_or(default)
}

/// Registers every tool named in `allowed` against `registry`, wiring each
/// to the port instances supplied. Tools not present in `allowed` are
/// skipped entirely (never registered, so they never appear in
/// `tools/list` and always fail with `ToolNotFound` if called).
///
/// # Errors
///
/// Returns an error if registration of any tool fails (only possible on a
/// programming error — duplicate names within this function).
pub fn register_all(
    registry: &mut ToolRegistry,
    allowed: &[String],
    sandbox: Arc<PathSandbox>,
    config: Arc<ConfigManager>,
    editor: Arc<EditorPort>,
    model: Arc<ModelPort>,
) -> Result<(), ServerError> {
    let is_allowed = |name: &str| allowed.iter().any(|a| a == name);

    if is_allowed("read_file") {
        let fs = Arc::new(FileSystemPort::new(Arc::clone(&sandbox)));
        let config = Arc::clone(&config);
        registry.register(
            "read_file",
            "Reads a file within the workspace, optionally a byte range.",
            Schema::new(vec![
                Field::string("path", "path relative to the workspace root"),
                Field::optional_integer("offset", "starting byte offset, default 0"),
                Field::optional_integer("length", "maximum bytes to read"),
                Field::enum_field("encoding", "how to render content", &["utf-8", "utf-16le", "binary"]),
            ]),
            Arc::new(move |args: Value| {
                let fs = Arc::clone(&fs);
                let config = Arc::clone(&config);
                Box::pin(async move {
                    let path = arg_str("read_file", &args, "path")?.to_string();
                    let offset = arg_u64(&args, "offset", 0);
                    let length = args.get("length").and_then(Value::as_u64);
                    let encoding = args
                        .get("encoding")
                        .and_then(Value::as_str)
                        .and_then(Encoding::from_str)
                        .unwrap_or(Encoding::Utf8);

                    let result = fs.read_file(&config.current(), &path, offset, length, encoding).await?;
                    Ok(serde_json::to_value(result).expect("FileReadResult always serialises"))
                })
            }),
        )?;
    }

    if is_allowed("write_file") {
        let fs = Arc::new(FileSystemPort::new(Arc::clone(&sandbox)));
        let config = Arc::clone(&config);
        registry.register(
            "write_file",
            "Writes UTF-8 text to a file within the workspace.",
            Schema::new(vec![
                Field::string("path", "path relative to the workspace root"),
                Field::string("content", "UTF-8 text content to write"),
                Field::optional_boolean("create_parent_dirs", "create missing parent directories"),
            ]),
            Arc::new(move |args: Value| {
                let fs = Arc::clone(&fs);
                let config = Arc::clone(&config);
                Box::pin(async move {
                    let path = arg_str("write_file", &args, "path")?.to_string();
                    let content = arg_str("write_file", &args, "content")?.to_string();
                    let create_parent_dirs = args
                        .get("create_parent_dirs")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);

                    fs.write_file(&config.current(), &path, content.as_bytes(), create_parent_dirs)
                        .await?;
                    Ok(json!({ "bytesWritten": content.len() }))
                })
            }),
        )?;
    }

    if is_allowed("list_directory") {
        let fs = Arc::new(FileSystemPort::new(Arc::clone(&sandbox)));
        registry.register(
            "list_directory",
            "Lists the entries of a directory within the workspace.",
            Schema::new(vec![Field::string("path", "path relative to the workspace root")]),
            Arc::new(move |args: Value| {
                let fs = Arc::clone(&fs);
                Box::pin(async move {
                    let path = arg_str("list_directory", &args, "path")?.to_string();
                    let entries = fs.list_directory(&path).await?;
                    Ok(json!({ "entries": entries }))
                })
            }),
        )?;
    }

    if is_allowed("project_info") {
        let project = Arc::new(ProjectPort::new(Arc::clone(&sandbox)));
        registry.register(
            "project_info",
            "Returns summary information about the workspace.",
            Schema::default(),
            Arc::new(move |_args: Value| {
                let project = Arc::clone(&project);
                Box::pin(async move {
                    let info = project.project_info()?;
                    Ok(serde_json::to_value(info).expect("ProjectInfo always serialises"))
                })
            }),
        )?;
    }

    if is_allowed("search_files") {
        let project = Arc::new(ProjectPort::new(Arc::clone(&sandbox)));
        registry.register(
            "search_files",
            "Searches the workspace for files matching a glob pattern.",
            Schema::new(vec![Field::string("pattern", "glob pattern, e.g. '**/*.rs'")]),
            Arc::new(move |args: Value| {
                let project = Arc::clone(&project);
                Box::pin(async move {
                    let pattern = arg_str("search_files", &args, "pattern")?;
                    let matches = project.search_files(pattern)?;
                    Ok(json!({ "matches": matches }))
                })
            }),
        )?;
    }

    if is_allowed("workspace_tree") {
        let project = Arc::new(ProjectPort::new(Arc::clone(&sandbox)));
        registry.register(
            "workspace_tree",
            "Builds a directory tree of the workspace up to a maximum depth.",
            Schema::new(vec![
                Field::optional_integer("max_depth", "maximum depth to descend, default 3"),
                Field::optional_string_array("exclude_patterns", "glob patterns to skip"),
            ]),
            Arc::new(move |args: Value| {
                let project = Arc::clone(&project);
                Box::pin(async move {
                    let max_depth = arg_u64(&args, "max_depth", 3) as u32;
                    let exclude_patterns: Vec<String> = args
                        .get("exclude_patterns")
                        .and_then(Value::as_array)
                        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                        .unwrap_or_default();

                    let tree = project.workspace_tree(max_depth, &exclude_patterns)?;
                    Ok(serde_json::to_value(tree).expect("TreeNode always serialises"))
                })
            }),
        )?;
    }

    if is_allowed("editor_status") {
        let editor = Arc::clone(&editor);
        registry.register(
            "editor_status",
            "Reports whether the editor is ready and which buffer is active.",
            Schema::default(),
            Arc::new(move |_args: Value| {
                let editor = Arc::clone(&editor);
                Box::pin(async move {
                    Ok(json!({
                        "ready": editor.is_ready(),
                        "activeBuffer": editor.active(),
                    }))
                })
            }),
        )?;
    }

    if is_allowed("current_model") {
        let model = Arc::clone(&model);
        registry.register(
            "current_model",
            "Returns the model descriptor the client last reported.",
            Schema::default(),
            Arc::new(move |_args: Value| {
                let model = Arc::clone(&model);
                Box::pin(async move { Ok(json!({ "model": model.current_model() })) })
            }),
        )?;
    }

    if is_allowed("record_token_usage") {
        let model = Arc::clone(&model);
        registry.register(
            "record_token_usage",
            "Records one call's token usage and duration against a model.",
            Schema::new(vec![
                Field::string("model", "model identifier"),
                Field::optional_integer("tokens", "tokens consumed by the call"),
                Field::optional_integer("duration_ms", "wall-clock duration of the call, in milliseconds"),
            ]),
            Arc::new(move |args: Value| {
                let model = Arc::clone(&model);
                Box::pin(async move {
                    let name = arg_str("record_token_usage", &args, "model")?.to_string();
                    let tokens = arg_u64(&args, "tokens", 0);
                    let duration_ms = arg_u64(&args, "duration_ms", 0);

                    if model.current_model().as_ref().map(|d| d.name.as_str()) != Some(name.as_str()) {
                        model.set_current_model(ModelDescriptor {
                            name: name.clone(),
                            cost_per_1k_tokens: 0.0,
                        });
                    }
                    model.record_usage(&name, tokens, Duration::from_millis(duration_ms));
                    Ok(json!({ "recorded": true }))
                })
            }),
        )?;
    }

    if is_allowed("usage_stats") {
        let model = Arc::clone(&model);
        registry.register(
            "usage_stats",
            "Returns aggregated token usage and estimated cost across all recorded calls.",
            Schema::default(),
            Arc::new(move |_args: Value| {
                let model = Arc::clone(&model);
                Box::pin(async move {
                    let current_rate = model.current_model().map(|d| d.cost_per_1k_tokens);
                    let stats = model.stats(|_name| current_rate.unwrap_or(0.0));
                    Ok(serde_json::to_value(stats).expect("UsageStats always serialises"))
                })
            }),
        )?;
    }

    Ok(())
}

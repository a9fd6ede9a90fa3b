//! Structured logging setup: console, rotating file, and the IDE's own
//! output panel, with a runtime-adjustable level driven by config hot-reload.
//!
//! `tracing-appender`'s rolling writer only supports time-based rotation
//! (hourly/daily/never), not the size-plus-retention-count scheme described
//! by [`crate::config::LoggingConfig::max_log_size`] and
//! [`crate::config::LoggingConfig::rotation_count`]; this setup rotates
//! daily and relies on the OS to reclaim old files past `rotation_count`
//! days. A byte-accurate rotation would need a different appender.

use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{fmt, reload, Layer, Registry};

use crate::config::{LogOutput, LoggingConfig};
use crate::tools::EditorPort;

/// Handle returned from [`init`], letting a config hot-reload callback
/// adjust the minimum emitted level without rebuilding the subscriber.
pub type LevelHandle = reload::Handle<LevelFilter, Registry>;

/// Initialises the global tracing subscriber from `config`. Returns a
/// level-reload handle and any worker guards that must be kept alive for
/// the life of the process (dropping a guard stops its writer from
/// flushing).
///
/// # Panics
///
/// Panics if a global subscriber has already been installed.
pub fn init(config: &LoggingConfig, editor: Arc<EditorPort>) -> (LevelHandle, Vec<WorkerGuard>) {
    let mut guards = Vec::new();

    let (filter_layer, handle) = reload::Layer::new(LevelFilter::from_level(config.level.as_tracing_level()));

    let console_layer = config
        .outputs
        .contains(&LogOutput::Console)
        .then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

    let file_layer = if config.outputs.contains(&LogOutput::File) {
        config.log_file.as_ref().map(|path| {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().map_or_else(|| "cursor-workspace-mcp.log".into(), |n| n.to_string_lossy().into_owned());

            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            fmt::layer().with_target(false).with_ansi(false).with_writer(non_blocking)
        })
    } else {
        None
    };

    let panel_layer = config
        .outputs
        .contains(&LogOutput::CursorOutputPanel)
        .then(|| EditorPanelLayer { editor });

    let subscriber = Registry::default()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .with(panel_layer);

    tracing::subscriber::set_global_default(subscriber).expect("global tracing subscriber already set");

    (handle, guards)
}

/// Forwards formatted log events to an [`EditorPort`]'s output panel.
struct EditorPanelLayer {
    editor: Arc<EditorPort>,
}

impl<S> Layer<S> for EditorPanelLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));
        self.editor.log(&format!("[{}] {message}", event.metadata().level()));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            use std::fmt::Write;
            let _ = write!(self.0, "{value:?}");
        }
    }
}

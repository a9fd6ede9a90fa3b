//! `EditorPort`: capability probe and cursor/buffer control.
//!
//! No real IDE process is attached in this deployment shape, so this port
//! is a mock that records every call for test assertions while still
//! returning plausible results, rather than silently dropping them.

use std::sync::Mutex;

use serde::Serialize;

/// A 1-based line/column position, matching the editor's own convention.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Position {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

/// One recorded call, kept for test assertions.
#[derive(Debug, Clone)]
pub enum RecordedCall {
    /// `open` was called with this path.
    Open { path: String },
    /// `insert` was called at this position with this text.
    Insert { position: Position, text: String },
    /// `replace` was called over this range with this text.
    Replace {
        start: Position,
        end: Position,
        text: String,
    },
    /// A log line was forwarded to the editor's output panel.
    Log { line: String },
}

/// Editor façade. Records every call it receives; `is_ready` always
/// reports `true` since no real IDE handshake is performed here.
#[derive(Default)]
pub struct EditorPort {
    calls: Mutex<Vec<RecordedCall>>,
    active_path: Mutex<Option<String>>,
}

impl EditorPort {
    /// Builds an editor port with no recorded history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capability probe: always ready in this mock implementation.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        true
    }

    /// Records an `open` call and marks `path` as the active buffer.
    pub fn open(&self, path: &str) {
        self.calls.lock().expect("editor calls lock poisoned").push(RecordedCall::Open {
            path: path.to_string(),
        });
        *self.active_path.lock().expect("editor active lock poisoned") = Some(path.to_string());
    }

    /// Returns the path of the currently active buffer, if any.
    #[must_use]
    pub fn active(&self) -> Option<String> {
        self.active_path.lock().expect("editor active lock poisoned").clone()
    }

    /// Records an `insert` call.
    pub fn insert(&self, position: Position, text: &str) {
        self.calls
            .lock()
            .expect("editor calls lock poisoned")
            .push(RecordedCall::Insert {
                position,
                text: text.to_string(),
            });
    }

    /// Records a `replace` call.
    pub fn replace(&self, start: Position, end: Position, text: &str) {
        self.calls
            .lock()
            .expect("editor calls lock poisoned")
            .push(RecordedCall::Replace {
                start,
                end,
                text: text.to_string(),
            });
    }

    /// Returns the number of calls recorded so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("editor calls lock poisoned").len()
    }

    /// Forwards one formatted log line to the editor's output panel. Used
    /// by the `cursor-output-panel` logging sink.
    pub fn log(&self, line: &str) {
        self.calls
            .lock()
            .expect("editor calls lock poisoned")
            .push(RecordedCall::Log { line: line.to_string() });
    }
}

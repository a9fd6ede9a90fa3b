//! Tool Executor.
//!
//! Validates arguments, admits under a semaphore, races the handler
//! against a per-call deadline, and surfaces typed failures — in the
//! exact five-step order the call pipeline requires: lookup, admission,
//! validation, deadline race, permit release.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::ServerError;
use crate::registry::ToolRegistry;

/// Executes tool calls against a shared [`ToolRegistry`] under a
/// concurrency limit and per-call deadline, both resized whenever the
/// config snapshot changes.
///
/// Limits live behind an `Arc`-swappable cell (mirroring
/// [`crate::config::ConfigManager`]'s own snapshot pattern) so
/// [`Self::reconfigure`] can run through a shared `Arc<ToolExecutor>` from a
/// config hot-reload callback without requiring exclusive access.
pub struct ToolExecutor {
    registry: Arc<tokio::sync::RwLock<ToolRegistry>>,
    semaphore: StdRwLock<Arc<Semaphore>>,
    timeout_ms: AtomicU64,
    limit: AtomicUsize,
}

impl ToolExecutor {
    /// Builds an executor sized by `max_concurrent_requests` and
    /// `request_timeout_ms`.
    #[must_use]
    pub fn new(
        registry: Arc<tokio::sync::RwLock<ToolRegistry>>,
        max_concurrent_requests: u32,
        request_timeout_ms: u64,
    ) -> Self {
        Self {
            registry,
            semaphore: StdRwLock::new(Arc::new(Semaphore::new(max_concurrent_requests as usize))),
            timeout_ms: AtomicU64::new(request_timeout_ms),
            limit: AtomicUsize::new(max_concurrent_requests as usize),
        }
    }

    /// Rebuilds the concurrency and timeout limits from a new config
    /// snapshot. Existing in-flight permits are unaffected; the new
    /// semaphore governs subsequent admissions.
    pub fn reconfigure(&self, max_concurrent_requests: u32, request_timeout_ms: u64) {
        *self.semaphore.write().expect("executor semaphore lock poisoned") =
            Arc::new(Semaphore::new(max_concurrent_requests as usize));
        self.timeout_ms.store(request_timeout_ms, Ordering::SeqCst);
        self.limit.store(max_concurrent_requests as usize, Ordering::SeqCst);
    }

    /// Executes `name` with `raw_args`, following the five-step pipeline:
    /// lookup, non-blocking admission, schema validation, deadline race,
    /// unconditional permit release.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ToolNotFound`], [`ServerError::ToolDisabled`],
    /// [`ServerError::ConcurrencyLimitExceeded`],
    /// [`ServerError::InvalidArguments`], or [`ServerError::Timeout`]
    /// depending on which step fails; otherwise returns whatever the
    /// handler returns.
    pub async fn execute(&self, name: &str, raw_args: Value) -> Result<Value, ServerError> {
        let (schema, handler) = {
            let registry = self.registry.read().await;
            let entry = registry
                .get(name)
                .ok_or_else(|| ServerError::ToolNotFound { name: name.to_string() })?;
            if !entry.enabled {
                return Err(ServerError::ToolDisabled { name: name.to_string() });
            }
            (entry.schema.clone(), Arc::clone(&entry.handler))
        };

        let limit = self.limit.load(Ordering::SeqCst);
        let semaphore = Arc::clone(&self.semaphore.read().expect("executor semaphore lock poisoned"));
        let permit = semaphore
            .try_acquire_owned()
            .map_err(|_| ServerError::ConcurrencyLimitExceeded { limit })?;

        schema.validate(name, &raw_args)?;

        let timeout = Duration::from_millis(self.timeout_ms.load(Ordering::SeqCst));
        let cancellation = CancellationToken::new();
        let handler_future = handler(raw_args);

        let result = tokio::select! {
            result = handler_future => result,
            () = tokio::time::sleep(timeout) => {
                cancellation.cancel();
                warn!(tool = name, timeout_ms = timeout.as_millis(), "tool call timed out");
                drop(permit);
                return Err(ServerError::Timeout {
                    tool: name.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        drop(permit);
        result
    }
}

//! `ModelPort`: current model descriptor and in-memory usage telemetry.
//!
//! Durable persistence of telemetry is an explicit non-goal, so this
//! ledger lives purely in memory for the life of the process — it resets
//! on every restart.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Describes the model the client reports it is currently driven by.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    /// Model identifier, e.g. `"claude-opus-4"`.
    pub name: String,
    /// Cost in USD per 1000 tokens, used to estimate spend.
    pub cost_per_1k_tokens: f64,
}

#[derive(Debug, Clone)]
struct UsageRecord {
    model: String,
    tokens: u64,
    duration: Duration,
}

/// Aggregated usage statistics across all recorded calls.
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    /// Total recorded calls.
    pub session_count: u64,
    /// Total tokens recorded across all calls.
    pub total_tokens: u64,
    /// Total estimated cost in USD, summed per-model at that model's rate.
    pub estimated_cost_usd: f64,
    /// Average call duration across all recorded calls, in milliseconds.
    pub average_duration_ms: f64,
    /// Per-model average duration, in milliseconds.
    pub per_model_average_duration_ms: Vec<(String, f64)>,
}

/// In-memory model/usage telemetry ledger.
#[derive(Default)]
pub struct ModelPort {
    current: Mutex<Option<ModelDescriptor>>,
    records: Mutex<Vec<UsageRecord>>,
}

impl ModelPort {
    /// Builds an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the currently active model descriptor.
    pub fn set_current_model(&self, descriptor: ModelDescriptor) {
        *self.current.lock().expect("model current lock poisoned") = Some(descriptor);
    }

    /// Returns the currently active model descriptor, if one was set.
    #[must_use]
    pub fn current_model(&self) -> Option<ModelDescriptor> {
        self.current.lock().expect("model current lock poisoned").clone()
    }

    /// Records one call's token usage and duration against `model`'s rate.
    pub fn record_usage(&self, model: &str, tokens: u64, duration: Duration) {
        self.records
            .lock()
            .expect("model records lock poisoned")
            .push(UsageRecord {
                model: model.to_string(),
                tokens,
                duration,
            });
    }

    /// Computes aggregated statistics over every recorded call.
    #[must_use]
    pub fn stats(&self, rate_for: impl Fn(&str) -> f64) -> UsageStats {
        let records = self.records.lock().expect("model records lock poisoned");

        let session_count = records.len() as u64;
        let total_tokens: u64 = records.iter().map(|r| r.tokens).sum();
        let estimated_cost_usd: f64 = records
            .iter()
            .map(|r| (r.tokens as f64 / 1000.0) * rate_for(&r.model))
            .sum();

        let average_duration_ms = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.duration.as_secs_f64() * 1000.0).sum::<f64>() / records.len() as f64
        };

        let mut per_model: std::collections::BTreeMap<String, (f64, u64)> = std::collections::BTreeMap::new();
        for record in records.iter() {
            let entry = per_model.entry(record.model.clone()).or_insert((0.0, 0));
            entry.0 += record.duration.as_secs_f64() * 1000.0;
            entry.1 += 1;
        }
        let per_model_average_duration_ms = per_model
            .into_iter()
            .map(|(model, (total_ms, count))| (model, total_ms / count as f64))
            .collect();

        UsageStats {
            session_count,
            total_tokens,
            estimated_cost_usd,
            average_duration_ms,
            per_model_average_duration_ms,
        }
    }
}

//! Task log events.
//!
//! Each node reports `START` when its worker begins, `LOG` every
//! `logging_threshold_rows` processed rows, and `END` when it finishes. Events
//! go to the run's [`LogSink`]; the default sink forwards them to `tracing`.
//! Sinks are fire-and-forget and must not block.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::EtlConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogAction {
    Start,
    End,
    Log,
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogAction::Start => "START",
            LogAction::End => "END",
            LogAction::Log => "LOG",
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LogEvent {
    pub message: String,
    pub task_type: String,
    pub action: LogAction,
    pub task_hash: String,
    pub stage: Option<String>,
    pub run_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

pub trait LogSink: Send + Sync {
    fn log(&self, event: &LogEvent);
}

/// Forwards events to `tracing` at `info` level under target `ironetl::task`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, e: &LogEvent) {
        tracing::info!(
            target: "ironetl::task",
            task_type = %e.task_type,
            action = %e.action,
            task_hash = %e.task_hash,
            stage = e.stage.as_deref().unwrap_or(""),
            run_id = e.run_id,
            "{}",
            e.message
        );
    }
}

/// Stable identifier of a task: hex SHA-256 over type and name, 40 chars.
pub fn task_hash(task_type: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task_type.as_bytes());
    hasher.update(b"|");
    hasher.update(name.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..40].to_string()
}

/// Install a `tracing-subscriber` fmt layer filtered by `RUST_LOG`
/// (default `info`). Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Per-node progress reporter.
pub(crate) struct TaskLogger {
    sink: Arc<dyn LogSink>,
    task_type: &'static str,
    name: String,
    hash: String,
    stage: Option<String>,
    run_id: Option<i64>,
    threshold: Option<u64>,
    enabled: bool,
    rows: u64,
}

impl TaskLogger {
    pub(crate) fn new(
        sink: Arc<dyn LogSink>,
        config: &EtlConfig,
        task_type: &'static str,
        name: String,
    ) -> Self {
        Self {
            hash: task_hash(task_type, &name),
            sink,
            task_type,
            name,
            stage: config.stage.clone(),
            run_id: config.run_id,
            threshold: config.logging_threshold_rows.filter(|t| *t > 0),
            enabled: !config.disable_logging,
            rows: 0,
        }
    }

    pub(crate) fn start(&self) {
        self.emit(LogAction::Start, format!("START {}", self.name));
    }

    /// Count one processed row.
    pub(crate) fn row(&mut self) {
        self.rows += 1;
        if let Some(t) = self.threshold {
            if self.rows % t == 0 {
                self.emit(LogAction::Log, format!("{}: rows processed {}", self.name, self.rows));
            }
        }
    }

    pub(crate) fn rows(&self) -> u64 {
        self.rows
    }

    pub(crate) fn end(&self) {
        self.emit(LogAction::End, format!("END {} ({} rows)", self.name, self.rows));
    }

    fn emit(&self, action: LogAction, message: String) {
        if !self.enabled {
            return;
        }
        self.sink.log(&LogEvent {
            message,
            task_type: self.task_type.to_string(),
            action,
            task_hash: self.hash.clone(),
            stage: self.stage.clone(),
            run_id: self.run_id,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_hash_is_stable_and_40_chars() {
        let a = task_hash("Sort", "orders");
        assert_eq!(a.len(), 40);
        assert_eq!(a, task_hash("Sort", "orders"));
        assert_ne!(a, task_hash("Sort", "customers"));
    }
}

//! Run configuration and the context object handed to every node.
//!
//! [`EtlConfig`] is plain data (serde, with defaults for every field) so it
//! can be loaded from JSON. [`PipelineContext`] adds the live collaborators
//! a run needs: the log sink, an optional default connection manager, and
//! the cancellation token. A [`Pipeline`](crate::Pipeline) owns one context
//! and passes it to each node at construction; nothing is looked up from
//! global state.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::ConnectionManager;
use crate::error::EtlError;
use crate::logging::{LogSink, TracingLogSink};

/// Tunables for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// Capacity of every input buffer; a full buffer blocks the producer.
    pub buffer_capacity: usize,
    /// Batch size used by database destinations unless overridden.
    pub default_batch_size: usize,
    /// Emit a `LOG` progress event every N rows per node.
    pub logging_threshold_rows: Option<u64>,
    pub disable_logging: bool,
    pub stage: Option<String>,
    pub run_id: Option<i64>,
    pub connect_max_attempts: u32,
    pub connect_retry_delay_ms: u64,
    /// Sort buffers longer than this are sorted in parallel.
    pub sort_parallel_threshold: usize,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1024,
            default_batch_size: 1000,
            logging_threshold_rows: None,
            disable_logging: false,
            stage: None,
            run_id: None,
            connect_max_attempts: 3,
            connect_retry_delay_ms: 1000,
            sort_parallel_threshold: 4096,
        }
    }
}

impl EtlConfig {
    pub fn from_json_str(s: &str) -> Result<Self, EtlError> {
        serde_json::from_str(s).map_err(|e| EtlError::configuration("config", e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EtlError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| EtlError::io(path.display().to_string(), e))?;
        Self::from_json_str(&text)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_max_attempts.max(1),
            delay: Duration::from_millis(self.connect_retry_delay_ms),
        }
    }
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        EtlConfig::default().retry_policy()
    }
}

/// Cooperative cancellation flag shared by all nodes of one run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn check(&self) -> Result<(), EtlError> {
        if self.is_cancelled() { Err(EtlError::Cancelled) } else { Ok(()) }
    }
}

/// Everything a node needs from its surroundings.
#[derive(Clone)]
pub struct PipelineContext {
    config: Arc<EtlConfig>,
    log_sink: Arc<dyn LogSink>,
    connection: Option<Arc<dyn ConnectionManager>>,
    cancel: CancellationToken,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(EtlConfig::default())
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("config", &self.config)
            .field("has_connection", &self.connection.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl PipelineContext {
    pub fn new(config: EtlConfig) -> Self {
        Self {
            config: Arc::new(config),
            log_sink: Arc::new(TracingLogSink),
            connection: None,
            cancel: CancellationToken::default(),
        }
    }

    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// Connection manager used by database nodes that were not given one.
    #[must_use]
    pub fn with_connection(mut self, manager: Arc<dyn ConnectionManager>) -> Self {
        self.connection = Some(manager);
        self
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    pub fn log_sink(&self) -> &Arc<dyn LogSink> {
        &self.log_sink
    }

    pub fn connection(&self) -> Option<&Arc<dyn ConnectionManager>> {
        self.connection.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

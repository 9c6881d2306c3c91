//! Error taxonomy for pipeline runs.
//!
//! Every engine API returns [`EtlError`]. User-supplied closures return
//! [`anyhow::Result`]; their failures are wrapped into [`EtlError::Processing`]
//! when no error sink is attached to the failing node, or turned into an
//! [`ErrorRecord`] when one is.
//!
//! `EtlError` is `Clone` because a single fault fans out to every successor
//! of the faulted node.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Errors surfaced by nodes, collaborators and the pipeline runner.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EtlError {
    /// Missing or contradictory wiring detected before any row moves.
    #[error("configuration error in {node}: {message}")]
    Configuration { node: String, message: String },

    /// A per-record step failed and the node had no error sink attached.
    #[error("processing error in {node}: {cause:#}")]
    Processing {
        node: String,
        cause: Arc<anyhow::Error>,
    },

    /// A predecessor faulted; `cause` is the fault it reported.
    #[error("{node} stopped because a predecessor faulted: {cause}")]
    Upstream { node: String, cause: Box<EtlError> },

    /// The collaborator cannot perform the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("connection failed after {attempts} attempt(s): {message}")]
    Connection { attempts: u32, message: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("i/o error on {resource}: {message}")]
    Io { resource: String, message: String },

    /// A field could not be read, written or converted.
    #[error("field error: {0}")]
    Field(String),

    #[error("pipeline run was cancelled")]
    Cancelled,

    #[error("node {node} panicked: {message}")]
    Panicked { node: String, message: String },
}

impl EtlError {
    pub fn configuration(node: impl Into<String>, message: impl Into<String>) -> Self {
        EtlError::Configuration {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn processing(node: impl Into<String>, cause: anyhow::Error) -> Self {
        EtlError::Processing {
            node: node.into(),
            cause: Arc::new(cause),
        }
    }

    pub fn upstream(node: impl Into<String>, cause: EtlError) -> Self {
        EtlError::Upstream {
            node: node.into(),
            cause: Box::new(cause),
        }
    }

    pub fn io(resource: impl Into<String>, err: impl std::fmt::Display) -> Self {
        EtlError::Io {
            resource: resource.into(),
            message: err.to_string(),
        }
    }

    /// Follow `Upstream` wrappers back to the fault that started the cascade.
    pub fn root_cause(&self) -> &EtlError {
        let mut current = self;
        while let EtlError::Upstream { cause, .. } = current {
            current = cause;
        }
        current
    }

    /// Whether the error is a configuration problem rather than a data problem.
    pub fn is_configuration(&self) -> bool {
        matches!(self.root_cause(), EtlError::Configuration { .. })
    }
}

/// A failed record diverted to an error sink.
///
/// Created once at failure time and never mutated afterwards. The original
/// error is kept for inspection but is not part of the serialized form.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    #[serde(skip)]
    pub error: EtlError,
    pub error_text: String,
    pub record_json: String,
    pub report_time: DateTime<Utc>,
}

impl ErrorRecord {
    /// Build a record from a failing row. Serialization is best-effort: if the
    /// row cannot be rendered as JSON, the serializer's message takes its place.
    pub fn new<R: Serialize + ?Sized>(error: EtlError, row: &R) -> Self {
        let record_json = match serde_json::to_string(row) {
            Ok(json) => json,
            Err(e) => e.to_string(),
        };
        Self::from_raw(error, record_json)
    }

    /// Build a record from text that could not be parsed into a row at all.
    pub fn from_raw(error: EtlError, record_json: impl Into<String>) -> Self {
        let error_text = match &error {
            EtlError::Processing { cause, .. } => format!("{cause:#}"),
            other => other.to_string(),
        };
        Self {
            error,
            error_text,
            record_json: record_json.into(),
            report_time: Utc::now(),
        }
    }
}

//! Per-record dead-letter routing.
//!
//! Nodes that can fail on a single row carry an [`ErrorRouter`]. When an
//! error sink is linked, a failing row becomes an [`ErrorRecord`] on the
//! sink and processing moves on; otherwise the failure faults the node.
//! Linking a sink registers the failing node's completion with it, so the
//! sink completes only once no more errors can arrive.

use serde::Serialize;

use crate::error::{ErrorRecord, EtlError};
use crate::link::{Emitter, FanOut, Output};
use crate::node::{DataFlowNode, LinkTarget, NodeCore};

/// Optional error output of a node.
#[derive(Clone)]
pub struct ErrorRouter {
    output: Output<ErrorRecord>,
}

impl ErrorRouter {
    pub(crate) fn new(core: &NodeCore) -> Self {
        Self {
            output: core.output(FanOut::Distribute),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.output.link_count() > 0
    }

    pub(crate) fn start(&self, node: &str) -> ErrorSink {
        ErrorSink {
            emitter: self.output.emitter(),
            node: node.to_string(),
        }
    }
}

/// Nodes whose per-record failures can be diverted.
pub trait ErrorSource: DataFlowNode {
    fn error_router(&self) -> &ErrorRouter;

    /// Divert failing rows to `target` instead of faulting the node.
    fn link_errors_to<N>(&self, target: &N) -> Result<(), EtlError>
    where
        N: LinkTarget<ErrorRecord> + ?Sized,
    {
        self.error_router().output.link(target, None)
    }
}

/// Running-side view of an [`ErrorRouter`].
pub(crate) struct ErrorSink {
    emitter: Emitter<ErrorRecord>,
    node: String,
}

impl ErrorSink {
    pub(crate) fn is_attached(&self) -> bool {
        self.emitter.is_linked()
    }

    /// Route a failed row, or turn the failure into the node's fault when no
    /// sink is attached.
    pub(crate) fn route<R: Serialize + ?Sized>(&self, row: &R, cause: anyhow::Error) -> Result<(), EtlError> {
        let error = EtlError::processing(&self.node, cause);
        self.route_error(row, error)
    }

    pub(crate) fn route_error<R: Serialize + ?Sized>(&self, row: &R, error: EtlError) -> Result<(), EtlError> {
        if !self.emitter.is_linked() {
            return Err(error);
        }
        tracing::debug!(node = %self.node, %error, "row routed to error sink");
        self.emitter.send(ErrorRecord::new(error, row));
        Ok(())
    }

    /// Route input that never became a row (e.g. an unparsable line).
    pub(crate) fn route_raw(&self, raw: &str, error: EtlError) -> Result<(), EtlError> {
        if !self.emitter.is_linked() {
            return Err(error);
        }
        tracing::debug!(node = %self.node, %error, "raw record routed to error sink");
        self.emitter.send(ErrorRecord::from_raw(error, raw));
        Ok(())
    }
}

/// Implements [`ErrorSource`] for a type holding an `errors: ErrorRouter` field.
macro_rules! impl_error_source {
    ([$($gen:tt)*] $ty:ty) => {
        impl<$($gen)*> $crate::error_router::ErrorSource for $ty {
            fn error_router(&self) -> &$crate::error_router::ErrorRouter {
                &self.errors
            }
        }
    };
}

pub(crate) use impl_error_source;

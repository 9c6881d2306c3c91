//! The node contract.
//!
//! Every pipeline participant implements [`DataFlowNode`]: it has an id, a
//! name, and a [`Completion`] that resolves once its work is done. Nodes that
//! accept rows implement [`LinkTarget`]; nodes that produce rows implement
//! [`LinkSource`], which carries the linking operations.
//!
//! Internally each node is a [`NodeCore`] plus a worker closure registered
//! with the pipeline at construction. The worker runs on its own thread when
//! the pipeline starts.

use std::sync::{Arc, Mutex};

use crate::completion::Completion;
use crate::config::PipelineContext;
use crate::destinations::VoidDestination;
use crate::error::EtlError;
use crate::link::{FanOut, Output};
use crate::logging::TaskLogger;
use crate::node_id::NodeId;
use crate::pipeline::{Pipeline, WeakPipeline};
use crate::port::{Inbox, InputPort};
use crate::row::Record;
use crate::utils::lock;

/// Minimal capability shared by every node.
pub trait DataFlowNode {
    fn id(&self) -> NodeId;
    fn name(&self) -> String;
    fn completion(&self) -> Completion;
}

/// A node that accepts rows of type `T`.
pub trait LinkTarget<T: Record>: DataFlowNode {
    fn input_port(&self) -> InputPort<T>;

    /// Make this node's input wait for `completion` before it completes.
    fn add_predecessor_completion(&self, completion: &Completion) {
        self.input_port().add_predecessor(completion);
    }
}

/// A node that produces rows of type `T`.
pub trait LinkSource<T: Record>: DataFlowNode {
    fn output(&self) -> &Output<T>;

    /// Send every row to `target`.
    fn link_to<N>(&self, target: &N) -> Result<(), EtlError>
    where
        N: LinkTarget<T> + ?Sized,
    {
        self.output().link(target, None)
    }

    /// Send rows accepted by `keep` to `target`. Rows no link accepts are dropped.
    fn link_to_if<N, P>(&self, target: &N, keep: P) -> Result<(), EtlError>
    where
        N: LinkTarget<T> + ?Sized,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.output().link(target, Some(Arc::new(keep)))
    }

    /// Like [`link_to_if`](Self::link_to_if), and also route rows accepted by
    /// `void` into a fresh [`VoidDestination`] so they are consumed too.
    fn link_to_or_void<N, P, V>(&self, target: &N, keep: P, void: V) -> Result<VoidDestination<T>, EtlError>
    where
        N: LinkTarget<T> + ?Sized,
        P: Fn(&T) -> bool + Send + Sync + 'static,
        V: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let pipeline = self.output().pipeline()?;
        self.output().link(target, Some(Arc::new(keep)))?;
        let sink = VoidDestination::new(&pipeline);
        self.output().link(&sink, Some(Arc::new(void)))?;
        Ok(sink)
    }
}

/// Shared, renameable node name.
#[derive(Clone, Debug)]
pub(crate) struct NodeLabel(Arc<Mutex<String>>);

impl NodeLabel {
    pub(crate) fn new(name: &str) -> Self {
        Self(Arc::new(Mutex::new(name.to_string())))
    }

    pub(crate) fn get(&self) -> String {
        lock(&self.0).clone()
    }

    pub(crate) fn set(&self, name: String) {
        *lock(&self.0) = name;
    }
}

/// What a worker receives when its thread starts.
pub(crate) struct TaskContext {
    pub(crate) name: String,
    pub(crate) logger: TaskLogger,
    pub(crate) ctx: PipelineContext,
}

impl TaskContext {
    /// Fail with `Cancelled` if the run was cancelled.
    pub(crate) fn check_cancelled(&self) -> Result<(), EtlError> {
        self.ctx.cancellation().check()
    }
}

/// Identity and wiring state common to all nodes.
pub(crate) struct NodeCore {
    pub(crate) id: NodeId,
    pub(crate) label: NodeLabel,
    pub(crate) task_type: &'static str,
    pub(crate) completion: Completion,
    pub(crate) pipeline: WeakPipeline,
    pub(crate) ctx: PipelineContext,
}

impl NodeCore {
    pub(crate) fn new(pipeline: &Pipeline, task_type: &'static str) -> Self {
        Self {
            id: pipeline.next_node_id(),
            label: NodeLabel::new(task_type),
            task_type,
            completion: Completion::new(),
            pipeline: pipeline.downgrade(),
            ctx: pipeline.context().clone(),
        }
    }

    /// Create an input port sized by the run's buffer capacity and register
    /// it for sealing.
    pub(crate) fn input<T: Record>(&self, port: &'static str) -> (InputPort<T>, Inbox<T>) {
        let (input, inbox) =
            InputPort::new(self.label.clone(), port, self.ctx.config().buffer_capacity);
        if let Some(p) = self.pipeline.upgrade() {
            p.register_port(input.sealer());
        }
        (input, inbox)
    }

    pub(crate) fn output<T: Record>(&self, mode: FanOut) -> Output<T> {
        Output::new(self, mode)
    }

    /// Hand the worker to the pipeline. It runs once, on its own thread.
    pub(crate) fn launch<F>(&self, body: F)
    where
        F: FnOnce(TaskContext) -> Result<(), EtlError> + Send + 'static,
    {
        if let Some(p) = self.pipeline.upgrade() {
            p.register_task(self.id, self.label.clone(), self.task_type, self.completion.clone(), Box::new(body));
        }
    }

    /// A link-target handle onto one of this node's input ports.
    pub(crate) fn target<T: Record>(&self, port: &InputPort<T>) -> PortTarget<T> {
        PortTarget {
            id: self.id,
            label: self.label.clone(),
            completion: self.completion.clone(),
            port: port.clone(),
        }
    }
}

/// Link target for a secondary input of a multi-input node, such as
/// [`MergeJoin::left`](crate::transforms::MergeJoin::left) or
/// [`LookupTransformation::side_input`](crate::transforms::LookupTransformation::side_input).
pub struct PortTarget<T> {
    id: NodeId,
    label: NodeLabel,
    completion: Completion,
    port: InputPort<T>,
}

impl<T: Record> DataFlowNode for PortTarget<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> String {
        self.label.get()
    }

    fn completion(&self) -> Completion {
        self.completion.clone()
    }
}

impl<T: Record> LinkTarget<T> for PortTarget<T> {
    fn input_port(&self) -> InputPort<T> {
        self.port.clone()
    }
}

/// Implements [`DataFlowNode`] and `with_name` for a type holding a
/// `core: NodeCore` field.
macro_rules! impl_node {
    ([$($gen:tt)*] $ty:ty) => {
        impl<$($gen)*> $crate::node::DataFlowNode for $ty {
            fn id(&self) -> $crate::node_id::NodeId {
                self.core.id
            }

            fn name(&self) -> String {
                self.core.label.get()
            }

            fn completion(&self) -> $crate::completion::Completion {
                self.core.completion.clone()
            }
        }

        impl<$($gen)*> $ty {
            /// Rename the node; the name appears in log events and errors.
            #[must_use]
            pub fn with_name(self, name: impl Into<String>) -> Self {
                self.core.label.set(name.into());
                self
            }
        }
    };
}

/// Implements [`LinkTarget`] for a type holding an `input: InputPort<_>` field.
macro_rules! impl_target {
    ([$($gen:tt)*] $ty:ty, $row:ty) => {
        impl<$($gen)*> $crate::node::LinkTarget<$row> for $ty {
            fn input_port(&self) -> $crate::port::InputPort<$row> {
                self.input.clone()
            }
        }
    };
}

/// Implements [`LinkSource`] for a type holding an `output: Output<_>` field.
macro_rules! impl_source {
    ([$($gen:tt)*] $ty:ty, $row:ty) => {
        impl<$($gen)*> $crate::node::LinkSource<$row> for $ty {
            fn output(&self) -> &$crate::link::Output<$row> {
                &self.output
            }
        }
    };
}

pub(crate) use {impl_node, impl_source, impl_target};

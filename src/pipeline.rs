//! The pipeline: node registry and runner.
//!
//! Nodes register themselves (their worker and their input ports) when they
//! are constructed against a [`Pipeline`]. [`Pipeline::start`] seals the graph,
//! completes every input port that has no predecessors, and spawns one named
//! thread per node. A run happens once; there is no resumption.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;

use crate::completion::Completion;
use crate::config::{CancellationToken, PipelineContext};
use crate::error::EtlError;
use crate::logging::TaskLogger;
use crate::node::{NodeLabel, TaskContext};
use crate::node_id::NodeId;
use crate::port::Seal;
use crate::utils::{lock, panic_message};

type TaskBody = Box<dyn FnOnce(TaskContext) -> Result<(), EtlError> + Send>;

struct NodeTask {
    id: NodeId,
    label: NodeLabel,
    task_type: &'static str,
    completion: Completion,
    body: TaskBody,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    Building,
    Started,
}

pub(crate) struct PipelineInner {
    next_id: u64,
    tasks: Vec<NodeTask>,
    ports: Vec<Arc<dyn Seal>>,
    state: RunState,
}

/// Container for a graph of linked nodes. Cloning shares the same graph.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Mutex<PipelineInner>>,
    ctx: PipelineContext,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineContext::default())
    }
}

impl Pipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PipelineInner {
                next_id: 0,
                tasks: Vec::new(),
                ports: Vec::new(),
                state: RunState::Building,
            })),
            ctx,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Whether [`start`](Self::start) or [`run`](Self::run) has been called.
    pub fn is_started(&self) -> bool {
        lock(&self.inner).state == RunState::Started
    }

    /// Number of nodes with a registered worker.
    pub fn node_count(&self) -> usize {
        lock(&self.inner).tasks.len()
    }

    pub(crate) fn downgrade(&self) -> WeakPipeline {
        WeakPipeline {
            inner: Arc::downgrade(&self.inner),
            ctx: self.ctx.clone(),
        }
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        let mut g = lock(&self.inner);
        let id = NodeId::new(g.next_id);
        g.next_id += 1;
        id
    }

    pub(crate) fn register_port(&self, port: Arc<dyn Seal>) {
        lock(&self.inner).ports.push(port);
    }

    pub(crate) fn register_task(
        &self,
        id: NodeId,
        label: NodeLabel,
        task_type: &'static str,
        completion: Completion,
        body: TaskBody,
    ) {
        lock(&self.inner).tasks.push(NodeTask {
            id,
            label,
            task_type,
            completion,
            body,
        });
    }

    /// Run every node to completion and return the first fault, if any.
    pub fn run(&self) -> Result<(), EtlError> {
        self.start()?.wait()
    }

    /// Seal the graph and start every node on its own thread.
    pub fn start(&self) -> Result<RunHandle, EtlError> {
        let (tasks, ports) = {
            let mut g = lock(&self.inner);
            if g.state == RunState::Started {
                return Err(EtlError::configuration("pipeline", "a pipeline can only run once"));
            }
            g.state = RunState::Started;
            (std::mem::take(&mut g.tasks), std::mem::take(&mut g.ports))
        };

        tracing::debug!(nodes = tasks.len(), ports = ports.len(), "sealing pipeline");
        for port in &ports {
            port.seal();
        }

        let faults: Arc<Mutex<Vec<EtlError>>> = Arc::new(Mutex::new(Vec::new()));
        let mut completions = Vec::with_capacity(tasks.len());
        let mut threads = Vec::with_capacity(tasks.len());

        for task in tasks {
            let sink = Arc::clone(&faults);
            task.completion.on_complete(move |r| {
                if let Err(e) = r {
                    lock(&sink).push(e.clone());
                }
            });
            completions.push(task.completion.clone());
            match self.spawn(task) {
                Ok(handle) => threads.push(handle),
                Err(e) => tracing::error!(error = %e, "failed to spawn node worker"),
            }
        }

        Ok(RunHandle {
            completions,
            threads,
            faults,
            cancel: self.ctx.cancellation().clone(),
        })
    }

    fn spawn(&self, task: NodeTask) -> Result<JoinHandle<()>, EtlError> {
        let NodeTask {
            id,
            label,
            task_type,
            completion,
            body,
        } = task;
        let name = label.get();
        let ctx = self.ctx.clone();
        let logger = TaskLogger::new(Arc::clone(ctx.log_sink()), ctx.config(), task_type, name.clone());
        let resolver = completion.clone();
        let thread_name = format!("ironetl-{}-{}", id.raw(), name);
        let spawned = std::thread::Builder::new().name(thread_name).spawn(move || {
            let task_ctx = TaskContext {
                name: name.clone(),
                logger,
                ctx,
            };
            let result = catch_unwind(AssertUnwindSafe(move || body(task_ctx))).unwrap_or_else(|payload| {
                Err(EtlError::Panicked {
                    node: name.clone(),
                    message: panic_message(payload.as_ref()),
                })
            });
            match &result {
                Ok(()) => tracing::debug!(node = %name, id = id.raw(), "node completed"),
                Err(e) => tracing::debug!(node = %name, id = id.raw(), error = %e, "node faulted"),
            }
            resolver.resolve(result);
        });
        spawned.map_err(|e| {
            let err = EtlError::io("worker thread", e);
            completion.resolve(Err(err.clone()));
            err
        })
    }
}

/// Weak handle held by nodes so the graph does not keep itself alive.
#[derive(Clone)]
pub(crate) struct WeakPipeline {
    inner: Weak<Mutex<PipelineInner>>,
    ctx: PipelineContext,
}

impl WeakPipeline {
    pub(crate) fn upgrade(&self) -> Option<Pipeline> {
        self.inner.upgrade().map(|inner| Pipeline {
            inner,
            ctx: self.ctx.clone(),
        })
    }
}

/// A started run.
pub struct RunHandle {
    completions: Vec<Completion>,
    threads: Vec<JoinHandle<()>>,
    faults: Arc<Mutex<Vec<EtlError>>>,
    cancel: CancellationToken,
}

impl RunHandle {
    /// Ask sources to stop emitting. Their fault propagates downstream.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for every node. Returns the first root fault recorded (a fault
    /// not caused by a predecessor), or the first propagated one.
    pub fn wait(self) -> Result<(), EtlError> {
        for c in &self.completions {
            // Individual outcomes are collected through `faults`.
            let _ = c.wait();
        }
        for t in self.threads {
            let _ = t.join();
        }
        let faults = lock(&self.faults);
        let first = faults
            .iter()
            .find(|e| !matches!(e, EtlError::Upstream { .. }))
            .or_else(|| faults.first());
        match first {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

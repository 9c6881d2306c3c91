//! Producer-side wiring.
//!
//! An [`Output`] records the links leaving a node. Links are appended while
//! the graph is being built; when the worker starts it takes a frozen
//! [`Emitter`] snapshot and sends through that. Linking after the pipeline
//! has started is rejected.

use std::sync::{Arc, Mutex};

use crate::completion::Completion;
use crate::error::EtlError;
use crate::node::{LinkTarget, NodeCore, NodeLabel};
use crate::pipeline::{Pipeline, WeakPipeline};
use crate::port::InputPort;
use crate::row::Record;
use crate::utils::lock;

pub(crate) type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// How a producer with several links hands out rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FanOut {
    /// Each row goes to the first link whose predicate accepts it.
    Distribute,
    /// Each accepting link receives its own clone of the row.
    Broadcast,
}

struct Link<T> {
    target: InputPort<T>,
    predicate: Option<Predicate<T>>,
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<T> Link<T> {
    fn accepts(&self, row: &T) -> bool {
        self.predicate.as_ref().is_none_or(|p| p(row))
    }
}

struct OutputInner<T> {
    owner: NodeLabel,
    source: Completion,
    pipeline: WeakPipeline,
    mode: FanOut,
    links: Mutex<Vec<Link<T>>>,
}

/// The outgoing side of a node.
pub struct Output<T> {
    inner: Arc<OutputInner<T>>,
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Record> Output<T> {
    pub(crate) fn new(core: &NodeCore, mode: FanOut) -> Self {
        Self {
            inner: Arc::new(OutputInner {
                owner: core.label.clone(),
                source: core.completion.clone(),
                pipeline: core.pipeline.clone(),
                mode,
                links: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Append a link and make the target wait for this producer.
    pub(crate) fn link<N>(&self, target: &N, predicate: Option<Predicate<T>>) -> Result<(), EtlError>
    where
        N: LinkTarget<T> + ?Sized,
    {
        let pipeline = self.pipeline()?;
        if pipeline.is_started() {
            return Err(EtlError::configuration(
                self.inner.owner.get(),
                "cannot link after the pipeline has started",
            ));
        }
        let port = target.input_port();
        tracing::debug!(from = %self.inner.owner.get(), to = %port.describe(), "link");
        target.add_predecessor_completion(&self.inner.source);
        lock(&self.inner.links).push(Link { target: port, predicate });
        Ok(())
    }

    pub fn link_count(&self) -> usize {
        lock(&self.inner.links).len()
    }

    pub(crate) fn pipeline(&self) -> Result<Pipeline, EtlError> {
        self.inner.pipeline.upgrade().ok_or_else(|| {
            EtlError::configuration(self.inner.owner.get(), "pipeline was dropped")
        })
    }

    pub(crate) fn emitter(&self) -> Emitter<T> {
        Emitter {
            links: lock(&self.inner.links).clone(),
            mode: self.inner.mode,
        }
    }
}

/// Frozen link set used by a running worker.
pub(crate) struct Emitter<T> {
    links: Vec<Link<T>>,
    mode: FanOut,
}

impl<T: Record> Emitter<T> {
    pub(crate) fn is_linked(&self) -> bool {
        !self.links.is_empty()
    }

    /// Route one row. Rows that no link accepts, or whose consumer has
    /// already stopped, are dropped.
    pub(crate) fn send(&self, row: T) {
        match self.mode {
            FanOut::Distribute => {
                if let Some(link) = self.links.iter().find(|l| l.accepts(&row)) {
                    link.target.send(row);
                }
            }
            FanOut::Broadcast => {
                let accepting: Vec<&Link<T>> = self.links.iter().filter(|l| l.accepts(&row)).collect();
                if let Some((last, rest)) = accepting.split_last() {
                    for link in rest {
                        link.target.send(row.clone());
                    }
                    last.target.send(row);
                }
            }
        }
    }

    pub(crate) fn send_all(&self, rows: impl IntoIterator<Item = T>) {
        for row in rows {
            self.send(row);
        }
    }
}

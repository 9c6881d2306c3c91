//! Bounded input endpoints with a fan-in completion barrier.
//!
//! Every input of a node is an [`InputPort`]: a bounded channel plus a count
//! of registered predecessor completions. The barrier opens once the pipeline
//! has been sealed (so no more predecessors can register) and every
//! registered predecessor has resolved. If all of them succeeded, a
//! `Complete` marker is queued behind the rows already in the channel.
//! Otherwise the port is faulted with the first error it recorded, and the
//! consumer sees that fault on its next receive, discarding whatever was
//! still buffered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::completion::Completion;
use crate::error::EtlError;
use crate::node::NodeLabel;
use crate::utils::lock;

pub(crate) enum Envelope<T> {
    Row(T),
    Complete,
    Fault(EtlError),
}

#[derive(Default)]
struct Barrier {
    registered: usize,
    resolved: usize,
    sealed: bool,
    finished: bool,
    first_error: Option<EtlError>,
}

impl Barrier {
    /// Outcome of the barrier once it is sealed and fully resolved.
    fn try_finish(&mut self) -> Option<Result<(), EtlError>> {
        if self.finished || !self.sealed || self.resolved < self.registered {
            return None;
        }
        self.finished = true;
        Some(match self.first_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        })
    }
}

pub(crate) struct PortInner<T> {
    label: NodeLabel,
    port: &'static str,
    tx: Sender<Envelope<T>>,
    barrier: Mutex<Barrier>,
    fault: Mutex<Option<EtlError>>,
    faulted: AtomicBool,
}

/// Sealing hook the pipeline calls on every port before workers start.
pub(crate) trait Seal: Send + Sync {
    fn seal(&self);
}

/// Input endpoint of a node. Clones share the same channel and barrier.
pub struct InputPort<T> {
    inner: Arc<PortInner<T>>,
}

impl<T> Clone for InputPort<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> InputPort<T> {
    pub(crate) fn new(label: NodeLabel, port: &'static str, capacity: usize) -> (Self, Inbox<T>) {
        let (tx, rx) = bounded(capacity.max(1));
        let inner = Arc::new(PortInner {
            label,
            port,
            tx,
            barrier: Mutex::new(Barrier::default()),
            fault: Mutex::new(None),
            faulted: AtomicBool::new(false),
        });
        let inbox = Inbox {
            rx,
            port: Arc::clone(&inner),
            finished: false,
        };
        (Self { inner }, inbox)
    }

    /// Register a predecessor whose completion this port must wait for.
    pub fn add_predecessor(&self, completion: &Completion) {
        lock(&self.inner.barrier).registered += 1;
        let inner = Arc::clone(&self.inner);
        completion.on_complete(move |result| inner.predecessor_resolved(result));
    }

    pub fn predecessor_count(&self) -> usize {
        lock(&self.inner.barrier).registered
    }

    /// Deliver a row, blocking while the buffer is full. Returns `false` when
    /// the consumer has already stopped; the row is dropped in that case.
    pub(crate) fn send(&self, row: T) -> bool {
        if self.inner.faulted.load(Ordering::Acquire) {
            return false;
        }
        self.inner.tx.send(Envelope::Row(row)).is_ok()
    }

    pub(crate) fn sealer(&self) -> Arc<dyn Seal> {
        Arc::clone(&self.inner) as Arc<dyn Seal>
    }

    pub(crate) fn describe(&self) -> String {
        format!("{}.{}", self.inner.label.get(), self.inner.port)
    }
}

impl<T: Send> PortInner<T> {
    fn predecessor_resolved(&self, result: &Result<(), EtlError>) {
        let outcome = {
            let mut b = lock(&self.barrier);
            b.resolved += 1;
            if let Err(e) = result {
                if b.first_error.is_none() {
                    b.first_error = Some(e.clone());
                }
            }
            b.try_finish()
        };
        self.settle(outcome);
    }

    fn settle(&self, outcome: Option<Result<(), EtlError>>) {
        match outcome {
            Some(Ok(())) => self.close(),
            Some(Err(e)) => self.fail(e),
            None => {}
        }
    }

    fn close(&self) {
        // A send error means the consumer is gone; nothing is left to notify.
        let _ = self.tx.send(Envelope::Complete);
    }

    fn fail(&self, error: EtlError) {
        tracing::debug!(port = %format!("{}.{}", self.label.get(), self.port), %error, "input port faulted");
        *lock(&self.fault) = Some(error.clone());
        self.faulted.store(true, Ordering::Release);
        // A full buffer is fine: the consumer checks the flag before each receive.
        let _ = self.tx.try_send(Envelope::Fault(error));
    }
}

impl<T: Send> Seal for PortInner<T> {
    fn seal(&self) {
        let outcome = {
            let mut b = lock(&self.barrier);
            b.sealed = true;
            if b.registered == 0 && !b.finished {
                tracing::warn!(
                    node = %self.label.get(),
                    port = self.port,
                    "input has no linked predecessors; completing it empty"
                );
            }
            b.try_finish()
        };
        self.settle(outcome);
    }
}

/// Receiving half of an [`InputPort`], owned by the node's worker.
pub(crate) struct Inbox<T> {
    rx: Receiver<Envelope<T>>,
    port: Arc<PortInner<T>>,
    finished: bool,
}

impl<T: Send> Inbox<T> {
    /// Next row, `Ok(None)` once every predecessor has completed, or the
    /// first predecessor fault.
    pub(crate) fn recv(&mut self) -> Result<Option<T>, EtlError> {
        if self.finished {
            return Ok(None);
        }
        if self.port.faulted.load(Ordering::Acquire) {
            return Err(self.take_fault());
        }
        match self.rx.recv() {
            Ok(Envelope::Row(row)) => Ok(Some(row)),
            Ok(Envelope::Complete) | Err(_) => {
                self.finished = true;
                Ok(None)
            }
            Ok(Envelope::Fault(_)) => Err(self.take_fault()),
        }
    }

    /// Buffer the whole stream.
    pub(crate) fn collect_all(&mut self) -> Result<Vec<T>, EtlError> {
        let mut out = Vec::new();
        while let Some(row) = self.recv()? {
            out.push(row);
        }
        Ok(out)
    }

    /// Consume and discard the rest of the stream; returns how many rows were
    /// dropped.
    pub(crate) fn drain(&mut self) -> Result<usize, EtlError> {
        let mut dropped = 0;
        while self.recv()?.is_some() {
            dropped += 1;
        }
        Ok(dropped)
    }

    pub(crate) fn predecessor_count(&self) -> usize {
        lock(&self.port.barrier).registered
    }

    fn take_fault(&mut self) -> EtlError {
        self.finished = true;
        let cause = lock(&self.port.fault)
            .clone()
            .unwrap_or(EtlError::Cancelled);
        EtlError::upstream(self.port.label.get(), cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_after_seal_and_all_predecessors() {
        let (port, mut inbox) = InputPort::<i32>::new(NodeLabel::new("t"), "input", 4);
        let a = Completion::new();
        let b = Completion::new();
        port.add_predecessor(&a);
        port.add_predecessor(&b);
        port.sealer().seal();
        assert!(port.send(1));
        a.resolve(Ok(()));
        assert_eq!(inbox.recv().unwrap(), Some(1));
        b.resolve(Ok(()));
        assert_eq!(inbox.recv().unwrap(), None);
    }

    #[test]
    fn fault_waits_for_remaining_predecessors() {
        let (port, mut inbox) = InputPort::<i32>::new(NodeLabel::new("t"), "input", 4);
        let a = Completion::new();
        let b = Completion::new();
        port.add_predecessor(&a);
        port.add_predecessor(&b);
        port.sealer().seal();
        a.resolve(Err(EtlError::Cancelled));
        assert!(port.send(1), "port stays open while b is running");
        assert_eq!(inbox.recv().unwrap(), Some(1));
        b.resolve(Ok(()));
        let err = inbox.recv().unwrap_err();
        assert!(matches!(err.root_cause(), EtlError::Cancelled));
    }

    #[test]
    fn first_fault_discards_buffered_rows() {
        let (port, mut inbox) = InputPort::<i32>::new(NodeLabel::new("t"), "input", 4);
        let a = Completion::new();
        port.add_predecessor(&a);
        port.sealer().seal();
        port.send(1);
        a.resolve(Err(EtlError::Cancelled));
        let err = inbox.recv().unwrap_err();
        assert!(matches!(err.root_cause(), EtlError::Cancelled));
        assert!(!port.send(2));
    }
}

//! Fixed-size batching for bulk-oriented destinations.
//!
//! [`Batcher`] is the plain accumulator; [`BatchDestination`] is a node that
//! feeds its input through a `Batcher` into a write callback, with an optional
//! `before_batch_write` hook that may rewrite each batch first.

use std::sync::{Arc, Mutex};

use crate::error::EtlError;
use crate::error_router::{ErrorRouter, ErrorSink, impl_error_source};
use crate::node::{NodeCore, impl_node, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::Record;
use crate::utils::lock;

/// Accumulates rows into batches of exactly `size`; only the final flush may
/// be shorter. Insertion order is preserved.
#[derive(Debug)]
pub struct Batcher<T> {
    size: usize,
    buf: Vec<T>,
}

impl<T> Batcher<T> {
    pub fn new(size: usize) -> Result<Self, EtlError> {
        if size == 0 {
            return Err(EtlError::configuration("Batcher", "batch size must be greater than zero"));
        }
        Ok(Self {
            size,
            buf: Vec::with_capacity(size),
        })
    }

    /// Add a row; returns the batch when it reaches `size`.
    pub fn push(&mut self, row: T) -> Option<Vec<T>> {
        self.buf.push(row);
        if self.buf.len() >= self.size {
            Some(std::mem::replace(&mut self.buf, Vec::with_capacity(self.size)))
        } else {
            None
        }
    }

    /// Take the remaining partial batch, if any.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Hook run on every batch before it is written. It may filter or rewrite
/// the batch in place.
pub type BatchHook<T> = Box<dyn FnMut(&mut Vec<T>) -> anyhow::Result<()> + Send>;

pub(crate) type HookSlot<T> = Arc<Mutex<Option<BatchHook<T>>>>;

/// Run `hook` and `write` on one batch. A failure is routed as a single
/// error record carrying the whole batch, or faults the node.
pub(crate) fn write_batch<T, W>(
    mut batch: Vec<T>,
    hook: &mut Option<BatchHook<T>>,
    write: &mut W,
    errors: &ErrorSink,
) -> Result<(), EtlError>
where
    T: Record,
    W: FnMut(&[T]) -> Result<(), EtlError>,
{
    if let Some(h) = hook.as_mut() {
        if let Err(e) = h(&mut batch) {
            return errors.route(&batch, e);
        }
    }
    if batch.is_empty() {
        return Ok(());
    }
    match write(&batch) {
        Ok(()) => Ok(()),
        Err(e @ EtlError::Unsupported(_)) => Err(e),
        Err(e) => errors.route_error(&batch, e),
    }
}

/// Destination that writes rows in batches through a user callback.
pub struct BatchDestination<T: Record> {
    core: NodeCore,
    input: InputPort<T>,
    errors: ErrorRouter,
    hook: HookSlot<T>,
}

impl<T: Record> BatchDestination<T> {
    pub fn new<W>(pipeline: &Pipeline, batch_size: usize, mut write: W) -> Result<Self, EtlError>
    where
        W: FnMut(&[T]) -> anyhow::Result<()> + Send + 'static,
    {
        let core = NodeCore::new(pipeline, "BatchDestination");
        let mut batcher = Batcher::new(batch_size)?;
        let (input, mut inbox) = core.input::<T>("input");
        let errors = ErrorRouter::new(&core);
        let hook: HookSlot<T> = Arc::new(Mutex::new(None));

        let error_router = errors.clone();
        let hook_slot = Arc::clone(&hook);
        core.launch(move |mut task| {
            task.logger.start();
            let errors = error_router.start(&task.name);
            let mut hook = lock(&hook_slot).take();
            let name = task.name.clone();
            let mut persist = |rows: &[T]| write(rows).map_err(|e| EtlError::processing(&name, e));
            while let Some(row) = inbox.recv()? {
                task.logger.row();
                if let Some(batch) = batcher.push(row) {
                    write_batch(batch, &mut hook, &mut persist, &errors)?;
                }
            }
            if let Some(batch) = batcher.flush() {
                write_batch(batch, &mut hook, &mut persist, &errors)?;
            }
            task.logger.end();
            Ok(())
        });

        Ok(Self {
            core,
            input,
            errors,
            hook,
        })
    }

    /// Install a hook that sees (and may rewrite) each batch before it is written.
    #[must_use]
    pub fn before_batch_write<H>(self, hook: H) -> Self
    where
        H: FnMut(&mut Vec<T>) -> anyhow::Result<()> + Send + 'static,
    {
        *lock(&self.hook) = Some(Box::new(hook));
        self
    }
}

impl_node!([T: Record] BatchDestination<T>);
impl_target!([T: Record] BatchDestination<T>, T);
impl_error_source!([T: Record] BatchDestination<T>);

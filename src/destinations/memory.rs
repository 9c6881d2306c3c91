use std::sync::{Arc, Mutex};

use crate::node::{NodeCore, impl_node, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::Record;
use crate::utils::lock;

/// Collects every row it receives, in arrival order.
pub struct MemoryDestination<T: Record> {
    core: NodeCore,
    input: InputPort<T>,
    data: Arc<Mutex<Vec<T>>>,
}

impl<T: Record> MemoryDestination<T> {
    pub fn new(pipeline: &Pipeline) -> Self {
        let core = NodeCore::new(pipeline, "MemoryDestination");
        let (input, mut inbox) = core.input::<T>("input");
        let data = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&data);
        core.launch(move |mut task| {
            task.logger.start();
            while let Some(row) = inbox.recv()? {
                lock(&sink).push(row);
                task.logger.row();
            }
            task.logger.end();
            Ok(())
        });

        Self { core, input, data }
    }

    /// Snapshot of the rows received so far.
    pub fn data(&self) -> Vec<T> {
        lock(&self.data).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.data).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.data).is_empty()
    }

    /// Move the received rows out, leaving the destination empty.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *lock(&self.data))
    }
}

impl_node!([T: Record] MemoryDestination<T>);
impl_target!([T: Record] MemoryDestination<T>, T);

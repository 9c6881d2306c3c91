use std::sync::{Arc, Mutex};

use crate::link::{FanOut, Output};
use crate::node::{NodeCore, impl_node, impl_source};
use crate::pipeline::Pipeline;
use crate::row::Record;
use crate::utils::lock;

/// Emits the rows of an in-memory collection, in order.
pub struct MemorySource<T: Record> {
    core: NodeCore,
    output: Output<T>,
    data: Arc<Mutex<Vec<T>>>,
}

impl<T: Record> MemorySource<T> {
    pub fn new(pipeline: &Pipeline, data: Vec<T>) -> Self {
        let core = NodeCore::new(pipeline, "MemorySource");
        let output = core.output::<T>(FanOut::Distribute);
        let data = Arc::new(Mutex::new(data));

        let out = output.clone();
        let rows = Arc::clone(&data);
        core.launch(move |mut task| {
            task.logger.start();
            let emit = out.emitter();
            let rows = std::mem::take(&mut *lock(&rows));
            for row in rows {
                task.check_cancelled()?;
                emit.send(row);
                task.logger.row();
            }
            task.logger.end();
            Ok(())
        });

        Self { core, output, data }
    }

    /// Append more rows before the pipeline starts.
    pub fn push(&self, row: T) {
        lock(&self.data).push(row);
    }
}

impl_node!([T: Record] MemorySource<T>);
impl_source!([T: Record] MemorySource<T>, T);

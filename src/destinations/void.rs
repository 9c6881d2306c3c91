use crate::node::{NodeCore, impl_node, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::Record;

/// Consumes and discards every row. Used to terminate branches whose rows
/// are not needed, so their producers can still complete.
pub struct VoidDestination<T: Record> {
    core: NodeCore,
    input: InputPort<T>,
}

impl<T: Record> VoidDestination<T> {
    pub fn new(pipeline: &Pipeline) -> Self {
        let core = NodeCore::new(pipeline, "VoidDestination");
        let (input, mut inbox) = core.input::<T>("input");
        core.launch(move |mut task| {
            while inbox.recv()?.is_some() {
                task.logger.row();
            }
            tracing::trace!(node = %task.name, rows = task.logger.rows(), "discarded");
            Ok(())
        });
        Self { core, input }
    }
}

impl_node!([T: Record] VoidDestination<T>);
impl_target!([T: Record] VoidDestination<T>, T);

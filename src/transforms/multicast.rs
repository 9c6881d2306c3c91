use crate::link::{FanOut, Output};
use crate::node::{NodeCore, impl_node, impl_source, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::Record;

/// Sends every input row to every linked branch.
///
/// Each branch receives its own clone, so a branch that mutates its rows does
/// not affect the others. Rows holding shared pointers (`Arc`, `Rc`) still
/// share what those point to.
pub struct Multicast<T: Record> {
    core: NodeCore,
    input: InputPort<T>,
    output: Output<T>,
}

impl<T: Record> Multicast<T> {
    pub fn new(pipeline: &Pipeline) -> Self {
        let core = NodeCore::new(pipeline, "Multicast");
        let (input, mut inbox) = core.input::<T>("input");
        let output = core.output::<T>(FanOut::Broadcast);

        let out = output.clone();
        core.launch(move |mut task| {
            task.logger.start();
            let emit = out.emitter();
            while let Some(row) = inbox.recv()? {
                emit.send(row);
                task.logger.row();
            }
            task.logger.end();
            Ok(())
        });

        Self { core, input, output }
    }
}

impl_node!([T: Record] Multicast<T>);
impl_target!([T: Record] Multicast<T>, T);
impl_source!([T: Record] Multicast<T>, T);

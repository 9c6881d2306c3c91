use crate::error::EtlError;
use crate::link::{FanOut, Output};
use crate::node::{NodeCore, impl_node, impl_source, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::Record;

/// Buffers the whole input, then transforms it in one call.
///
/// Nothing is emitted until every predecessor has completed. Use it when a
/// transformation needs the full set, such as deduplication or re-ordering.
pub struct BlockTransformation<In: Record, Out: Record> {
    core: NodeCore,
    input: InputPort<In>,
    output: Output<Out>,
}

impl<In: Record, Out: Record> BlockTransformation<In, Out> {
    pub fn new<F>(pipeline: &Pipeline, f: F) -> Self
    where
        F: FnOnce(Vec<In>) -> anyhow::Result<Vec<Out>> + Send + 'static,
    {
        let core = NodeCore::new(pipeline, "BlockTransformation");
        let (input, mut inbox) = core.input::<In>("input");
        let output = core.output::<Out>(FanOut::Distribute);

        let out = output.clone();
        core.launch(move |mut task| {
            task.logger.start();
            let emit = out.emitter();
            let buffered = inbox.collect_all()?;
            let transformed = f(buffered).map_err(|e| EtlError::processing(&task.name, e))?;
            for row in transformed {
                emit.send(row);
                task.logger.row();
            }
            task.logger.end();
            Ok(())
        });

        Self { core, input, output }
    }
}

impl_node!([In: Record, Out: Record] BlockTransformation<In, Out>);
impl_target!([In: Record, Out: Record] BlockTransformation<In, Out>, In);
impl_source!([In: Record, Out: Record] BlockTransformation<In, Out>, Out);

use crate::error::EtlError;
use crate::error_router::{ErrorRouter, impl_error_source};
use crate::link::{FanOut, Output};
use crate::node::{NodeCore, impl_node, impl_source};
use crate::pipeline::Pipeline;
use crate::row::Record;

/// Source driven by two callbacks: `read` produces the next row and
/// `is_done` says when to stop. `is_done` is asked before every read.
///
/// A failing `read` is routed to the error sink (with an empty record) or
/// faults the source.
pub struct CustomSource<T: Record> {
    core: NodeCore,
    output: Output<T>,
    errors: ErrorRouter,
}

impl<T: Record> CustomSource<T> {
    pub fn new<R, D>(pipeline: &Pipeline, mut read: R, mut is_done: D) -> Self
    where
        R: FnMut() -> anyhow::Result<T> + Send + 'static,
        D: FnMut() -> bool + Send + 'static,
    {
        let core = NodeCore::new(pipeline, "CustomSource");
        let output = core.output::<T>(FanOut::Distribute);
        let errors = ErrorRouter::new(&core);

        let out = output.clone();
        let error_router = errors.clone();
        core.launch(move |mut task| {
            task.logger.start();
            let emit = out.emitter();
            let errors = error_router.start(&task.name);
            while !is_done() {
                task.check_cancelled()?;
                match read() {
                    Ok(row) => emit.send(row),
                    Err(e) => errors.route_raw("", EtlError::processing(&task.name, e))?,
                }
                task.logger.row();
            }
            task.logger.end();
            Ok(())
        });

        Self { core, output, errors }
    }
}

impl_node!([T: Record] CustomSource<T>);
impl_source!([T: Record] CustomSource<T>, T);
impl_error_source!([T: Record] CustomSource<T>);

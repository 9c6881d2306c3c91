use crate::error_router::{ErrorRouter, impl_error_source};
use crate::node::{NodeCore, impl_node, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::Record;

/// Hands every row to a callback.
pub struct CustomDestination<T: Record> {
    core: NodeCore,
    input: InputPort<T>,
    errors: ErrorRouter,
}

impl<T: Record> CustomDestination<T> {
    pub fn new<W>(pipeline: &Pipeline, mut write: W) -> Self
    where
        W: FnMut(T) -> anyhow::Result<()> + Send + 'static,
    {
        let core = NodeCore::new(pipeline, "CustomDestination");
        let (input, mut inbox) = core.input::<T>("input");
        let errors = ErrorRouter::new(&core);

        let error_router = errors.clone();
        core.launch(move |mut task| {
            task.logger.start();
            let errors = error_router.start(&task.name);
            while let Some(row) = inbox.recv()? {
                let snapshot = errors.is_attached().then(|| row.clone());
                if let Err(e) = write(row) {
                    errors.route(&snapshot, e)?;
                }
                task.logger.row();
            }
            task.logger.end();
            Ok(())
        });

        Self { core, input, errors }
    }
}

impl_node!([T: Record] CustomDestination<T>);
impl_target!([T: Record] CustomDestination<T>, T);
impl_error_source!([T: Record] CustomDestination<T>);

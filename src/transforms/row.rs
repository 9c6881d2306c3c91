use std::sync::{Arc, Mutex, OnceLock};

use crate::error::EtlError;
use crate::error_router::{ErrorRouter, impl_error_source};
use crate::link::{FanOut, Output};
use crate::node::{NodeCore, impl_node, impl_source, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::Record;
use crate::utils::lock;

type InitFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Streams each row through a function, one output per input, in order.
///
/// A failing row goes to the error sink when one is linked; otherwise it
/// faults the node.
pub struct RowTransformation<In: Record, Out: Record> {
    core: NodeCore,
    input: InputPort<In>,
    output: Output<Out>,
    errors: ErrorRouter,
    init: Arc<Mutex<Option<InitFn>>>,
}

impl<In: Record, Out: Record> RowTransformation<In, Out> {
    pub fn new<F>(pipeline: &Pipeline, mut f: F) -> Self
    where
        F: FnMut(In) -> anyhow::Result<Out> + Send + 'static,
    {
        let core = NodeCore::new(pipeline, "RowTransformation");
        let (input, mut inbox) = core.input::<In>("input");
        let output = core.output::<Out>(FanOut::Distribute);
        let errors = ErrorRouter::new(&core);
        let init: Arc<Mutex<Option<InitFn>>> = Arc::new(Mutex::new(None));

        let out = output.clone();
        let error_router = errors.clone();
        let init_slot = Arc::clone(&init);
        core.launch(move |mut task| {
            task.logger.start();
            let emit = out.emitter();
            let errors = error_router.start(&task.name);
            let mut init = lock(&init_slot).take();
            let ready: OnceLock<Result<(), EtlError>> = OnceLock::new();

            while let Some(row) = inbox.recv()? {
                let initialized = ready.get_or_init(|| match init.take() {
                    Some(hook) => hook().map_err(|e| EtlError::processing(&task.name, e)),
                    None => Ok(()),
                });
                if let Err(e) = initialized {
                    return Err(e.clone());
                }
                let snapshot = errors.is_attached().then(|| row.clone());
                match f(row) {
                    Ok(mapped) => emit.send(mapped),
                    Err(e) => errors.route(&snapshot, e)?,
                }
                task.logger.row();
            }
            task.logger.end();
            Ok(())
        });

        Self {
            core,
            input,
            output,
            errors,
            init,
        }
    }

    /// Infallible per-row mapping.
    pub fn map<F>(pipeline: &Pipeline, f: F) -> Self
    where
        F: Fn(In) -> Out + Send + 'static,
    {
        Self::new(pipeline, move |row| Ok(f(row)))
    }

    /// Run `init` once, lazily, before the first row is transformed.
    #[must_use]
    pub fn with_init<I>(self, init: I) -> Self
    where
        I: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        *lock(&self.init) = Some(Box::new(init));
        self
    }
}

impl_node!([In: Record, Out: Record] RowTransformation<In, Out>);
impl_target!([In: Record, Out: Record] RowTransformation<In, Out>, In);
impl_source!([In: Record, Out: Record] RowTransformation<In, Out>, Out);
impl_error_source!([In: Record, Out: Record] RowTransformation<In, Out>);

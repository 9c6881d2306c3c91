use crate::error_router::{ErrorRouter, impl_error_source};
use crate::link::{FanOut, Output};
use crate::node::{NodeCore, PortTarget, impl_node, impl_source};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::Record;

/// Zips two pre-ordered streams pairwise and combines each pair.
///
/// The k-th left row is joined with the k-th right row; no key matching is
/// done, so both inputs must already be ordered consistently. Once either
/// side runs out, the surplus rows of the other side are consumed and
/// dropped.
pub struct MergeJoin<L: Record, R: Record, Out: Record> {
    core: NodeCore,
    left: InputPort<L>,
    right: InputPort<R>,
    output: Output<Out>,
    errors: ErrorRouter,
}

impl<L: Record, R: Record, Out: Record> MergeJoin<L, R, Out> {
    pub fn new<F>(pipeline: &Pipeline, mut join: F) -> Self
    where
        F: FnMut(L, R) -> anyhow::Result<Out> + Send + 'static,
    {
        let core = NodeCore::new(pipeline, "MergeJoin");
        let (left, mut left_inbox) = core.input::<L>("left");
        let (right, mut right_inbox) = core.input::<R>("right");
        let output = core.output::<Out>(FanOut::Distribute);
        let errors = ErrorRouter::new(&core);

        let out = output.clone();
        let error_router = errors.clone();
        core.launch(move |mut task| {
            task.logger.start();
            let emit = out.emitter();
            let errors = error_router.start(&task.name);

            loop {
                let Some(l) = left_inbox.recv()? else { break };
                let Some(r) = right_inbox.recv()? else {
                    // `l` has no partner; count it with the rest of the left surplus.
                    let dropped = 1 + left_inbox.drain()?;
                    tracing::debug!(node = %task.name, dropped, "right input ended first");
                    task.logger.end();
                    return Ok(());
                };
                let snapshot = errors.is_attached().then(|| (l.clone(), r.clone()));
                match join(l, r) {
                    Ok(joined) => emit.send(joined),
                    Err(e) => errors.route(&snapshot, e)?,
                }
                task.logger.row();
            }
            let dropped = right_inbox.drain()?;
            if dropped > 0 {
                tracing::debug!(node = %task.name, dropped, "left input ended first");
            }
            task.logger.end();
            Ok(())
        });

        Self {
            core,
            left,
            right,
            output,
            errors,
        }
    }

    pub fn left(&self) -> PortTarget<L> {
        self.core.target(&self.left)
    }

    pub fn right(&self) -> PortTarget<R> {
        self.core.target(&self.right)
    }
}

impl_node!([L: Record, R: Record, Out: Record] MergeJoin<L, R, Out>);
impl_source!([L: Record, R: Record, Out: Record] MergeJoin<L, R, Out>, Out);
impl_error_source!([L: Record, R: Record, Out: Record] MergeJoin<L, R, Out>);

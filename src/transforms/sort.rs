use std::cmp::Ordering;

use rayon::slice::ParallelSliceMut;

use crate::link::{FanOut, Output};
use crate::node::{NodeCore, impl_node, impl_source, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::{FieldRef, Record, Row};

/// Buffers the whole input, sorts it with a comparator, and flushes it.
///
/// The sort is stable. Inputs longer than `sort_parallel_threshold` are
/// sorted on the rayon pool.
pub struct Sort<T: Record> {
    core: NodeCore,
    input: InputPort<T>,
    output: Output<T>,
}

impl<T: Record> Sort<T> {
    pub fn new<C>(pipeline: &Pipeline, compare: C) -> Self
    where
        C: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        let core = NodeCore::new(pipeline, "Sort");
        let (input, mut inbox) = core.input::<T>("input");
        let output = core.output::<T>(FanOut::Distribute);
        let threshold = core.ctx.config().sort_parallel_threshold;

        let out = output.clone();
        core.launch(move |mut task| {
            task.logger.start();
            let emit = out.emitter();
            let mut rows = inbox.collect_all()?;
            if rows.len() > threshold {
                rows.par_sort_by(|a, b| compare(a, b));
            } else {
                rows.sort_by(|a, b| compare(a, b));
            }
            for row in rows {
                emit.send(row);
                task.logger.row();
            }
            task.logger.end();
            Ok(())
        });

        Self { core, input, output }
    }
}

impl<T: Row> Sort<T> {
    /// Ascending sort on the given fields, compared in order. Values of
    /// incomparable kinds are treated as equal.
    pub fn by_fields(pipeline: &Pipeline, fields: Vec<FieldRef>) -> Self {
        let acc = T::accessor();
        Self::new(pipeline, move |a, b| {
            for f in &fields {
                let ord = match (acc.get(a, f), acc.get(b, f)) {
                    (Some(x), Some(y)) => x.compare(&y).unwrap_or(Ordering::Equal),
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        })
    }
}

impl_node!([T: Record] Sort<T>);
impl_target!([T: Record] Sort<T>, T);
impl_source!([T: Record] Sort<T>, T);

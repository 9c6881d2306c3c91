use crate::error::EtlError;
use crate::error_router::{ErrorRouter, impl_error_source};
use crate::link::{FanOut, Output};
use crate::node::{NodeCore, PortTarget, impl_node, impl_source, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::{FieldRef, Record, Row};

/// Declarative lookup: which fields identify a matching side row and which
/// side fields are copied onto the primary row.
#[derive(Clone, Debug, Default)]
pub struct LookupSchema {
    /// `(primary field, side field)` pairs that must all be equal.
    pub matches: Vec<(FieldRef, FieldRef)>,
    /// `(side field, primary field)` pairs copied on a match.
    pub retrieves: Vec<(FieldRef, FieldRef)>,
}

impl LookupSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn match_on(mut self, primary: impl Into<FieldRef>, side: impl Into<FieldRef>) -> Self {
        self.matches.push((primary.into(), side.into()));
        self
    }

    #[must_use]
    pub fn retrieve(mut self, side: impl Into<FieldRef>, primary: impl Into<FieldRef>) -> Self {
        self.retrieves.push((side.into(), primary.into()));
        self
    }
}

/// Enriches primary rows from a side source held entirely in memory.
///
/// The side input is drained completely before the first primary row is
/// processed. Matching is a linear scan over the side rows, so the side
/// source should be small enough to hold in memory. Do not feed the side
/// input from the same branch as the primary input: the primary producer
/// would block on a full buffer while the side is still being read.
pub struct LookupTransformation<In: Record, Side: Record, Out: Record> {
    core: NodeCore,
    input: InputPort<In>,
    side: InputPort<Side>,
    output: Output<Out>,
    errors: ErrorRouter,
}

impl<In: Record, Side: Record, Out: Record> LookupTransformation<In, Side, Out> {
    pub fn new<F>(pipeline: &Pipeline, mut f: F) -> Self
    where
        F: FnMut(In, &[Side]) -> anyhow::Result<Out> + Send + 'static,
    {
        let core = NodeCore::new(pipeline, "LookupTransformation");
        let (input, mut inbox) = core.input::<In>("input");
        let (side, mut side_inbox) = core.input::<Side>("side");
        let output = core.output::<Out>(FanOut::Distribute);
        let errors = ErrorRouter::new(&core);

        let out = output.clone();
        let error_router = errors.clone();
        core.launch(move |mut task| {
            task.logger.start();
            if side_inbox.predecessor_count() == 0 {
                return Err(EtlError::configuration(&task.name, "no lookup source is linked to the side input"));
            }
            let emit = out.emitter();
            let errors = error_router.start(&task.name);
            let lookup = side_inbox.collect_all()?;
            tracing::debug!(node = %task.name, rows = lookup.len(), "lookup source loaded");

            while let Some(row) = inbox.recv()? {
                let snapshot = errors.is_attached().then(|| row.clone());
                match f(row, &lookup) {
                    Ok(enriched) => emit.send(enriched),
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
            side,
            output,
            errors,
        }
    }

    /// Link target for the side source.
    pub fn side_input(&self) -> PortTarget<Side> {
        self.core.target(&self.side)
    }
}

impl<T: Row, Side: Row> LookupTransformation<T, Side, T> {
    /// Lookup driven by match/retrieve field pairs. A primary row without a
    /// matching side row passes through unchanged.
    pub fn with_schema(pipeline: &Pipeline, schema: LookupSchema) -> Result<Self, EtlError> {
        if schema.matches.is_empty() || schema.retrieves.is_empty() {
            return Err(EtlError::configuration(
                "LookupTransformation",
                "define a transformation function or match/retrieve fields",
            ));
        }
        let row_acc = T::accessor();
        let side_acc = Side::accessor();
        Ok(Self::new(pipeline, move |mut row: T, lookup: &[Side]| {
            let found = lookup.iter().find(|candidate| {
                schema.matches.iter().all(|(pf, sf)| match (row_acc.get(&row, pf), side_acc.get(candidate, sf)) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                })
            });
            if let Some(hit) = found {
                for (sf, pf) in &schema.retrieves {
                    let v = side_acc.require(hit, sf)?;
                    row_acc.set(&mut row, pf, v)?;
                }
            }
            Ok(row)
        }))
    }
}

impl_node!([In: Record, Side: Record, Out: Record] LookupTransformation<In, Side, Out>);
impl_target!([In: Record, Side: Record, Out: Record] LookupTransformation<In, Side, Out>, In);
impl_source!([In: Record, Side: Record, Out: Record] LookupTransformation<In, Side, Out>, Out);
impl_error_source!([In: Record, Side: Record, Out: Record] LookupTransformation<In, Side, Out>);

use std::collections::HashMap;
use std::sync::Arc;

use crate::combiners::{CombineFn, Count, DecimalAcc, DecimalCombiner, Max, Min, Sum};
use crate::error::EtlError;
use crate::error_router::{ErrorRouter, impl_error_source};
use crate::link::{FanOut, Output};
use crate::node::{NodeCore, impl_node, impl_source, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::{FieldRef, Record, Row, RowAccessor, ShapeKind};
use crate::value::Value;

/// Accumulation applied to one aggregate field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregationMethod {
    Sum,
    Min,
    Max,
    Count,
}

impl AggregationMethod {
    fn combiner(self) -> Box<DecimalCombiner> {
        match self {
            AggregationMethod::Sum => Box::new(Sum),
            AggregationMethod::Min => Box::new(Min),
            AggregationMethod::Max => Box::new(Max),
            AggregationMethod::Count => Box::new(Count),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AggregateField {
    pub input: FieldRef,
    pub output: FieldRef,
    pub method: AggregationMethod,
}

/// Declares how input rows are grouped and what is accumulated per group.
#[derive(Clone, Debug, Default)]
pub struct AggregationSchema {
    /// `(input field, output field)` pairs forming the group key.
    pub group_fields: Vec<(FieldRef, FieldRef)>,
    pub aggregates: Vec<AggregateField>,
}

impl AggregationSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Group by a field that keeps its name on the output row.
    #[must_use]
    pub fn group_by(self, field: impl Into<FieldRef>) -> Self {
        let f = field.into();
        self.group_by_as(f.clone(), f)
    }

    #[must_use]
    pub fn group_by_as(mut self, input: impl Into<FieldRef>, output: impl Into<FieldRef>) -> Self {
        self.group_fields.push((input.into(), output.into()));
        self
    }

    #[must_use]
    pub fn aggregate(
        mut self,
        input: impl Into<FieldRef>,
        output: impl Into<FieldRef>,
        method: AggregationMethod,
    ) -> Self {
        self.aggregates.push(AggregateField {
            input: input.into(),
            output: output.into(),
            method,
        });
        self
    }
}

/// Structural key of a group: the grouping field values in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GroupKey(pub Vec<Value>);

impl GroupKey {
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

/// Groups in first-seen order.
struct GroupTable<S> {
    index: HashMap<GroupKey, usize>,
    groups: Vec<(GroupKey, S)>,
}

impl<S> GroupTable<S> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    fn entry(&mut self, key: GroupKey, create: impl FnOnce() -> S) -> &mut S {
        let idx = match self.index.get(&key) {
            Some(i) => *i,
            None => {
                let i = self.groups.len();
                self.index.insert(key.clone(), i);
                self.groups.push((key, create()));
                i
            }
        };
        &mut self.groups[idx].1
    }

    fn len(&self) -> usize {
        self.groups.len()
    }

    fn into_groups(self) -> Vec<(GroupKey, S)> {
        self.groups
    }
}

struct Accumulators {
    accs: Vec<DecimalAcc>,
    /// First non-null input per aggregate; decides the output numeric kind.
    templates: Vec<Option<Value>>,
}

fn check_output_shape<Out: Row>(core: &NodeCore, acc: &Arc<dyn RowAccessor<Out>>) -> Result<(), EtlError> {
    if acc.kind() == ShapeKind::Array {
        return Err(EtlError::configuration(
            core.label.get(),
            "aggregation output must have named fields; array rows are not supported",
        ));
    }
    Ok(())
}

/// Groups rows and accumulates per group; emits one row per group, in
/// first-seen order, after the input completes.
pub struct Aggregation<In: Record, Out: Row> {
    core: NodeCore,
    input: InputPort<In>,
    output: Output<Out>,
    errors: ErrorRouter,
}

impl<In: Row, Out: Row> Aggregation<In, Out> {
    /// Schema-driven aggregation with decimal accumulators.
    pub fn new(pipeline: &Pipeline, schema: AggregationSchema) -> Result<Self, EtlError> {
        let core = NodeCore::new(pipeline, "Aggregation");
        let in_acc = In::accessor();
        let out_acc = Out::accessor();
        check_output_shape(&core, &out_acc)?;

        let (input, mut inbox) = core.input::<In>("input");
        let output = core.output::<Out>(FanOut::Distribute);
        let errors = ErrorRouter::new(&core);
        let combiners: Vec<Box<DecimalCombiner>> =
            schema.aggregates.iter().map(|a| a.method.combiner()).collect();

        let out = output.clone();
        let error_router = errors.clone();
        core.launch(move |mut task| {
            task.logger.start();
            let emit = out.emitter();
            let errors = error_router.start(&task.name);
            let mut table: GroupTable<Accumulators> = GroupTable::new();

            while let Some(row) = inbox.recv()? {
                task.logger.row();
                let read = || -> Result<(GroupKey, Vec<(DecimalAcc, Value)>), EtlError> {
                    let key = schema
                        .group_fields
                        .iter()
                        .map(|(f, _)| in_acc.require(&row, f))
                        .collect::<Result<Vec<_>, _>>()?;
                    let mut inputs = Vec::with_capacity(schema.aggregates.len());
                    for a in &schema.aggregates {
                        if a.method == AggregationMethod::Count {
                            inputs.push((None, Value::Null));
                            continue;
                        }
                        let v = in_acc.require(&row, &a.input)?;
                        inputs.push((v.to_decimal()?, v));
                    }
                    Ok((GroupKey(key), inputs))
                };
                let (key, inputs) = match read() {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        errors.route_error(&row, e)?;
                        continue;
                    }
                };
                let state = table.entry(key, || Accumulators {
                    accs: combiners.iter().map(|c| c.create()).collect(),
                    templates: vec![None; combiners.len()],
                });
                for (i, (dec, raw)) in inputs.into_iter().enumerate() {
                    combiners[i].add_input(&mut state.accs[i], dec);
                    if state.templates[i].is_none() && !raw.is_null() {
                        state.templates[i] = Some(raw);
                    }
                }
            }

            tracing::debug!(node = %task.name, groups = table.len(), "aggregation drained");
            let width = schema.group_fields.len() + schema.aggregates.len();
            for (key, state) in table.into_groups() {
                let mut row = out_acc.new_row(width);
                for ((_, out_field), v) in schema.group_fields.iter().zip(key.0) {
                    out_acc.set(&mut row, out_field, v)?;
                }
                let finished = state.accs.into_iter().zip(state.templates);
                for (i, (acc, template)) in finished.enumerate() {
                    let agg = &schema.aggregates[i];
                    let value = match (combiners[i].finish(acc), agg.method) {
                        (None, _) => Value::Null,
                        (Some(d), AggregationMethod::Count) => Value::from_decimal_like(d, &Value::Int(0)),
                        (Some(d), _) => Value::from_decimal_like(d, template.as_ref().unwrap_or(&Value::Null)),
                    };
                    out_acc.set(&mut row, &agg.output, value)?;
                }
                emit.send(row);
            }
            task.logger.end();
            Ok(())
        });

        Ok(Self {
            core,
            input,
            output,
            errors,
        })
    }
}

impl<In: Record, Out: Row> Aggregation<In, Out> {
    /// Aggregation with caller-supplied grouping, accumulation and key-store
    /// functions.
    ///
    /// `aggregate` folds an input row into its group's output row; `store_key`
    /// writes the group key onto the output row right before emission.
    pub fn with_functions<G, A, K>(
        pipeline: &Pipeline,
        group: G,
        mut aggregate: A,
        store_key: K,
    ) -> Result<Self, EtlError>
    where
        G: Fn(&In) -> GroupKey + Send + 'static,
        A: FnMut(&In, &mut Out) -> anyhow::Result<()> + Send + 'static,
        K: Fn(&GroupKey, &mut Out) + Send + 'static,
    {
        let core = NodeCore::new(pipeline, "Aggregation");
        let out_acc = Out::accessor();
        check_output_shape(&core, &out_acc)?;

        let (input, mut inbox) = core.input::<In>("input");
        let output = core.output::<Out>(FanOut::Distribute);
        let errors = ErrorRouter::new(&core);

        let out = output.clone();
        let error_router = errors.clone();
        core.launch(move |mut task| {
            task.logger.start();
            let emit = out.emitter();
            let errors = error_router.start(&task.name);
            let mut table: GroupTable<Out> = GroupTable::new();

            while let Some(row) = inbox.recv()? {
                task.logger.row();
                let key = group(&row);
                let acc_row = table.entry(key, || out_acc.new_row(0));
                // Fold into a copy so a failing row leaves the group untouched.
                let mut updated = acc_row.clone();
                match aggregate(&row, &mut updated) {
                    Ok(()) => *acc_row = updated,
                    Err(e) => errors.route(&row, e)?,
                }
            }

            for (key, mut row) in table.into_groups() {
                store_key(&key, &mut row);
                emit.send(row);
            }
            task.logger.end();
            Ok(())
        });

        Ok(Self {
            core,
            input,
            output,
            errors,
        })
    }
}

impl_node!([In: Record, Out: Row] Aggregation<In, Out>);
impl_target!([In: Record, Out: Row] Aggregation<In, Out>, In);
impl_source!([In: Record, Out: Row] Aggregation<In, Out>, Out);
impl_error_source!([In: Record, Out: Row] Aggregation<In, Out>);

use std::fmt;
use std::io::BufReader;
use std::marker::PhantomData;

use serde::de::{self, DeserializeOwned, SeqAccess, Visitor};
use serde::Deserializer as _;

use crate::config::PipelineContext;
use crate::error::EtlError;
use crate::error_router::{ErrorRouter, ErrorSink, impl_error_source};
use crate::io::Resource;
use crate::link::{Emitter, FanOut, Output};
use crate::logging::TaskLogger;
use crate::node::{NodeCore, impl_node, impl_source};
use crate::pipeline::Pipeline;
use crate::row::Record;

/// Streams the elements of a top-level JSON array.
///
/// Elements are parsed one at a time, so the array is never held in memory.
/// An element that is valid JSON but does not fit `T` goes to the error
/// output; malformed JSON stops the source.
pub struct JsonSource<T: Record + DeserializeOwned> {
    core: NodeCore,
    output: Output<T>,
    errors: ErrorRouter,
}

impl<T: Record + DeserializeOwned> JsonSource<T> {
    pub fn new(pipeline: &Pipeline, resource: impl Into<Resource>) -> Self {
        let core = NodeCore::new(pipeline, "JsonSource");
        let output = core.output::<T>(FanOut::Distribute);
        let errors = ErrorRouter::new(&core);
        let resource = resource.into();

        let out = output.clone();
        let error_router = errors.clone();
        core.launch(move |mut task| {
            task.logger.start();
            let reader = resource.open_read()?;
            let mut state = ElementState {
                emit: out.emitter(),
                errors: error_router.start(&task.name),
                logger: &mut task.logger,
                ctx: &task.ctx,
                failure: None,
            };
            let mut de = serde_json::Deserializer::from_reader(BufReader::new(reader));
            let parsed = (&mut de)
                .deserialize_seq(ArrayVisitor {
                    state: &mut state,
                    rows: PhantomData,
                })
                .and_then(|()| de.end());
            if let Err(e) = parsed {
                return Err(state.failure.take().unwrap_or_else(|| EtlError::io(resource.to_string(), e)));
            }
            drop(state);
            task.logger.end();
            Ok(())
        });

        Self { core, output, errors }
    }
}

struct ElementState<'a, T> {
    emit: Emitter<T>,
    errors: ErrorSink,
    logger: &'a mut TaskLogger,
    ctx: &'a PipelineContext,
    /// Engine error that aborted the visit; serde only carries its text.
    failure: Option<EtlError>,
}

impl<T: Record + DeserializeOwned> ElementState<'_, T> {
    fn accept(&mut self, element: serde_json::Value) -> Result<(), EtlError> {
        self.ctx.cancellation().check()?;
        self.logger.row();
        match serde_json::from_value::<T>(element.clone()) {
            Ok(row) => {
                self.emit.send(row);
                Ok(())
            }
            Err(e) => self.errors.route_raw(&element.to_string(), EtlError::Field(e.to_string())),
        }
    }
}

struct ArrayVisitor<'s, 'a, T> {
    state: &'s mut ElementState<'a, T>,
    rows: PhantomData<T>,
}

impl<'de, T: Record + DeserializeOwned> Visitor<'de> for ArrayVisitor<'_, '_, T> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(element) = seq.next_element::<serde_json::Value>()? {
            if let Err(e) = self.state.accept(element) {
                let text = e.to_string();
                self.state.failure = Some(e);
                return Err(de::Error::custom(text));
            }
        }
        Ok(())
    }
}

impl_node!([T: Record + DeserializeOwned] JsonSource<T>);
impl_source!([T: Record + DeserializeOwned] JsonSource<T>, T);
impl_error_source!([T: Record + DeserializeOwned] JsonSource<T>);

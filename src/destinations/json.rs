use std::io::Write;

use crate::error::EtlError;
use crate::error_router::{ErrorRouter, impl_error_source};
use crate::io::Resource;
use crate::node::{NodeCore, impl_node, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::Record;

/// Writes every row as one element of a top-level JSON array.
///
/// The array is written incrementally. A row that fails to serialize goes to
/// the error output and is left out of the array.
pub struct JsonDestination<T: Record> {
    core: NodeCore,
    input: InputPort<T>,
    errors: ErrorRouter,
}

impl<T: Record> JsonDestination<T> {
    pub fn new(pipeline: &Pipeline, resource: impl Into<Resource>) -> Self {
        let core = NodeCore::new(pipeline, "JsonDestination");
        let (input, mut inbox) = core.input::<T>("input");
        let errors = ErrorRouter::new(&core);
        let resource = resource.into();

        let error_router = errors.clone();
        core.launch(move |mut task| {
            task.logger.start();
            let errors = error_router.start(&task.name);
            let name = resource.to_string();
            let io_err = |e: std::io::Error| EtlError::io(&name, e);
            let mut w = resource.open_write()?;
            w.write_all(b"[").map_err(io_err)?;
            let mut first = true;
            while let Some(row) = inbox.recv()? {
                task.logger.row();
                let bytes = match serde_json::to_vec(&row) {
                    Ok(b) => b,
                    Err(e) => {
                        errors.route_error(&row, EtlError::Field(e.to_string()))?;
                        continue;
                    }
                };
                if !first {
                    w.write_all(b",").map_err(io_err)?;
                }
                first = false;
                w.write_all(&bytes).map_err(io_err)?;
            }
            w.write_all(b"]").map_err(io_err)?;
            w.flush().map_err(io_err)?;
            task.logger.end();
            Ok(())
        });

        Self { core, input, errors }
    }
}

impl_node!([T: Record] JsonDestination<T>);
impl_target!([T: Record] JsonDestination<T>, T);
impl_error_source!([T: Record] JsonDestination<T>);

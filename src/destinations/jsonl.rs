use std::io::Write;

use crate::error::EtlError;
use crate::error_router::{ErrorRouter, impl_error_source};
use crate::io::Resource;
use crate::node::{NodeCore, impl_node, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::Record;

/// Writes one JSON document per line.
pub struct JsonlDestination<T: Record> {
    core: NodeCore,
    input: InputPort<T>,
    errors: ErrorRouter,
}

impl<T: Record> JsonlDestination<T> {
    pub fn new(pipeline: &Pipeline, resource: impl Into<Resource>) -> Self {
        let core = NodeCore::new(pipeline, "JsonlDestination");
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
            while let Some(row) = inbox.recv()? {
                task.logger.row();
                match serde_json::to_vec(&row) {
                    Ok(mut line) => {
                        line.push(b'\n');
                        w.write_all(&line).map_err(io_err)?;
                    }
                    Err(e) => errors.route_error(&row, EtlError::Field(e.to_string()))?,
                }
            }
            w.flush().map_err(io_err)?;
            task.logger.end();
            Ok(())
        });

        Self { core, input, errors }
    }
}

impl_node!([T: Record] JsonlDestination<T>);
impl_target!([T: Record] JsonlDestination<T>, T);
impl_error_source!([T: Record] JsonlDestination<T>);

use std::io::{BufRead, BufReader};

use serde::de::DeserializeOwned;

use crate::error::EtlError;
use crate::error_router::{ErrorRouter, impl_error_source};
use crate::io::Resource;
use crate::link::{FanOut, Output};
use crate::node::{NodeCore, impl_node, impl_source};
use crate::pipeline::Pipeline;
use crate::row::Record;

/// Reads newline-delimited JSON, one row per non-blank line.
///
/// A line that fails to parse into `T` goes to the error output with the raw
/// line as its record text.
pub struct JsonlSource<T: Record + DeserializeOwned> {
    core: NodeCore,
    output: Output<T>,
    errors: ErrorRouter,
}

impl<T: Record + DeserializeOwned> JsonlSource<T> {
    pub fn new(pipeline: &Pipeline, resource: impl Into<Resource>) -> Self {
        let core = NodeCore::new(pipeline, "JsonlSource");
        let output = core.output::<T>(FanOut::Distribute);
        let errors = ErrorRouter::new(&core);
        let resource = resource.into();

        let out = output.clone();
        let error_router = errors.clone();
        core.launch(move |mut task| {
            task.logger.start();
            let emit = out.emitter();
            let errors = error_router.start(&task.name);
            let reader = BufReader::new(resource.open_read()?);
            for (i, line) in reader.lines().enumerate() {
                let line = line.map_err(|e| EtlError::io(resource.to_string(), e))?;
                if line.trim().is_empty() {
                    continue;
                }
                task.check_cancelled()?;
                match serde_json::from_str::<T>(&line) {
                    Ok(row) => emit.send(row),
                    Err(e) => errors.route_raw(&line, EtlError::Field(format!("line {}: {e}", i + 1)))?,
                }
                task.logger.row();
            }
            task.logger.end();
            Ok(())
        });

        Self { core, output, errors }
    }
}

impl_node!([T: Record + DeserializeOwned] JsonlSource<T>);
impl_source!([T: Record + DeserializeOwned] JsonlSource<T>, T);
impl_error_source!([T: Record + DeserializeOwned] JsonlSource<T>);

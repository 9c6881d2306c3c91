use std::sync::{Arc, Mutex};

use crate::error::EtlError;
use crate::error_router::{ErrorRouter, impl_error_source};
use crate::io::Resource;
use crate::link::{FanOut, Output};
use crate::node::{NodeCore, impl_node, impl_source};
use crate::pipeline::Pipeline;
use crate::row::{FieldRef, Row, ShapeKind};
use crate::utils::lock;
use crate::value::Value;

#[derive(Clone, Copy, Debug)]
struct Options {
    delimiter: u8,
    has_headers: bool,
}

/// Reads delimited text into rows.
///
/// Named row shapes take their field names from the header line; array
/// rows are filled by position. Every field arrives as text and empty fields
/// as `Null`, so struct fields convert from text on assignment. A record
/// that cannot be read or stored goes to the error output.
pub struct CsvSource<T: Row> {
    core: NodeCore,
    output: Output<T>,
    errors: ErrorRouter,
    options: Arc<Mutex<Options>>,
}

impl<T: Row> CsvSource<T> {
    pub fn new(pipeline: &Pipeline, resource: impl Into<Resource>) -> Self {
        let core = NodeCore::new(pipeline, "CsvSource");
        let output = core.output::<T>(FanOut::Distribute);
        let errors = ErrorRouter::new(&core);
        let resource = resource.into();
        let options = Arc::new(Mutex::new(Options {
            delimiter: b',',
            has_headers: true,
        }));

        let out = output.clone();
        let error_router = errors.clone();
        let opts = Arc::clone(&options);
        core.launch(move |mut task| {
            task.logger.start();
            let emit = out.emitter();
            let errors = error_router.start(&task.name);
            let opts = *lock(&opts);
            let accessor = T::accessor();
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(opts.delimiter)
                .has_headers(opts.has_headers)
                .flexible(true)
                .from_reader(resource.open_read()?);

            let headers: Vec<String> = if opts.has_headers {
                let h = reader.headers().map_err(|e| EtlError::io(resource.to_string(), e))?;
                h.iter().map(str::to_string).collect()
            } else {
                Vec::new()
            };
            if accessor.kind() != ShapeKind::Array && headers.is_empty() {
                return Err(EtlError::configuration(&task.name, "named rows need a header line"));
            }

            for record in reader.records() {
                task.check_cancelled()?;
                task.logger.row();
                let record = match record {
                    Ok(r) => r,
                    Err(e) if e.is_io_error() => return Err(EtlError::io(resource.to_string(), e)),
                    Err(e) => {
                        errors.route_raw("", EtlError::Field(e.to_string()))?;
                        continue;
                    }
                };
                let mut row = accessor.new_row(record.len());
                let mut failure = None;
                for (i, text) in record.iter().enumerate() {
                    let field = match accessor.kind() {
                        ShapeKind::Array => FieldRef::Index(i),
                        _ => match headers.get(i) {
                            Some(h) => FieldRef::Name(h.clone()),
                            None => continue,
                        },
                    };
                    let value = if text.is_empty() { Value::Null } else { Value::from(text) };
                    if let Err(e) = accessor.set(&mut row, &field, value) {
                        failure = Some(EtlError::Field(format!("column {field}: {e}")));
                        break;
                    }
                }
                match failure {
                    Some(e) => {
                        let raw = record.iter().collect::<Vec<_>>().join(",");
                        errors.route_raw(&raw, e)?;
                    }
                    None => emit.send(row),
                }
            }
            task.logger.end();
            Ok(())
        });

        Self {
            core,
            output,
            errors,
            options,
        }
    }

    #[must_use]
    pub fn with_delimiter(self, delimiter: u8) -> Self {
        lock(&self.options).delimiter = delimiter;
        self
    }

    /// Whether the first line is a header; defaults to `true`.
    #[must_use]
    pub fn with_headers(self, has_headers: bool) -> Self {
        lock(&self.options).has_headers = has_headers;
        self
    }
}

impl_node!([T: Row] CsvSource<T>);
impl_source!([T: Row] CsvSource<T>, T);
impl_error_source!([T: Row] CsvSource<T>);

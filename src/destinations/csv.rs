use std::sync::{Arc, Mutex};

use crate::error::EtlError;
use crate::error_router::{ErrorRouter, impl_error_source};
use crate::io::Resource;
use crate::node::{NodeCore, impl_node, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::{FieldRef, Row, ShapeKind};
use crate::utils::lock;

/// Writes rows as delimited text.
///
/// For named row shapes the header is taken from the first row's field names
/// and later rows are written in that column order; missing fields are
/// written empty. Array rows are written positionally without a header.
pub struct CsvDestination<T: Row> {
    core: NodeCore,
    input: InputPort<T>,
    errors: ErrorRouter,
    delimiter: Arc<Mutex<u8>>,
}

impl<T: Row> CsvDestination<T> {
    pub fn new(pipeline: &Pipeline, resource: impl Into<Resource>) -> Self {
        let core = NodeCore::new(pipeline, "CsvDestination");
        let (input, mut inbox) = core.input::<T>("input");
        let errors = ErrorRouter::new(&core);
        let resource = resource.into();
        let delimiter = Arc::new(Mutex::new(b','));

        let error_router = errors.clone();
        let delim = Arc::clone(&delimiter);
        core.launch(move |mut task| {
            task.logger.start();
            let errors = error_router.start(&task.name);
            let name = resource.to_string();
            let accessor = T::accessor();
            let mut w = csv::WriterBuilder::new()
                .delimiter(*lock(&delim))
                .flexible(true)
                .from_writer(resource.open_write()?);

            let mut columns: Option<Vec<FieldRef>> = None;
            while let Some(row) = inbox.recv()? {
                task.logger.row();
                if columns.is_none() {
                    let cols = match accessor.kind() {
                        ShapeKind::Array => Vec::new(),
                        ShapeKind::Map | ShapeKind::Struct => {
                            let names = accessor.field_names(&row);
                            w.write_record(&names).map_err(|e| EtlError::io(&name, e))?;
                            names.into_iter().map(FieldRef::Name).collect()
                        }
                    };
                    columns = Some(cols);
                }
                let cols = columns.as_deref().unwrap_or_default();
                let record: Vec<String> = if accessor.kind() == ShapeKind::Array {
                    accessor
                        .field_names(&row)
                        .iter()
                        .filter_map(|i| i.parse::<usize>().ok())
                        .map(|i| accessor.get(&row, &FieldRef::Index(i)).unwrap_or_default().to_string())
                        .collect()
                } else {
                    cols.iter()
                        .map(|f| accessor.get(&row, f).unwrap_or_default().to_string())
                        .collect()
                };
                if let Err(e) = w.write_record(&record) {
                    if e.is_io_error() {
                        return Err(EtlError::io(&name, e));
                    }
                    errors.route_error(&row, EtlError::Field(e.to_string()))?;
                }
            }
            w.flush().map_err(|e| EtlError::io(&name, e))?;
            task.logger.end();
            Ok(())
        });

        Self {
            core,
            input,
            errors,
            delimiter,
        }
    }

    #[must_use]
    pub fn with_delimiter(self, delimiter: u8) -> Self {
        *lock(&self.delimiter) = delimiter;
        self
    }
}

impl_node!([T: Row] CsvDestination<T>);
impl_target!([T: Row] CsvDestination<T>, T);
impl_error_source!([T: Row] CsvDestination<T>);

use std::sync::{Arc, Mutex};

use crate::batch::{BatchHook, Batcher, HookSlot, write_batch};
use crate::config::RetryPolicy;
use crate::db::{ColumnMapping, Connection, ConnectionManager, TableData, TableDefinition, connect_with_retry};
use crate::error::EtlError;
use crate::error_router::{ErrorRouter, impl_error_source};
use crate::node::{NodeCore, impl_node, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::{Row, RowAccessor};
use crate::sources::db::resolve_manager;
use crate::utils::lock;

/// Bulk-loads batches of rows into one table over a dedicated connection.
pub(crate) struct TableWriter<T> {
    pub(crate) conn: Box<dyn Connection>,
    pub(crate) table: String,
    definition: TableDefinition,
    accessor: Arc<dyn RowAccessor<T>>,
    mapping: Option<Vec<ColumnMapping>>,
}

impl<T: Row> TableWriter<T> {
    /// Open a connection and resolve the table definition, loading it from
    /// the database unless `definition` is given.
    pub(crate) fn open(
        manager: &dyn ConnectionManager,
        policy: RetryPolicy,
        node: &str,
        table: &str,
        definition: Option<TableDefinition>,
    ) -> Result<Self, EtlError> {
        if table.trim().is_empty() {
            return Err(EtlError::configuration(node, "no table name given"));
        }
        let mut conn = connect_with_retry(manager, policy)?;
        let definition = match definition {
            Some(d) => d,
            None => conn.table_definition(table).map_err(|e| {
                EtlError::configuration(node, format!("no table definition for {table}: {e}"))
            })?,
        };
        Ok(Self {
            conn,
            table: table.to_string(),
            definition,
            accessor: T::accessor(),
            mapping: None,
        })
    }

    /// Insert `rows`. The column mapping is derived from the first row seen.
    pub(crate) fn insert(&mut self, rows: &[T]) -> Result<u64, EtlError> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let accessor = Arc::clone(&self.accessor);
        let mapping = self.mapping.get_or_insert_with(|| {
            ColumnMapping::for_table(&self.definition, accessor.kind(), &accessor.field_names(first))
        });
        let mut data = TableData::new(rows, accessor.as_ref(), mapping);
        self.conn.bulk_insert(&mut data, &self.table)
    }
}

struct Settings {
    table: String,
    batch_size: Option<usize>,
    definition: Option<TableDefinition>,
    connection: Option<Arc<dyn ConnectionManager>>,
}

/// Writes rows into a database table in batches.
///
/// Identity and computed columns are never written. The batch size defaults
/// to the run's `default_batch_size`. A failing batch becomes one error
/// record carrying the whole batch when an error sink is linked.
pub struct DbDestination<T: Row> {
    core: NodeCore,
    input: InputPort<T>,
    errors: ErrorRouter,
    hook: HookSlot<T>,
    settings: Arc<Mutex<Settings>>,
}

impl<T: Row> DbDestination<T> {
    pub fn new(pipeline: &Pipeline, table: impl Into<String>) -> Self {
        let core = NodeCore::new(pipeline, "DbDestination");
        let (input, mut inbox) = core.input::<T>("input");
        let errors = ErrorRouter::new(&core);
        let hook: HookSlot<T> = Arc::new(Mutex::new(None));
        let settings = Arc::new(Mutex::new(Settings {
            table: table.into(),
            batch_size: None,
            definition: None,
            connection: None,
        }));

        let error_router = errors.clone();
        let hook_slot = Arc::clone(&hook);
        let shared = Arc::clone(&settings);
        core.launch(move |mut task| {
            task.logger.start();
            let errors = error_router.start(&task.name);
            let mut hook: Option<BatchHook<T>> = lock(&hook_slot).take();
            let (table, batch_size, definition, own) = {
                let mut s = lock(&shared);
                (s.table.clone(), s.batch_size, s.definition.take(), s.connection.take())
            };
            let batch_size = batch_size.unwrap_or(task.ctx.config().default_batch_size);
            let mut batcher = Batcher::new(batch_size).map_err(|_| {
                EtlError::configuration(&task.name, "batch size must be greater than zero")
            })?;
            let manager = resolve_manager(own, &task.ctx, &task.name)?;
            let mut writer = TableWriter::<T>::open(
                manager.as_ref(),
                task.ctx.config().retry_policy(),
                &task.name,
                &table,
                definition,
            )?;

            let mut persist = |rows: &[T]| writer.insert(rows).map(|_| ());
            while let Some(row) = inbox.recv()? {
                task.logger.row();
                if let Some(batch) = batcher.push(row) {
                    write_batch(batch, &mut hook, &mut persist, &errors)?;
                }
            }
            if let Some(batch) = batcher.flush() {
                write_batch(batch, &mut hook, &mut persist, &errors)?;
            }
            task.logger.end();
            Ok(())
        });

        Self {
            core,
            input,
            errors,
            hook,
            settings,
        }
    }

    #[must_use]
    pub fn with_batch_size(self, size: usize) -> Self {
        lock(&self.settings).batch_size = Some(size);
        self
    }

    /// Use this definition instead of asking the database.
    #[must_use]
    pub fn with_table_definition(self, definition: TableDefinition) -> Self {
        lock(&self.settings).definition = Some(definition);
        self
    }

    #[must_use]
    pub fn with_connection(self, manager: Arc<dyn ConnectionManager>) -> Self {
        lock(&self.settings).connection = Some(manager);
        self
    }

    /// Install a hook that sees (and may rewrite) each batch before it is written.
    #[must_use]
    pub fn before_batch_write<H>(self, hook: H) -> Self
    where
        H: FnMut(&mut Vec<T>) -> anyhow::Result<()> + Send + 'static,
    {
        *lock(&self.hook) = Some(Box::new(hook));
        self
    }
}

impl_node!([T: Row] DbDestination<T>);
impl_target!([T: Row] DbDestination<T>, T);
impl_error_source!([T: Row] DbDestination<T>);

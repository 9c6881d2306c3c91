use std::sync::{Arc, Mutex};

use crate::config::PipelineContext;
use crate::db::{ConnectionManager, ReadVisitor, connect_with_retry, parse_column_names, select_columns_sql};
use crate::error::EtlError;
use crate::error_router::{ErrorRouter, ErrorSink, impl_error_source};
use crate::link::{Emitter, FanOut, Output};
use crate::logging::TaskLogger;
use crate::node::{NodeCore, impl_node, impl_source};
use crate::pipeline::Pipeline;
use crate::row::{FieldRef, Row, RowAccessor, ShapeKind};
use crate::utils::lock;
use crate::value::Value;

#[derive(Clone, Debug)]
enum Query {
    Table(String),
    Sql(String),
}

struct Settings {
    query: Query,
    column_names: Option<Vec<String>>,
    connection: Option<Arc<dyn ConnectionManager>>,
}

/// Pick the node's own connection manager, else the run's default one.
pub(crate) fn resolve_manager(
    own: Option<Arc<dyn ConnectionManager>>,
    ctx: &PipelineContext,
    node: &str,
) -> Result<Arc<dyn ConnectionManager>, EtlError> {
    own.or_else(|| ctx.connection().cloned())
        .ok_or_else(|| EtlError::configuration(node, "no connection manager configured"))
}

/// Reads rows from a database table or query.
///
/// For a table, the column list comes from the table definition. For raw SQL
/// the column names are taken from the select list unless given explicitly
/// with [`with_column_names`](Self::with_column_names). A value that cannot
/// be stored into its field routes the row to the error output.
pub struct DbSource<T: Row> {
    core: NodeCore,
    output: Output<T>,
    errors: ErrorRouter,
    settings: Arc<Mutex<Settings>>,
}

impl<T: Row> DbSource<T> {
    pub fn table(pipeline: &Pipeline, table: impl Into<String>) -> Self {
        Self::build(pipeline, Query::Table(table.into()))
    }

    pub fn sql(pipeline: &Pipeline, sql: impl Into<String>) -> Self {
        Self::build(pipeline, Query::Sql(sql.into()))
    }

    fn build(pipeline: &Pipeline, query: Query) -> Self {
        let core = NodeCore::new(pipeline, "DbSource");
        let output = core.output::<T>(FanOut::Distribute);
        let errors = ErrorRouter::new(&core);
        let settings = Arc::new(Mutex::new(Settings {
            query,
            column_names: None,
            connection: None,
        }));

        let out = output.clone();
        let error_router = errors.clone();
        let shared = Arc::clone(&settings);
        core.launch(move |mut task| {
            task.logger.start();
            let (query, explicit, own) = {
                let mut s = lock(&shared);
                (s.query.clone(), s.column_names.take(), s.connection.take())
            };
            let manager = resolve_manager(own, &task.ctx, &task.name)?;
            let mut conn = connect_with_retry(manager.as_ref(), task.ctx.config().retry_policy())?;

            let (sql, names) = match query {
                Query::Table(table) => {
                    let names = match explicit {
                        Some(n) => n,
                        None => conn.table_definition(&table)?.column_names(),
                    };
                    (select_columns_sql(conn.kind(), &table, &names), names)
                }
                Query::Sql(sql) => {
                    let names = explicit.unwrap_or_else(|| parse_column_names(&sql));
                    (sql, names)
                }
            };
            tracing::debug!(node = %task.name, columns = names.len(), "reading");

            let accessor = T::accessor();
            let fields: Vec<FieldRef> = match accessor.kind() {
                ShapeKind::Array => (0..names.len()).map(FieldRef::Index).collect(),
                ShapeKind::Map | ShapeKind::Struct => names.into_iter().map(FieldRef::Name).collect(),
            };
            let mut reader = RowReader {
                accessor: accessor.as_ref(),
                fields: &fields,
                current: None,
                failure: None,
                emit: out.emitter(),
                errors: error_router.start(&task.name),
                logger: &mut task.logger,
                ctx: &task.ctx,
            };
            conn.execute_reader(&sql, &[], &mut reader)?;
            drop(reader);
            task.logger.end();
            Ok(())
        });

        Self {
            core,
            output,
            errors,
            settings,
        }
    }

    /// Column names to read; overrides the table definition or the
    /// select-list parse.
    #[must_use]
    pub fn with_column_names<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.settings).column_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Connection manager for this node; defaults to the run's.
    #[must_use]
    pub fn with_connection(self, manager: Arc<dyn ConnectionManager>) -> Self {
        lock(&self.settings).connection = Some(manager);
        self
    }
}

/// Builds one row per result-set row and emits it.
struct RowReader<'a, T> {
    accessor: &'a dyn RowAccessor<T>,
    fields: &'a [FieldRef],
    current: Option<T>,
    failure: Option<EtlError>,
    emit: Emitter<T>,
    errors: ErrorSink,
    logger: &'a mut TaskLogger,
    ctx: &'a PipelineContext,
}

impl<T: Row> ReadVisitor for RowReader<'_, T> {
    fn begin_row(&mut self) {
        self.current = Some(self.accessor.new_row(self.fields.len()));
        self.failure = None;
    }

    fn column(&mut self, ordinal: usize, value: Value) {
        if self.failure.is_some() {
            return;
        }
        let Some(row) = self.current.as_mut() else { return };
        let field = match self.fields.get(ordinal) {
            Some(f) => f.clone(),
            None if self.accessor.kind() == ShapeKind::Array => FieldRef::Index(ordinal),
            None => return,
        };
        if let Err(e) = self.accessor.set(row, &field, value) {
            self.failure = Some(EtlError::Field(format!("column {field}: {e}")));
        }
    }

    fn end_row(&mut self) -> Result<(), EtlError> {
        self.ctx.cancellation().check()?;
        let Some(row) = self.current.take() else {
            return Ok(());
        };
        self.logger.row();
        match self.failure.take() {
            Some(e) => self.errors.route_error(&row, e),
            None => {
                self.emit.send(row);
                Ok(())
            }
        }
    }
}

impl_node!([T: Row] DbSource<T>);
impl_source!([T: Row] DbSource<T>, T);
impl_error_source!([T: Row] DbSource<T>);

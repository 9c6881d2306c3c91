//! Database collaborator boundary.
//!
//! The engine never talks to a database directly. Database-facing nodes use
//! a [`ConnectionManager`] to open their own [`Connection`] (connections are
//! never shared between nodes) and go through four capabilities: execute a
//! statement, read a scalar, stream a result set into a [`ReadVisitor`], and
//! bulk-insert from a [`RowCursor`]. Table metadata comes from
//! [`Connection::table_definition`].

mod sql;
mod table;

pub use sql::{concat_columns, delete_ids_sql, parse_column_names, select_columns_sql, truncate_sql};
pub use table::{ColumnMapping, TableColumn, TableData, TableDefinition};

use std::fmt;

use crate::config::RetryPolicy;
use crate::error::EtlError;
use crate::value::Value;

/// SQL dialect of a connection; drives identifier quoting and a few
/// statement shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    SqlServer,
    Postgres,
    MySql,
    Sqlite,
}

impl ConnectionKind {
    fn quote_chars(self) -> (char, char) {
        match self {
            ConnectionKind::SqlServer => ('[', ']'),
            ConnectionKind::MySql => ('`', '`'),
            ConnectionKind::Postgres | ConnectionKind::Sqlite => ('"', '"'),
        }
    }

    /// Quote an identifier, part by part for `schema.table` names. Parts that
    /// are already quoted are left alone.
    pub fn quote(self, name: &str) -> String {
        let (open, close) = self.quote_chars();
        name.split('.')
            .map(|part| {
                let p = part.trim();
                if p.starts_with(['"', '[', '`']) {
                    p.to_string()
                } else {
                    format!("{open}{p}{close}")
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionKind::SqlServer => "sqlserver",
            ConnectionKind::Postgres => "postgres",
            ConnectionKind::MySql => "mysql",
            ConnectionKind::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

/// Receives a result set one column at a time, in column order.
pub trait ReadVisitor {
    fn begin_row(&mut self);
    /// SQL NULL arrives as [`Value::Null`].
    fn column(&mut self, ordinal: usize, value: Value);
    /// An error stops the read and is returned from `execute_reader`.
    fn end_row(&mut self) -> Result<(), EtlError>;
}

/// Forward-only cursor over rows handed to a bulk load.
pub trait RowCursor {
    /// Advance; `false` once exhausted.
    fn read(&mut self) -> bool;
    fn field_count(&self) -> usize;
    fn get_ordinal(&self, name: &str) -> Option<usize>;
    fn get_value(&self, ordinal: usize) -> Value;
    fn is_null(&self, ordinal: usize) -> bool {
        self.get_value(ordinal).is_null()
    }
    /// Destination column name for each ordinal.
    fn destination_columns(&self) -> Vec<String>;
}

/// A single open connection, owned by one node at a time.
pub trait Connection: Send {
    fn kind(&self) -> ConnectionKind;

    /// Returns the number of affected rows.
    fn execute_non_query(&mut self, sql: &str, params: &[Value]) -> Result<u64, EtlError>;

    fn execute_scalar(&mut self, sql: &str, params: &[Value]) -> Result<Option<Value>, EtlError>;

    fn execute_reader(&mut self, sql: &str, params: &[Value], visitor: &mut dyn ReadVisitor) -> Result<(), EtlError>;

    /// Insert every row of `rows` into `table`; returns the number inserted.
    fn bulk_insert(&mut self, rows: &mut dyn RowCursor, table: &str) -> Result<u64, EtlError>;

    fn table_definition(&mut self, table: &str) -> Result<TableDefinition, EtlError> {
        Err(EtlError::Unsupported(format!(
            "{} connections cannot describe table {table}",
            self.kind()
        )))
    }
}

/// Opens connections. Implementations are shared across nodes.
pub trait ConnectionManager: Send + Sync {
    fn kind(&self) -> ConnectionKind;
    fn open(&self) -> Result<Box<dyn Connection>, EtlError>;
}

/// Open a connection, retrying up to `policy.max_attempts` times with a fixed
/// delay in between.
pub fn connect_with_retry(
    manager: &dyn ConnectionManager,
    policy: RetryPolicy,
) -> Result<Box<dyn Connection>, EtlError> {
    let attempts = policy.max_attempts.max(1);
    let mut last = String::new();
    for attempt in 1..=attempts {
        match manager.open() {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                tracing::warn!(attempt, max = attempts, error = %e, "connection attempt failed");
                last = e.to_string();
                if attempt < attempts {
                    std::thread::sleep(policy.delay);
                }
            }
        }
    }
    Err(EtlError::Connection {
        attempts,
        message: last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_per_dialect() {
        assert_eq!(ConnectionKind::SqlServer.quote("dbo.orders"), "[dbo].[orders]");
        assert_eq!(ConnectionKind::Postgres.quote("orders"), "\"orders\"");
        assert_eq!(ConnectionKind::MySql.quote("`done`"), "`done`");
    }
}

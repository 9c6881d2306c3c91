//! An in-memory stand-in for a relational database.
//!
//! [`MemoryDatabase`] understands the handful of statements the engine
//! itself issues (select lists, `COUNT(*)`, truncation, delete-by-id with
//! `CONCAT`/`||` id expressions) plus bulk inserts. Every statement is
//! recorded so tests can assert on what a node sent.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex};

use regex::Regex;

use crate::db::{Connection, ConnectionKind, ConnectionManager, ReadVisitor, RowCursor, TableDefinition};
use crate::error::EtlError;
use crate::row::MapRow;
use crate::utils::lock;
use crate::value::Value;

static TRUNCATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*truncate\s+table\s+(\S+)\s*;?\s*$").expect("valid truncate regex"));
static DELETE_ALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*delete\s+from\s+(\S+)\s*;?\s*$").expect("valid delete regex"));
static DELETE_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*delete\s+from\s+(\S+)\s+where\s+(.+?)\s+in\s*\((.*)\)\s*;?\s*$")
        .expect("valid delete-in regex")
});
static COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*select\s+count\(\s*\*\s*\)\s+from\s+(\S+)\s*;?\s*$").expect("valid count regex")
});
static SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*select\s+(.+?)\s+from\s+(\S+)\s*;?\s*$").expect("valid select regex"));

/// Strip identifier quoting: `[dbo].[t]` becomes `dbo.t`.
fn ident(raw: &str) -> String {
    raw.split('.')
        .map(|p| p.trim().trim_matches(|c| matches!(c, '"' | '`' | '[' | ']')))
        .collect::<Vec<_>>()
        .join(".")
}

fn key(raw: &str) -> String {
    ident(raw).to_lowercase()
}

/// Parse `'a','o''b'` into its string values.
fn string_list(raw: &str) -> Result<Vec<String>, EtlError> {
    let mut out = Vec::new();
    let mut chars = raw.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        match chars.next() {
            None => return Ok(out),
            Some('\'') => {}
            Some(c) => return Err(EtlError::Database(format!("unexpected {c:?} in value list"))),
        }
        let mut s = String::new();
        loop {
            match chars.next() {
                Some('\'') if chars.peek() == Some(&'\'') => {
                    chars.next();
                    s.push('\'');
                }
                Some('\'') => break,
                Some(c) => s.push(c),
                None => return Err(EtlError::Database("unterminated string literal".into())),
            }
        }
        out.push(s);
    }
}

/// Column names of an id expression: a single column, `CONCAT(a, b)` or `a || b`.
fn id_columns(expr: &str) -> Vec<String> {
    let e = expr.trim();
    let inner = match e.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("concat(") && e.ends_with(')') => &e[7..e.len() - 1],
        _ => e,
    };
    inner
        .split(',')
        .flat_map(|part| part.split("||"))
        .map(ident)
        .filter(|c| !c.is_empty())
        .collect()
}

struct MemTable {
    definition: TableDefinition,
    rows: Vec<Vec<Value>>,
    next_identity: i64,
}

impl MemTable {
    fn ordinal(&self, column: &str) -> Result<usize, EtlError> {
        self.definition
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
            .ok_or_else(|| EtlError::Database(format!("unknown column {column} in {}", self.definition.name)))
    }

    fn row_id(&self, row: &[Value], ordinals: &[usize]) -> String {
        ordinals.iter().map(|&i| row[i].to_string()).collect()
    }
}

#[derive(Default)]
struct DbState {
    tables: BTreeMap<String, MemTable>,
    statements: Vec<String>,
    fail_opens: u32,
    opens: u32,
}

impl DbState {
    fn table(&mut self, name: &str) -> Result<&mut MemTable, EtlError> {
        self.tables
            .get_mut(&key(name))
            .ok_or_else(|| EtlError::Database(format!("table {} does not exist", ident(name))))
    }
}

/// Shared in-memory database; clones see the same tables.
#[derive(Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<DbState>>,
    kind: ConnectionKind,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// A database speaking the SQL Server dialect.
    pub fn new() -> Self {
        Self::with_kind(ConnectionKind::SqlServer)
    }

    pub fn with_kind(kind: ConnectionKind) -> Self {
        Self {
            state: Arc::new(Mutex::new(DbState::default())),
            kind,
        }
    }

    /// Create (or replace) a table.
    pub fn create_table(&self, definition: TableDefinition) {
        let next_identity = definition
            .columns
            .iter()
            .find(|c| c.is_identity)
            .and_then(|c| c.identity_seed)
            .unwrap_or(1);
        lock(&self.state).tables.insert(
            key(&definition.name),
            MemTable {
                definition,
                rows: Vec::new(),
                next_identity,
            },
        );
    }

    /// Append rows given in column order.
    pub fn insert_rows(&self, table: &str, rows: Vec<Vec<Value>>) -> Result<(), EtlError> {
        let mut state = lock(&self.state);
        let t = state.table(table)?;
        for mut row in rows {
            row.resize(t.definition.columns.len(), Value::Null);
            t.rows.push(row);
        }
        Ok(())
    }

    /// Current rows in column order.
    pub fn rows(&self, table: &str) -> Result<Vec<Vec<Value>>, EtlError> {
        Ok(lock(&self.state).table(table)?.rows.clone())
    }

    /// Current rows keyed by column name.
    pub fn rows_as_maps(&self, table: &str) -> Result<Vec<MapRow>, EtlError> {
        let mut state = lock(&self.state);
        let t = state.table(table)?;
        let names = t.definition.column_names();
        Ok(t.rows
            .iter()
            .map(|r| names.iter().cloned().zip(r.iter().cloned()).collect())
            .collect())
    }

    /// Every statement received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        lock(&self.state).statements.clone()
    }

    /// Make the next `n` calls to `open` fail.
    pub fn fail_next_opens(&self, n: u32) {
        lock(&self.state).fail_opens = n;
    }

    /// Number of `open` calls, failed ones included.
    pub fn open_count(&self) -> u32 {
        lock(&self.state).opens
    }
}

impl ConnectionManager for MemoryDatabase {
    fn kind(&self) -> ConnectionKind {
        self.kind
    }

    fn open(&self) -> Result<Box<dyn Connection>, EtlError> {
        let mut state = lock(&self.state);
        state.opens += 1;
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(EtlError::Database("simulated connection failure".into()));
        }
        Ok(Box::new(MemoryConnection { db: self.clone() }))
    }
}

struct MemoryConnection {
    db: MemoryDatabase,
}

impl MemoryConnection {
    fn record(&self, sql: &str) -> std::sync::MutexGuard<'_, DbState> {
        let mut state = lock(&self.db.state);
        state.statements.push(sql.to_string());
        state
    }
}

impl Connection for MemoryConnection {
    fn kind(&self) -> ConnectionKind {
        self.db.kind
    }

    fn execute_non_query(&mut self, sql: &str, _params: &[Value]) -> Result<u64, EtlError> {
        let mut state = self.record(sql);
        if let Some(c) = TRUNCATE.captures(sql).or_else(|| DELETE_ALL.captures(sql)) {
            let t = state.table(&c[1])?;
            let n = t.rows.len() as u64;
            t.rows.clear();
            return Ok(n);
        }
        if let Some(c) = DELETE_IN.captures(sql) {
            let t = state.table(&c[1])?;
            let ordinals = id_columns(&c[2])
                .iter()
                .map(|col| t.ordinal(col))
                .collect::<Result<Vec<_>, _>>()?;
            let ids = string_list(&c[3])?;
            let before = t.rows.len();
            let kept: Vec<Vec<Value>> = t
                .rows
                .iter()
                .filter(|r| !ids.contains(&t.row_id(r, &ordinals)))
                .cloned()
                .collect();
            t.rows = kept;
            return Ok((before - t.rows.len()) as u64);
        }
        Err(EtlError::Unsupported(format!("statement not understood: {sql}")))
    }

    fn execute_scalar(&mut self, sql: &str, _params: &[Value]) -> Result<Option<Value>, EtlError> {
        let mut state = self.record(sql);
        match COUNT.captures(sql) {
            Some(c) => {
                let n = state.table(&c[1])?.rows.len();
                Ok(Some(Value::Int(n as i64)))
            }
            None => Err(EtlError::Unsupported(format!("scalar query not understood: {sql}"))),
        }
    }

    fn execute_reader(&mut self, sql: &str, _params: &[Value], visitor: &mut dyn ReadVisitor) -> Result<(), EtlError> {
        let (ordinals, rows) = {
            let mut state = self.record(sql);
            let c = SELECT
                .captures(sql)
                .ok_or_else(|| EtlError::Unsupported(format!("query not understood: {sql}")))?;
            let t = state.table(&c[2])?;
            let list = c[1].trim();
            let ordinals = if list == "*" {
                (0..t.definition.columns.len()).collect()
            } else {
                list.split(',')
                    .map(|col| t.ordinal(&ident(col)))
                    .collect::<Result<Vec<_>, _>>()?
            };
            (ordinals, t.rows.clone())
        };
        for row in rows {
            visitor.begin_row();
            for (i, &o) in ordinals.iter().enumerate() {
                visitor.column(i, row[o].clone());
            }
            visitor.end_row()?;
        }
        Ok(())
    }

    fn bulk_insert(&mut self, rows: &mut dyn RowCursor, table: &str) -> Result<u64, EtlError> {
        let mut state = lock(&self.db.state);
        let t = state.table(table)?;
        let targets = rows
            .destination_columns()
            .iter()
            .map(|c| t.ordinal(c))
            .collect::<Result<Vec<_>, _>>()?;
        let identity = t.definition.columns.iter().position(|c| c.is_identity);
        let step = identity
            .and_then(|i| t.definition.columns[i].identity_increment)
            .unwrap_or(1);
        let width = t.definition.columns.len();
        let mut inserted = 0u64;
        while rows.read() {
            let mut row = vec![Value::Null; width];
            for (i, &target) in targets.iter().enumerate() {
                row[target] = rows.get_value(i);
            }
            if let Some(i) = identity {
                row[i] = Value::Int(t.next_identity);
                t.next_identity += step;
            }
            t.rows.push(row);
            inserted += 1;
        }
        state
            .statements
            .push(format!("BULK INSERT {} ({inserted} rows)", ident(table)));
        Ok(inserted)
    }

    fn table_definition(&mut self, table: &str) -> Result<TableDefinition, EtlError> {
        Ok(lock(&self.db.state).table(table)?.definition.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TableColumn;

    #[test]
    fn delete_by_concatenated_id() -> anyhow::Result<()> {
        let db = MemoryDatabase::new();
        db.create_table(TableDefinition::new(
            "t",
            vec![TableColumn::new("a", "INT"), TableColumn::new("b", "TEXT")],
        ));
        db.insert_rows("t", vec![vec![1.into(), "x".into()], vec![2.into(), "y".into()]])?;
        let mut conn = db.open()?;
        let n = conn.execute_non_query("DELETE FROM [t] WHERE CONCAT([a], [b]) IN ('2y')", &[])?;
        assert_eq!(n, 1);
        assert_eq!(db.rows("t")?, vec![vec![Value::Int(1), Value::from("x")]]);
        Ok(())
    }

    #[test]
    fn quoted_literals() -> anyhow::Result<()> {
        assert_eq!(string_list("'a', 'o''b'")?, vec!["a", "o'b"]);
        Ok(())
    }
}

use serde::{Deserialize, Serialize};

use crate::db::RowCursor;
use crate::row::{FieldRef, RowAccessor, ShapeKind};
use crate::value::Value;

/// Column metadata as reported by the table metadata provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub allow_nulls: bool,
    pub is_identity: bool,
    pub identity_seed: Option<i64>,
    pub identity_increment: Option<i64>,
    pub is_primary_key: bool,
    pub default_value: Option<String>,
    pub collation: Option<String>,
    pub computed_column: Option<String>,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            allow_nulls: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.allow_nulls = false;
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.allow_nulls = false;
        self
    }

    #[must_use]
    pub fn identity(mut self, seed: i64, increment: i64) -> Self {
        self.is_identity = true;
        self.identity_seed = Some(seed);
        self.identity_increment = Some(increment);
        self.allow_nulls = false;
        self
    }

    #[must_use]
    pub fn computed(mut self, expression: impl Into<String>) -> Self {
        self.computed_column = Some(expression.into());
        self
    }

    /// Whether a bulk load may supply a value for this column.
    pub fn is_writable(&self) -> bool {
        !self.is_identity && self.computed_column.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<TableColumn>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<TableColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn writable_columns(&self) -> impl Iterator<Item = &TableColumn> {
        self.columns.iter().filter(|c| c.is_writable())
    }
}

/// Source field feeding one destination column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMapping {
    pub source: FieldRef,
    pub destination: String,
}

impl ColumnMapping {
    /// Map row fields onto the writable columns of `def`.
    ///
    /// Array rows map positionally onto the writable columns. Named rows map
    /// by case-insensitive name; columns without a matching field are left
    /// out so the database default applies.
    pub fn for_table(def: &TableDefinition, kind: ShapeKind, field_names: &[String]) -> Vec<ColumnMapping> {
        match kind {
            ShapeKind::Array => def
                .writable_columns()
                .enumerate()
                .map(|(i, c)| ColumnMapping {
                    source: FieldRef::Index(i),
                    destination: c.name.clone(),
                })
                .collect(),
            ShapeKind::Map | ShapeKind::Struct => def
                .writable_columns()
                .filter_map(|c| {
                    field_names
                        .iter()
                        .find(|f| f.eq_ignore_ascii_case(&c.name))
                        .map(|f| ColumnMapping {
                            source: FieldRef::Name(f.clone()),
                            destination: c.name.clone(),
                        })
                })
                .collect(),
        }
    }
}

/// [`RowCursor`] over a batch of rows and a column mapping.
pub struct TableData<'a, T> {
    rows: &'a [T],
    accessor: &'a dyn RowAccessor<T>,
    mapping: &'a [ColumnMapping],
    position: Option<usize>,
    current: Vec<Value>,
}

impl<'a, T> TableData<'a, T> {
    pub fn new(rows: &'a [T], accessor: &'a dyn RowAccessor<T>, mapping: &'a [ColumnMapping]) -> Self {
        Self {
            rows,
            accessor,
            mapping,
            position: None,
            current: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T> RowCursor for TableData<'_, T> {
    fn read(&mut self) -> bool {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next);
        match self.rows.get(next) {
            Some(row) => {
                self.current = self
                    .mapping
                    .iter()
                    .map(|m| self.accessor.get(row, &m.source).unwrap_or_default())
                    .collect();
                true
            }
            None => {
                self.current.clear();
                false
            }
        }
    }

    fn field_count(&self) -> usize {
        self.mapping.len()
    }

    fn get_ordinal(&self, name: &str) -> Option<usize> {
        self.mapping.iter().position(|m| m.destination.eq_ignore_ascii_case(name))
    }

    fn get_value(&self, ordinal: usize) -> Value {
        self.current.get(ordinal).cloned().unwrap_or_default()
    }

    fn destination_columns(&self) -> Vec<String> {
        self.mapping.iter().map(|m| m.destination.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{MapRow, Row};

    fn def() -> TableDefinition {
        TableDefinition::new(
            "t",
            vec![
                TableColumn::new("Id", "INT").identity(1, 1),
                TableColumn::new("name", "TEXT"),
                TableColumn::new("total", "DECIMAL"),
            ],
        )
    }

    #[test]
    fn array_rows_map_onto_writable_columns() {
        let m = ColumnMapping::for_table(&def(), ShapeKind::Array, &[]);
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].source, FieldRef::Index(0));
        assert_eq!(m[0].destination, "name");
    }

    #[test]
    fn cursor_reads_mapped_values() {
        let rows: Vec<MapRow> = vec![
            [("NAME".to_string(), Value::from("a"))].into_iter().collect(),
        ];
        let acc = MapRow::accessor();
        let mapping = ColumnMapping::for_table(&def(), ShapeKind::Map, &["NAME".to_string()]);
        let mut cursor = TableData::new(&rows, acc.as_ref(), &mapping);
        assert!(cursor.read());
        assert_eq!(cursor.get_ordinal("name"), Some(0));
        assert_eq!(cursor.get_value(0), Value::from("a"));
        assert!(!cursor.read());
    }
}

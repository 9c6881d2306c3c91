use std::sync::Arc;

use crate::error::EtlError;
use crate::row::{FieldRef, Row, RowAccessor, ShapeKind};
use crate::value::Value;

/// Positional access over `Vec<Value>`. Writing past the end grows the row.
pub(crate) struct ArrayAccessor;

impl RowAccessor<Vec<Value>> for ArrayAccessor {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Array
    }

    fn get(&self, row: &Vec<Value>, field: &FieldRef) -> Option<Value> {
        match field {
            FieldRef::Index(i) => row.get(*i).cloned(),
            FieldRef::Name(n) => n.parse::<usize>().ok().and_then(|i| row.get(i).cloned()),
        }
    }

    fn set(&self, row: &mut Vec<Value>, field: &FieldRef, value: Value) -> Result<(), EtlError> {
        let idx = match field {
            FieldRef::Index(i) => *i,
            FieldRef::Name(n) => n.parse::<usize>().map_err(|_| {
                EtlError::Field(format!("array rows are addressed by ordinal, not by name {n:?}"))
            })?,
        };
        if idx >= row.len() {
            row.resize(idx + 1, Value::Null);
        }
        row[idx] = value;
        Ok(())
    }

    fn field_names(&self, row: &Vec<Value>) -> Vec<String> {
        (0..row.len()).map(|i| i.to_string()).collect()
    }

    fn new_row(&self, width: usize) -> Vec<Value> {
        vec![Value::Null; width]
    }
}

impl Row for Vec<Value> {
    fn accessor() -> Arc<dyn RowAccessor<Self>> {
        Arc::new(ArrayAccessor)
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::EtlError;
use crate::row::{FieldRef, Row, RowAccessor, ShapeKind};
use crate::value::Value;

/// An open, name-addressed row. Field order is alphabetical.
pub type MapRow = BTreeMap<String, Value>;

pub(crate) struct MapAccessor;

impl RowAccessor<MapRow> for MapAccessor {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Map
    }

    fn get(&self, row: &MapRow, field: &FieldRef) -> Option<Value> {
        match field {
            FieldRef::Name(n) => row.get(n).cloned(),
            FieldRef::Index(i) => row.values().nth(*i).cloned(),
        }
    }

    fn set(&self, row: &mut MapRow, field: &FieldRef, value: Value) -> Result<(), EtlError> {
        match field {
            FieldRef::Name(n) => {
                row.insert(n.clone(), value);
                Ok(())
            }
            FieldRef::Index(i) => Err(EtlError::Field(format!(
                "map rows are addressed by name, not by ordinal {i}"
            ))),
        }
    }

    fn field_names(&self, row: &MapRow) -> Vec<String> {
        row.keys().cloned().collect()
    }

    fn new_row(&self, _width: usize) -> MapRow {
        MapRow::new()
    }
}

impl Row for MapRow {
    fn accessor() -> Arc<dyn RowAccessor<Self>> {
        Arc::new(MapAccessor)
    }
}

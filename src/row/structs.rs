use std::fmt;
use std::sync::Arc;

use crate::error::EtlError;
use crate::row::{FieldRef, RowAccessor, ShapeKind};
use crate::value::Value;

type Getter<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, Value) -> Result<(), EtlError> + Send + Sync>;

/// One named field of a struct row.
pub struct FieldDescriptor<T> {
    pub name: String,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> Clone for FieldDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

/// Accessor for a statically-typed struct, built from an explicit list of
/// field descriptors. Lookups are by descriptor name or by declaration order.
///
/// See [`struct_shape!`](crate::struct_shape) for the common case.
pub struct StructShape<T> {
    fields: Vec<FieldDescriptor<T>>,
}

impl<T> Default for StructShape<T> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<T> fmt::Debug for StructShape<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructShape")
            .field("fields", &self.fields.iter().map(|d| d.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl<T> StructShape<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field<G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
        S: Fn(&mut T, Value) -> Result<(), EtlError> + Send + Sync + 'static,
    {
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            get: Arc::new(get),
            set: Arc::new(set),
        });
        self
    }

    pub fn descriptors(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }

    fn find(&self, field: &FieldRef) -> Option<&FieldDescriptor<T>> {
        match field {
            FieldRef::Name(n) => self.fields.iter().find(|d| d.name.eq_ignore_ascii_case(n)),
            FieldRef::Index(i) => self.fields.get(*i),
        }
    }
}

impl<T: Default> RowAccessor<T> for StructShape<T> {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Struct
    }

    fn get(&self, row: &T, field: &FieldRef) -> Option<Value> {
        self.find(field).map(|d| (d.get)(row))
    }

    fn set(&self, row: &mut T, field: &FieldRef, value: Value) -> Result<(), EtlError> {
        let d = self
            .find(field)
            .ok_or_else(|| EtlError::Field(format!("struct has no field {field}")))?;
        (d.set)(row, value).map_err(|e| EtlError::Field(format!("field {}: {e}", d.name)))
    }

    fn field_names(&self, _row: &T) -> Vec<String> {
        self.fields.iter().map(|d| d.name.clone()).collect()
    }

    fn new_row(&self, _width: usize) -> T {
        T::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Point {
        x: i64,
        label: String,
    }

    fn shape() -> StructShape<Point> {
        StructShape::new()
            .field("x", |p: &Point| Value::Int(p.x), |p, v| {
                p.x = i64::try_from(v)?;
                Ok(())
            })
            .field("label", |p: &Point| Value::from(p.label.clone()), |p, v| {
                p.label = String::try_from(v)?;
                Ok(())
            })
    }

    #[test]
    fn names_match_case_insensitively() {
        let s = shape();
        let mut p = Point::default();
        s.set(&mut p, &"X".into(), Value::Int(3)).unwrap();
        assert_eq!(p.x, 3);
        assert_eq!(s.get(&p, &FieldRef::Index(0)), Some(Value::Int(3)));
        assert_eq!(s.field_names(&p), vec!["x", "label"]);
    }

    #[test]
    fn conversion_failure_names_the_field() {
        let s = shape();
        let mut p = Point::default();
        let err = s.set(&mut p, &"x".into(), Value::Text("abc".into())).unwrap_err();
        assert!(err.to_string().contains("field x"));
    }
}

//! Shape-agnostic row access.
//!
//! Rows come in three physical shapes:
//!
//! - **Array** rows (`Vec<Value>`): fields addressed by ordinal.
//! - **Map** rows ([`MapRow`]): open set of named fields.
//! - **Struct** rows: user types described once by a [`StructShape`].
//!
//! Every node that reads or writes individual fields (aggregation, lookup,
//! table merge, database adapters) goes through a [`RowAccessor`], obtained
//! once at node construction via [`Row::accessor`].

mod array;
mod map;
mod structs;

pub use map::MapRow;
pub use structs::{FieldDescriptor, StructShape};

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::EtlError;
use crate::value::Value;

/// Minimal bound for anything that travels along a link.
///
/// Rows must be serializable so a failing row can be rendered into an
/// [`ErrorRecord`](crate::error::ErrorRecord).
pub trait Record: 'static + Send + Sync + Clone + Serialize {}
impl<T> Record for T where T: 'static + Send + Sync + Clone + Serialize {}

/// Field address: by name or by ordinal position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldRef {
    Name(String),
    Index(usize),
}

impl FieldRef {
    pub fn name(&self) -> Option<&str> {
        match self {
            FieldRef::Name(n) => Some(n),
            FieldRef::Index(_) => None,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Name(n) => f.write_str(n),
            FieldRef::Index(i) => write!(f, "#{i}"),
        }
    }
}

impl From<&str> for FieldRef {
    fn from(s: &str) -> Self {
        FieldRef::Name(s.to_string())
    }
}

impl From<String> for FieldRef {
    fn from(s: String) -> Self {
        FieldRef::Name(s)
    }
}

impl From<usize> for FieldRef {
    fn from(i: usize) -> Self {
        FieldRef::Index(i)
    }
}

/// Physical representation behind a [`RowAccessor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Array,
    Map,
    Struct,
}

/// Uniform field access over one row type.
pub trait RowAccessor<T>: Send + Sync {
    fn kind(&self) -> ShapeKind;

    /// Read a field. `None` means the field does not exist on this row;
    /// an existing field holding SQL NULL reads as `Some(Value::Null)`.
    fn get(&self, row: &T, field: &FieldRef) -> Option<Value>;

    fn set(&self, row: &mut T, field: &FieldRef, value: Value) -> Result<(), EtlError>;

    /// Names of the fields present on `row`. Array rows report their ordinals.
    fn field_names(&self, row: &T) -> Vec<String>;

    /// A blank row able to hold `width` fields.
    fn new_row(&self, width: usize) -> T;

    /// Read a field that must exist.
    fn require(&self, row: &T, field: &FieldRef) -> Result<Value, EtlError> {
        self.get(row, field)
            .ok_or_else(|| EtlError::Field(format!("row has no field {field}")))
    }
}

/// A row type with a known shape.
pub trait Row: Record {
    fn accessor() -> Arc<dyn RowAccessor<Self>>;
}

/// Convenience: turn a list of field names into [`FieldRef`]s.
pub fn fields<I, S>(names: I) -> Vec<FieldRef>
where
    I: IntoIterator<Item = S>,
    S: Into<FieldRef>,
{
    names.into_iter().map(Into::into).collect()
}

/// Build a [`StructShape`] for a struct whose fields convert to and from
/// [`Value`].
///
/// ```
/// use ironetl::{struct_shape, Row, RowAccessor, FieldRef, Value};
/// use serde::Serialize;
///
/// #[derive(Clone, Default, Serialize)]
/// struct Order { id: i64, customer: String }
///
/// impl Row for Order {
///     fn accessor() -> std::sync::Arc<dyn RowAccessor<Self>> {
///         std::sync::Arc::new(struct_shape!(Order { id: i64, customer: String }))
///     }
/// }
///
/// let acc = Order::accessor();
/// let mut o = Order::default();
/// acc.set(&mut o, &FieldRef::from("id"), Value::Int(7)).unwrap();
/// assert_eq!(o.id, 7);
/// ```
#[macro_export]
macro_rules! struct_shape {
    ($ty:ty { $($field:ident : $fty:ty),* $(,)? }) => {{
        $crate::row::StructShape::<$ty>::new()
            $(
                .field(
                    stringify!($field),
                    |r: &$ty| $crate::value::Value::from(r.$field.clone()),
                    |r: &mut $ty, v: $crate::value::Value| {
                        r.$field = <$fty as ::std::convert::TryFrom<$crate::value::Value>>::try_from(v)?;
                        Ok(())
                    },
                )
            )*
    }};
}

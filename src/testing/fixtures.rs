//! Small datasets shared by tests and doc examples.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::row::{MapRow, Row, RowAccessor};
use crate::struct_shape;
use crate::value::Value;

/// An order line with a category and an amount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub category: String,
    pub amount: i64,
}

impl Order {
    pub fn new(id: i64, category: &str, amount: i64) -> Self {
        Self {
            id,
            category: category.to_string(),
            amount,
        }
    }
}

impl Row for Order {
    fn accessor() -> Arc<dyn RowAccessor<Self>> {
        Arc::new(struct_shape!(Order { id: i64, category: String, amount: i64 }))
    }
}

/// `(1, A, 10)`, `(2, A, 20)`, `(3, B, 5)`: two categories summing to
/// `A = 30` and `B = 5`.
#[must_use]
pub fn sample_orders() -> Vec<Order> {
    vec![Order::new(1, "A", 10), Order::new(2, "A", 20), Order::new(3, "B", 5)]
}

/// [`sample_orders`] as map rows.
#[must_use]
pub fn sample_order_maps() -> Vec<MapRow> {
    sample_orders()
        .into_iter()
        .map(|o| {
            [
                ("id".to_string(), Value::Int(o.id)),
                ("category".to_string(), Value::Text(o.category)),
                ("amount".to_string(), Value::Int(o.amount)),
            ]
            .into_iter()
            .collect()
        })
        .collect()
}

/// Build a map row from `(name, value)` pairs.
pub fn map_row<I, K, V>(pairs: I) -> MapRow
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

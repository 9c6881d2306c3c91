//! Dynamically-typed field values.
//!
//! Every row shape reads and writes fields as [`Value`]. Numeric aggregation
//! goes through [`BigDecimal`] so that sums over mixed integer/float columns do
//! not narrow.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::EtlError;

/// A single field value.
///
/// Equality is structural and variant-strict: `Int(1)` is not equal to
/// `Float(1.0)`. Floats compare by total order (`NaN == NaN`), decimals
/// compare numerically (`1.0 == 1.00`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    Decimal(BigDecimal),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Decimal(d) if d.is_integer() => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used by aggregation. Text is parsed; `Null` yields `None`.
    pub fn to_decimal(&self) -> Result<Option<BigDecimal>, EtlError> {
        match self {
            Value::Null => Ok(None),
            Value::Int(i) => Ok(Some(BigDecimal::from(*i))),
            Value::Float(f) => BigDecimal::from_f64(*f)
                .map(Some)
                .ok_or_else(|| EtlError::Field(format!("float {f} is not a finite decimal"))),
            Value::Decimal(d) => Ok(Some(d.clone())),
            Value::Text(s) => BigDecimal::from_str(s.trim())
                .map(Some)
                .map_err(|e| EtlError::Field(format!("text {s:?} is not numeric: {e}"))),
            other => Err(EtlError::Field(format!("{} is not numeric", other.type_name()))),
        }
    }

    /// Convert a decimal result back into the numeric kind of `template`.
    ///
    /// `Int` templates stay `Int` while the result is integral and in range,
    /// `Float` templates become `Float`; anything else stays `Decimal`.
    pub fn from_decimal_like(value: BigDecimal, template: &Value) -> Value {
        match template {
            Value::Int(_) if value.is_integer() => match value.to_i64() {
                Some(i) => Value::Int(i),
                None => Value::Decimal(value),
            },
            Value::Float(_) => match value.to_f64() {
                Some(f) => Value::Float(f),
                None => Value::Decimal(value),
            },
            _ => Value::Decimal(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::DateTime(_) => "datetime",
            Value::Decimal(_) => "decimal",
        }
    }

    /// Ordering across comparable kinds; numbers compare numerically across
    /// `Int`/`Float`/`Decimal`. Incomparable kinds return `None`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Some(OrderedFloat(*a).cmp(&OrderedFloat(*b))),
            (a, b) => {
                let a = a.to_decimal().ok().flatten()?;
                let b = b.to_decimal().ok().flatten()?;
                Some(a.cmp(&b))
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => OrderedFloat(*a) == OrderedFloat(*b),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => OrderedFloat(*f).hash(state),
            Value::Text(s) => s.hash(state),
            Value::DateTime(d) => d.hash(state),
            // Equal decimals may differ in scale; hash the normalized form.
            Value::Decimal(d) => d.normalized().to_string().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::DateTime(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Decimal(d) => write!(f, "{d}"),
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident via $conv:expr),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(($conv)(v))
                }
            }
        )*
    };
}

value_from! {
    bool => Bool via |v| v,
    i32 => Int via i64::from,
    i64 => Int via |v| v,
    u32 => Int via i64::from,
    f64 => Float via |v| v,
    String => Text via |v| v,
    &str => Text via str::to_string,
    BigDecimal => Decimal via |v| v,
    DateTime<Utc> => DateTime via |v| v,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

fn mismatch(expected: &str, got: &Value) -> EtlError {
    EtlError::Field(format!("expected {expected}, got {} ({got})", got.type_name()))
}

impl TryFrom<Value> for i64 {
    type Error = EtlError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match &v {
            Value::Text(s) => s.trim().parse().map_err(|_| mismatch("int", &v)),
            _ => v.as_i64().ok_or_else(|| mismatch("int", &v)),
        }
    }
}

impl TryFrom<Value> for i32 {
    type Error = EtlError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        let wide = i64::try_from(v)?;
        i32::try_from(wide).map_err(|_| EtlError::Field(format!("{wide} does not fit in i32")))
    }
}

impl TryFrom<Value> for f64 {
    type Error = EtlError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match &v {
            Value::Text(s) => s.trim().parse().map_err(|_| mismatch("float", &v)),
            _ => v.as_f64().ok_or_else(|| mismatch("float", &v)),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = EtlError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            Value::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(mismatch("bool", &v)),
            },
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = EtlError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Text(s) => Ok(s),
            Value::Null => Err(mismatch("text", &Value::Null)),
            other => Ok(other.to_string()),
        }
    }
}

impl TryFrom<Value> for BigDecimal {
    type Error = EtlError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        v.to_decimal()?.ok_or_else(|| mismatch("decimal", &Value::Null))
    }
}

impl TryFrom<Value> for DateTime<Utc> {
    type Error = EtlError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::DateTime(d) => Ok(d),
            Value::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| EtlError::Field(format!("{s:?} is not an RFC 3339 timestamp: {e}"))),
            other => Err(mismatch("datetime", &other)),
        }
    }
}

/// Conversion into an optional field: `Null` maps to `None`.
pub fn optional<T>(v: Value) -> Result<Option<T>, EtlError>
where
    T: TryFrom<Value, Error = EtlError>,
{
    if v.is_null() { Ok(None) } else { T::try_from(v).map(Some) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn decimals_hash_by_value_not_scale() {
        let a = Value::Decimal(BigDecimal::from_str("1.0").unwrap_or_default());
        let b = Value::Decimal(BigDecimal::from_str("1.00").unwrap_or_default());
        let set: HashSet<Value> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn decimal_result_keeps_template_kind() {
        let sum = BigDecimal::from(30);
        assert_eq!(Value::from_decimal_like(sum.clone(), &Value::Int(1)), Value::Int(30));
        assert_eq!(Value::from_decimal_like(sum, &Value::Float(1.5)), Value::Float(30.0));
    }

    #[test]
    fn untagged_json_round_trip_for_plain_kinds() {
        let row = vec![Value::Int(1), Value::Text("a".into()), Value::Null, Value::Float(2.5)];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"[1,"a",null,2.5]"#);
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}

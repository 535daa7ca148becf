use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Column data types
///
/// `DECIMAL`/`NUMERIC` columns are stored as `Float`, `DATE` and `VARCHAR(n)`
/// as `String` (dates in ISO-8601 form compare correctly as text).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    String,
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Integer => "INTEGER",
            DataType::Float => "FLOAT",
            DataType::String => "STRING",
        })
    }
}

/// Runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Data type of the value, `None` for NULL
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(DataType::Boolean),
            Self::Integer(_) => Some(DataType::Integer),
            Self::Float(_) => Some(DataType::Float),
            Self::String(_) => Some(DataType::String),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value, used by aggregates and tolerant comparison
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Converts the value for storage in a column of type `datatype`.
    /// Only integer to float widening is implicit.
    pub fn coerce_to(self, datatype: DataType) -> Value {
        match (self, datatype) {
            (Value::Integer(i), DataType::Float) => Value::Float(i as f64),
            (v, _) => v,
        }
    }

    /// Ordering used by ORDER BY and window ordering: NULL first, then by value.
    /// Values of unrelated types are an error rather than silently equal.
    pub fn sort_cmp(&self, other: &Self) -> Result<Ordering> {
        self.partial_cmp(other).ok_or_else(|| {
            Error::Internal(format!("cannot compare {} with {}", self, other))
        })
    }

    pub fn checked_add(&self, other: &Self) -> Result<Value> {
        self.arithmetic(other, "+", i64::checked_add, |a, b| a + b)
    }

    pub fn checked_sub(&self, other: &Self) -> Result<Value> {
        self.arithmetic(other, "-", i64::checked_sub, |a, b| a - b)
    }

    pub fn checked_mul(&self, other: &Self) -> Result<Value> {
        self.arithmetic(other, "*", i64::checked_mul, |a, b| a * b)
    }

    pub fn checked_div(&self, other: &Self) -> Result<Value> {
        match (self, other) {
            (Value::Integer(_), Value::Integer(0)) => Err(Error::Internal("division by zero".into())),
            (Value::Float(_) | Value::Integer(_), Value::Float(f)) if *f == 0.0 => {
                Err(Error::Internal("division by zero".into()))
            }
            (Value::Float(_), Value::Integer(0)) => Err(Error::Internal("division by zero".into())),
            _ => self.arithmetic(other, "/", i64::checked_div, |a, b| a / b),
        }
    }

    pub fn checked_rem(&self, other: &Self) -> Result<Value> {
        match (self, other) {
            (_, Value::Integer(0)) => Err(Error::Internal("division by zero".into())),
            _ => self.arithmetic(other, "%", i64::checked_rem, |a, b| a % b),
        }
    }

    pub fn checked_neg(&self) -> Result<Value> {
        match self {
            Value::Null => Ok(Value::Null),
            Value::Integer(i) => i
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| Error::Internal("integer overflow".into())),
            Value::Float(f) => Ok(Value::Float(-f)),
            v => Err(Error::Internal(format!("cannot negate {}", v))),
        }
    }

    fn arithmetic(
        &self,
        other: &Self,
        op: &str,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value> {
        Ok(match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            (Value::Integer(a), Value::Integer(b)) => Value::Integer(
                int_op(*a, *b).ok_or_else(|| Error::Internal("integer overflow".into()))?,
            ),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => Value::Float(float_op(a, b)),
                _ => {
                    return Err(Error::Internal(format!(
                        "cannot compute {} {} {}",
                        self, op, other
                    )))
                }
            },
        })
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(true) => write!(f, "TRUE"),
            Value::Boolean(false) => write!(f, "FALSE"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
        }
    }
}

/// Partial ordering for ORDER BY and comparisons, NULL sorts first
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (_, _) => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A row is a vector of values
pub type Row = Vec<Value>;

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{DataType, Value};
    use crate::error::Result;

    #[test]
    fn test_arithmetic_mixes_integer_and_float() -> Result<()> {
        assert_eq!(Value::Integer(2).checked_add(&Value::Integer(3))?, Value::Integer(5));
        assert_eq!(Value::Float(120.5).checked_sub(&Value::Integer(15))?, Value::Float(105.5));
        assert_eq!(Value::Integer(7).checked_div(&Value::Integer(2))?, Value::Integer(3));
        assert_eq!(Value::Null.checked_mul(&Value::Integer(2))?, Value::Null);
        assert!(Value::Integer(1).checked_div(&Value::Integer(0)).is_err());
        assert!(Value::String("a".into()).checked_add(&Value::Integer(1)).is_err());
        assert!(Value::Integer(i64::MAX).checked_add(&Value::Integer(1)).is_err());
        Ok(())
    }

    #[test]
    fn test_sort_cmp_orders_null_first() -> Result<()> {
        assert_eq!(Value::Null.sort_cmp(&Value::Integer(-1))?, Ordering::Less);
        assert_eq!(Value::Integer(2).sort_cmp(&Value::Float(1.5))?, Ordering::Greater);
        assert_eq!(
            Value::from("2024-01-15").sort_cmp(&Value::from("2024-03-01"))?,
            Ordering::Less
        );
        assert!(Value::from("x").sort_cmp(&Value::Integer(1)).is_err());
        Ok(())
    }

    #[test]
    fn test_coerce_and_conversions() {
        assert_eq!(Value::Integer(250).coerce_to(DataType::Float), Value::Float(250.0));
        assert_eq!(Value::Integer(3).coerce_to(DataType::Integer), Value::Integer(3));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(41)), Value::Integer(41));
    }
}

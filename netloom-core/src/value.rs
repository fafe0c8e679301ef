//! Scalar values, data types, and homogeneous per-instance columns.
//!
//! Every attribute that reaches the builder is expressed with these types so
//! the rest of the pipeline never inspects dynamic values ad hoc.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Data type of an attribute column.
///
/// # Examples
/// ```
/// use netloom_core::DType;
///
/// assert_eq!(DType::Vector(3).to_string(), "float64[3]");
/// assert_eq!("float64[3]".parse::<DType>(), Ok(DType::Vector(3)));
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum DType {
    /// Signed 64-bit integers.
    Int,
    /// 64-bit floating point numbers.
    Float,
    /// UTF-8 strings.
    Str,
    /// Booleans.
    Bool,
    /// Fixed-width vectors of 64-bit floats, e.g. 3-D positions.
    Vector(usize),
}

impl DType {
    /// Number of scalar components stored per row.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::Vector(width) => width,
            _ => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("int64"),
            Self::Float => f.write_str("float64"),
            Self::Str => f.write_str("utf8"),
            Self::Bool => f.write_str("bool"),
            Self::Vector(width) => write!(f, "float64[{width}]"),
        }
    }
}

impl std::str::FromStr for DType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "int64" => Ok(Self::Int),
            "float64" => Ok(Self::Float),
            "utf8" => Ok(Self::Str),
            "bool" => Ok(Self::Bool),
            other => other
                .strip_prefix("float64[")
                .and_then(|rest| rest.strip_suffix(']'))
                .and_then(|width| width.parse::<usize>().ok())
                .filter(|&width| width > 0)
                .map(Self::Vector)
                .ok_or_else(|| format!("unknown dtype `{other}`")),
        }
    }
}

/// A single attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Boolean flag.
    Bool(bool),
    /// Fixed-width float vector.
    Vector(Vec<f64>),
}

impl Value {
    /// Returns the data type describing this value.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Int(_) => DType::Int,
            Self::Float(_) => DType::Float,
            Self::Str(_) => DType::Str,
            Self::Bool(_) => DType::Bool,
            Self::Vector(values) => DType::Vector(values.len()),
        }
    }

    /// Returns the value as an integer when it is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "integers widen to f64 for comparisons")]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the string payload when the value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Compares two values, treating integers and floats numerically.
    ///
    /// # Examples
    /// ```
    /// use netloom_core::Value;
    ///
    /// assert!(Value::Int(2).matches(&Value::Float(2.0)));
    /// assert!(!Value::from("2").matches(&Value::Int(2)));
    /// ```
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => self == other,
        }
    }

    /// Converts the value to `dtype` when the conversion is lossless.
    ///
    /// Only integer to float widening is performed; every other mismatch
    /// returns `None`.
    #[must_use]
    pub fn coerce(self, dtype: DType) -> Option<Self> {
        match (self, dtype) {
            (Self::Int(value), DType::Float) => Self::Int(value).as_f64().map(Self::Float),
            (value, expected) if value.dtype() == expected => Some(value),
            _ => None,
        }
    }

    /// Parses a value rendered by [`fmt::Display`], as found in type tables.
    ///
    /// # Examples
    /// ```
    /// use netloom_core::Value;
    ///
    /// assert_eq!(Value::parse("12"), Value::Int(12));
    /// assert_eq!(Value::parse("1.0"), Value::Float(1.0));
    /// assert_eq!(Value::parse("[0.0,1.5]"), Value::Vector(vec![0.0, 1.5]));
    /// assert_eq!(Value::parse("PV1"), Value::from("PV1"));
    /// ```
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if let Ok(value) = raw.parse::<i64>() {
            return Self::Int(value);
        }
        if let Ok(value) = raw.parse::<f64>() {
            return Self::Float(value);
        }
        match raw {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Some(inner) = raw.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            let parsed: Result<Vec<f64>, _> = inner
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(|part| part.trim().parse::<f64>())
                .collect();
            if let Ok(values) = parsed {
                return Self::Vector(values);
            }
        }
        Self::Str(raw.to_owned())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            // Debug keeps the trailing `.0` so floats survive a text round trip.
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Str(value) => f.write_str(value),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Vector(values) => {
                f.write_str("[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{value:?}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(value: [f64; N]) -> Self {
        Self::Vector(value.to_vec())
    }
}

/// Error returned when a value does not fit the column it is pushed into.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("expected {expected} but found {actual}")]
pub struct ColumnTypeMismatch {
    /// Data type of the column.
    pub expected: DType,
    /// Data type of the rejected value.
    pub actual: DType,
}

/// A homogeneous column of per-instance values.
///
/// Vector columns store their components flattened in row-major order.
///
/// # Examples
/// ```
/// use netloom_core::{Column, DType, Value};
///
/// let column = Column::from(vec![[0.0, 1.0, -1.0], [2.0, 3.0, 4.0]]);
/// assert_eq!(column.len(), 2);
/// assert_eq!(column.dtype(), DType::Vector(3));
/// assert_eq!(column.get(1), Some(Value::Vector(vec![2.0, 3.0, 4.0])));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    /// Integer column.
    Int(Vec<i64>),
    /// Float column.
    Float(Vec<f64>),
    /// String column.
    Str(Vec<String>),
    /// Boolean column.
    Bool(Vec<bool>),
    /// Fixed-width float vectors, flattened.
    Vector {
        /// Components per row.
        width: usize,
        /// Row-major component storage.
        values: Vec<f64>,
    },
}

impl Column {
    /// Creates an empty column of the given type.
    #[must_use]
    pub fn empty(dtype: DType) -> Self {
        match dtype {
            DType::Int => Self::Int(Vec::new()),
            DType::Float => Self::Float(Vec::new()),
            DType::Str => Self::Str(Vec::new()),
            DType::Bool => Self::Bool(Vec::new()),
            DType::Vector(width) => Self::Vector {
                width,
                values: Vec::new(),
            },
        }
    }

    /// Returns the data type of the column.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Int(_) => DType::Int,
            Self::Float(_) => DType::Float,
            Self::Str(_) => DType::Str,
            Self::Bool(_) => DType::Bool,
            Self::Vector { width, .. } => DType::Vector(*width),
        }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int(values) => values.len(),
            Self::Float(values) => values.len(),
            Self::Str(values) => values.len(),
            Self::Bool(values) => values.len(),
            Self::Vector { width, values } => values.len().checked_div(*width).unwrap_or(0),
        }
    }

    /// Returns whether the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value stored at `row`.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            Self::Int(values) => values.get(row).copied().map(Value::Int),
            Self::Float(values) => values.get(row).copied().map(Value::Float),
            Self::Str(values) => values.get(row).cloned().map(Value::Str),
            Self::Bool(values) => values.get(row).copied().map(Value::Bool),
            Self::Vector { width, values } => {
                let start = row.checked_mul(*width)?;
                values
                    .get(start..start.checked_add(*width)?)
                    .map(|slice| Value::Vector(slice.to_vec()))
            }
        }
    }

    /// Returns whether the value at `row` matches `expected`.
    ///
    /// Avoids cloning string or vector payloads during selection.
    #[must_use]
    pub fn matches_at(&self, row: usize, expected: &Value) -> bool {
        match (self, expected) {
            (Self::Str(values), Value::Str(wanted)) => {
                values.get(row).is_some_and(|value| value == wanted)
            }
            (Self::Bool(values), Value::Bool(wanted)) => {
                values.get(row).is_some_and(|value| value == wanted)
            }
            (Self::Int(_) | Self::Float(_), Value::Int(_) | Value::Float(_))
            | (Self::Vector { .. }, Value::Vector(_)) => {
                self.get(row).is_some_and(|value| value.matches(expected))
            }
            _ => false,
        }
    }

    /// Appends a value, coercing integers into float columns.
    ///
    /// # Errors
    /// Returns [`ColumnTypeMismatch`] when the value does not fit the column.
    pub fn push(&mut self, value: Value) -> Result<(), ColumnTypeMismatch> {
        let expected = self.dtype();
        let actual = value.dtype();
        let mismatch = ColumnTypeMismatch { expected, actual };
        let coerced = value.coerce(expected).ok_or_else(|| mismatch.clone())?;
        match (self, coerced) {
            (Self::Int(values), Value::Int(value)) => values.push(value),
            (Self::Float(values), Value::Float(value)) => values.push(value),
            (Self::Str(values), Value::Str(value)) => values.push(value),
            (Self::Bool(values), Value::Bool(value)) => values.push(value),
            (Self::Vector { values, .. }, Value::Vector(value)) => values.extend(value),
            _ => return Err(mismatch),
        }
        Ok(())
    }

    /// Appends every row of `other` to this column.
    ///
    /// # Errors
    /// Returns [`ColumnTypeMismatch`] when the columns have different types.
    pub fn extend_from(&mut self, other: &Self) -> Result<(), ColumnTypeMismatch> {
        match (self, other) {
            (Self::Int(values), Self::Int(more)) => values.extend_from_slice(more),
            (Self::Float(values), Self::Float(more)) => values.extend_from_slice(more),
            (Self::Str(values), Self::Str(more)) => values.extend_from_slice(more),
            (Self::Bool(values), Self::Bool(more)) => values.extend_from_slice(more),
            (
                Self::Vector { width, values },
                Self::Vector {
                    width: other_width,
                    values: more,
                },
            ) if width == other_width => values.extend_from_slice(more),
            (this, other) => {
                return Err(ColumnTypeMismatch {
                    expected: this.dtype(),
                    actual: other.dtype(),
                });
            }
        }
        Ok(())
    }
}

impl From<Vec<i64>> for Column {
    fn from(values: Vec<i64>) -> Self {
        Self::Int(values)
    }
}

impl From<Vec<i32>> for Column {
    fn from(values: Vec<i32>) -> Self {
        Self::Int(values.into_iter().map(i64::from).collect())
    }
}

impl From<Vec<f64>> for Column {
    fn from(values: Vec<f64>) -> Self {
        Self::Float(values)
    }
}

impl From<Vec<bool>> for Column {
    fn from(values: Vec<bool>) -> Self {
        Self::Bool(values)
    }
}

impl From<Vec<String>> for Column {
    fn from(values: Vec<String>) -> Self {
        Self::Str(values)
    }
}

impl From<Vec<&str>> for Column {
    fn from(values: Vec<&str>) -> Self {
        Self::Str(values.into_iter().map(str::to_owned).collect())
    }
}

impl From<Range<i64>> for Column {
    fn from(values: Range<i64>) -> Self {
        Self::Int(values.collect())
    }
}

impl<const N: usize> From<Vec<[f64; N]>> for Column {
    fn from(rows: Vec<[f64; N]>) -> Self {
        Self::Vector {
            width: N,
            values: rows.into_iter().flatten().collect(),
        }
    }
}

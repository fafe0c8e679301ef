//! Declaration-time attribute values.
//!
//! Attributes are classified exactly once, when a declaration is built:
//! scalars become [`AttributeValue::Uniform`] and sequences become
//! [`AttributeValue::PerInstance`].

use std::ops::Range;

use crate::value::{Column, Value};

/// Reserved attribute carrying explicit node ids.
pub const NODE_ID: &str = "node_id";
/// Reserved attribute carrying the node type id.
pub const NODE_TYPE_ID: &str = "node_type_id";
/// Reserved attribute carrying the edge type id.
pub const EDGE_TYPE_ID: &str = "edge_type_id";
/// Edge group column holding the number of connections a row stands for.
pub const NSYNS: &str = "nsyns";

/// An attribute supplied to a declaration.
///
/// # Examples
/// ```
/// use netloom_core::AttributeValue;
///
/// assert!(matches!(AttributeValue::from("e"), AttributeValue::Uniform(_)));
/// assert!(matches!(
///     AttributeValue::from(vec![1.0, 2.0]),
///     AttributeValue::PerInstance(_)
/// ));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// One value shared by every instance of the declaration.
    Uniform(Value),
    /// One value per instance.
    PerInstance(Column),
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        Self::Uniform(value)
    }
}

impl From<Column> for AttributeValue {
    fn from(column: Column) -> Self {
        Self::PerInstance(column)
    }
}

macro_rules! uniform_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for AttributeValue {
                fn from(value: $ty) -> Self {
                    Self::Uniform(Value::from(value))
                }
            }
        )+
    };
}

macro_rules! per_instance_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for AttributeValue {
                fn from(values: $ty) -> Self {
                    Self::PerInstance(Column::from(values))
                }
            }
        )+
    };
}

uniform_from!(i64, i32, u32, f64, bool, &str, String);
per_instance_from!(
    Vec<i64>,
    Vec<i32>,
    Vec<f64>,
    Vec<bool>,
    Vec<String>,
    Vec<&str>,
    Range<i64>,
);

impl<const N: usize> From<[f64; N]> for AttributeValue {
    fn from(value: [f64; N]) -> Self {
        Self::Uniform(Value::from(value))
    }
}

impl<const N: usize> From<Vec<[f64; N]>> for AttributeValue {
    fn from(rows: Vec<[f64; N]>) -> Self {
        Self::PerInstance(Column::from(rows))
    }
}

/// Ordered attribute list; re-inserting a name replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct AttributeList(Vec<(String, AttributeValue)>);

impl AttributeList {
    pub(crate) fn insert(&mut self, name: String, value: AttributeValue) {
        if let Some(slot) = self.0.iter_mut().find(|(existing, _)| *existing == name) {
            slot.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        let position = self.0.iter().position(|(existing, _)| existing == name)?;
        Some(self.0.remove(position).1)
    }

    pub(crate) fn into_inner(self) -> Vec<(String, AttributeValue)> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_existing_names_in_place() {
        let mut list = AttributeList::default();
        list.insert("a".to_owned(), AttributeValue::from(1_i64));
        list.insert("b".to_owned(), AttributeValue::from(2_i64));
        list.insert("a".to_owned(), AttributeValue::from(3_i64));
        let names: Vec<_> = list
            .clone()
            .into_inner()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(list.remove("a"), Some(AttributeValue::from(3_i64)));
        assert_eq!(list.remove("a"), None);
    }

    #[test]
    fn ranges_become_per_instance_integers() {
        assert_eq!(
            AttributeValue::from(0_i64..3),
            AttributeValue::PerInstance(Column::Int(vec![0, 1, 2]))
        );
    }
}

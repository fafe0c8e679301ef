//! Group signatures, group assignment and type tables.
//!
//! Instances whose per-instance attributes share the same `(name, dtype)`
//! signature are stored together in one group. [`SchemaRegistry`] assigns
//! group ids in first-seen order and hands out contiguous `group_index`
//! ranges; [`TypeTable`] keeps the type-level attributes, one row per type id.

use std::collections::HashMap;

use crate::{
    error::{NetworkError, Result, TypeScope},
    value::{DType, Value},
};

/// First type id handed out when a declaration does not supply one.
pub const FIRST_AUTO_TYPE_ID: u64 = 100;

/// Sorted list of `(attribute, dtype)` pairs identifying a group.
///
/// # Examples
/// ```
/// use netloom_core::{DType, GroupSignature};
///
/// let a = GroupSignature::new([("y", DType::Float), ("x", DType::Int)]);
/// let b = GroupSignature::new([("x", DType::Int), ("y", DType::Float)]);
/// assert_eq!(a, b);
/// assert_eq!(a.names().collect::<Vec<_>>(), ["x", "y"]);
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GroupSignature(Vec<(String, DType)>);

impl GroupSignature {
    /// Builds a signature from unordered fields.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, DType)>,
        S: Into<String>,
    {
        let mut fields: Vec<(String, DType)> = fields
            .into_iter()
            .map(|(name, dtype)| (name.into(), dtype))
            .collect();
        fields.sort();
        Self(fields)
    }

    /// Returns the fields in name order.
    #[must_use]
    pub fn fields(&self) -> &[(String, DType)] {
        &self.0
    }

    /// Iterates the attribute names in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the dtype declared for `name`.
    #[must_use]
    pub fn dtype(&self, name: &str) -> Option<DType> {
        self.0
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, dtype)| *dtype)
    }

    /// Returns whether the signature has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A group known to the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupLayout {
    /// Attributes stored by the group.
    pub signature: GroupSignature,
    /// Number of instances assigned so far.
    pub size: u64,
}

/// Position of a run of instances inside a group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GroupSlot {
    /// Group the instances belong to.
    pub group_id: u32,
    /// `group_index` of the first instance.
    pub offset: u64,
}

/// Assigns group ids and contiguous group indices.
///
/// Registration is split into two passes: [`SchemaRegistry::intern`] fixes the
/// group ids in first-seen order, [`SchemaRegistry::reserve`] then hands out
/// index ranges, so the cost stays linear in the number of declarations.
///
/// # Examples
/// ```
/// use netloom_core::{DType, GroupSignature, SchemaRegistry};
///
/// let mut registry = SchemaRegistry::new();
/// let positions = GroupSignature::new([("positions", DType::Vector(3))]);
/// let weights = GroupSignature::new([("weight", DType::Float)]);
/// assert_eq!(registry.intern(&positions), 0);
/// assert_eq!(registry.intern(&weights), 1);
/// assert_eq!(registry.intern(&positions), 0);
///
/// assert_eq!(registry.reserve(0, 10).offset, 0);
/// assert_eq!(registry.reserve(0, 5).offset, 10);
/// assert_eq!(registry.groups()[0].size, 15);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    groups: Vec<GroupLayout>,
    lookup: HashMap<GroupSignature, u32>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the group id for `signature`, registering it when unseen.
    pub fn intern(&mut self, signature: &GroupSignature) -> u32 {
        if let Some(&group_id) = self.lookup.get(signature) {
            return group_id;
        }
        let group_id = u32::try_from(self.groups.len()).unwrap_or(u32::MAX);
        self.groups.push(GroupLayout {
            signature: signature.clone(),
            size: 0,
        });
        self.lookup.insert(signature.clone(), group_id);
        group_id
    }

    /// Reserves `count` consecutive indices in `group_id`.
    ///
    /// Unknown group ids yield an offset of zero and reserve nothing.
    pub fn reserve(&mut self, group_id: u32, count: u64) -> GroupSlot {
        let offset = self
            .groups
            .get_mut(group_id as usize)
            .map_or(0, |group| {
                let offset = group.size;
                group.size += count;
                offset
            });
        GroupSlot { group_id, offset }
    }

    /// Interns `signature` and reserves `count` indices in one step.
    pub fn assign(&mut self, signature: &GroupSignature, count: u64) -> GroupSlot {
        let group_id = self.intern(signature);
        self.reserve(group_id, count)
    }

    /// Returns the registered groups indexed by group id.
    #[must_use]
    pub fn groups(&self) -> &[GroupLayout] {
        &self.groups
    }

    /// Consumes the registry, returning its groups.
    #[must_use]
    pub fn into_groups(self) -> Vec<GroupLayout> {
        self.groups
    }
}

/// Type-level attributes, one row per type id.
///
/// Columns are the union of attribute names in first-seen order; missing
/// cells are rendered with a caller-supplied null token.
///
/// # Examples
/// ```
/// use netloom_core::{TypeTable, Value};
///
/// let mut table = TypeTable::default();
/// table.insert(100, vec![("model_type".to_owned(), Value::from("biophysical"))]);
/// table.insert(101, vec![("ei".to_owned(), Value::from("e"))]);
/// assert_eq!(table.columns(), ["model_type", "ei"]);
/// assert_eq!(table.render_row(101, "NULL"), Some(vec!["NULL".to_owned(), "e".to_owned()]));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeTable {
    columns: Vec<String>,
    rows: Vec<(u64, Vec<(String, Value)>)>,
}

impl TypeTable {
    /// Adds a row for `type_id`; repeated ids keep their first row.
    pub fn insert(&mut self, type_id: u64, attributes: Vec<(String, Value)>) {
        if self.contains(type_id) {
            return;
        }
        for (name, _) in &attributes {
            if !self.columns.iter().any(|column| column == name) {
                self.columns.push(name.clone());
            }
        }
        self.rows.push((type_id, attributes));
    }

    /// Returns whether `type_id` has a row.
    #[must_use]
    pub fn contains(&self, type_id: u64) -> bool {
        self.rows.iter().any(|(id, _)| *id == type_id)
    }

    /// Returns the attribute columns in first-seen order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Iterates the type ids in insertion order.
    pub fn type_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.iter().map(|(id, _)| *id)
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the attributes declared for `type_id`.
    #[must_use]
    pub fn attributes(&self, type_id: u64) -> Option<&[(String, Value)]> {
        self.rows
            .iter()
            .find(|(id, _)| *id == type_id)
            .map(|(_, attributes)| attributes.as_slice())
    }

    /// Returns a single type attribute.
    #[must_use]
    pub fn get(&self, type_id: u64, name: &str) -> Option<&Value> {
        self.attributes(type_id)?
            .iter()
            .find(|(attribute, _)| attribute == name)
            .map(|(_, value)| value)
    }

    /// Renders the cells of `type_id` in column order.
    #[must_use]
    pub fn render_row(&self, type_id: u64, null_token: &str) -> Option<Vec<String>> {
        let attributes = self.attributes(type_id)?;
        Some(
            self.columns
                .iter()
                .map(|column| {
                    attributes
                        .iter()
                        .find(|(name, _)| name == column)
                        .map_or_else(|| null_token.to_owned(), |(_, value)| value.to_string())
                })
                .collect(),
        )
    }

    /// Merges the rows of `other`, keeping existing rows for repeated ids.
    pub fn merge(&mut self, other: &Self) {
        for (type_id, attributes) in &other.rows {
            self.insert(*type_id, attributes.clone());
        }
    }
}

/// Hands out type ids and enforces that reused ids keep their attributes.
#[derive(Clone, Debug)]
pub(crate) struct TypeIdAllocator {
    scope: TypeScope,
    next: u64,
    known: HashMap<u64, Vec<(String, Value)>>,
}

impl TypeIdAllocator {
    pub(crate) fn new(scope: TypeScope) -> Self {
        Self {
            scope,
            next: FIRST_AUTO_TYPE_ID,
            known: HashMap::new(),
        }
    }

    /// Resolves the type id for a declaration.
    ///
    /// Reusing an id is accepted only when the attribute maps are identical.
    pub(crate) fn resolve(
        &mut self,
        requested: Option<u64>,
        attributes: &[(String, Value)],
    ) -> Result<u64> {
        let mut normalized = attributes.to_vec();
        normalized.sort_by(|a, b| a.0.cmp(&b.0));
        let type_id = match requested {
            Some(type_id) => type_id,
            None => {
                while self.known.contains_key(&self.next) {
                    self.next += 1;
                }
                self.next
            }
        };
        match self.known.get(&type_id) {
            Some(existing) if *existing != normalized => Err(NetworkError::TypeIdConflict {
                scope: self.scope,
                type_id,
            }),
            Some(_) => Ok(type_id),
            None => {
                self.known.insert(type_id, normalized);
                Ok(type_id)
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.next = FIRST_AUTO_TYPE_ID;
        self.known.clear();
    }
}

//! Node declarations and the immutable node table produced by a build.

use std::{collections::HashMap, fmt};

use crate::{
    attribute::{AttributeList, AttributeValue, NODE_ID, NODE_TYPE_ID},
    error::{NetworkError, Result},
    pool::Selector,
    schema::{GroupLayout, GroupSignature, GroupSlot, SchemaRegistry, TypeTable},
    value::{Column, Value},
};

/// Describes one batch of nodes added to a network.
///
/// Scalars become type-level attributes stored once in the node type table;
/// sequences must hold one value per node and are stored in the node's group.
///
/// # Examples
/// ```
/// use netloom_core::NodeDeclaration;
///
/// let declaration = NodeDeclaration::new(3)
///     .with_attribute("model_type", "biophysical")
///     .with_attribute("positions", vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]])
///     .with_node_type_id(101);
/// assert_eq!(declaration.count(), 3);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeDeclaration {
    count: usize,
    attributes: AttributeList,
}

impl NodeDeclaration {
    /// Declares `count` nodes without attributes.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            count,
            attributes: AttributeList::default(),
        }
    }

    /// Returns the number of declared nodes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Attaches an attribute; reserved names are validated when added.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Fixes the node type id instead of letting the network assign one.
    #[must_use]
    pub fn with_node_type_id(self, node_type_id: u64) -> Self {
        let id = i64::try_from(node_type_id).unwrap_or(i64::MAX);
        self.with_attribute(NODE_TYPE_ID, Value::Int(id))
    }

    /// Supplies explicit node ids, one per node.
    #[must_use]
    pub fn with_node_ids(self, node_ids: impl IntoIterator<Item = u64>) -> Self {
        let ids: Vec<i64> = node_ids
            .into_iter()
            .map(|id| i64::try_from(id).unwrap_or(i64::MAX))
            .collect();
        self.with_attribute(NODE_ID, Column::Int(ids))
    }

    /// Splits attributes into reserved, type-level and group-level parts.
    pub(crate) fn validate(self) -> Result<ValidatedNodes> {
        let count = self.count;
        let mut attributes = self.attributes;
        let node_ids = attributes
            .remove(NODE_ID)
            .map(|value| reserved_node_ids(value, count))
            .transpose()?;
        let node_type_id = attributes
            .remove(NODE_TYPE_ID)
            .map(|value| reserved_type_id(value, NODE_TYPE_ID))
            .transpose()?;

        let mut type_attributes = Vec::new();
        let mut columns = Vec::new();
        for (name, value) in attributes.into_inner() {
            match value {
                AttributeValue::Uniform(value) => type_attributes.push((name, value)),
                AttributeValue::PerInstance(column) => {
                    if column.len() != count {
                        return Err(NetworkError::AttributeLengthMismatch {
                            attribute: name,
                            expected: count,
                            actual: column.len(),
                        });
                    }
                    columns.push((name, column));
                }
            }
        }
        columns.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ValidatedNodes {
            count,
            node_type_id,
            node_ids,
            type_attributes,
            columns,
        })
    }
}

fn reserved_node_ids(value: AttributeValue, count: usize) -> Result<Vec<u64>> {
    let invalid = || NetworkError::InvalidReservedAttribute {
        attribute: NODE_ID,
        reason: "must hold one non-negative integer per node",
    };
    let AttributeValue::PerInstance(Column::Int(ids)) = value else {
        return Err(invalid());
    };
    if ids.len() != count {
        return Err(NetworkError::AttributeLengthMismatch {
            attribute: NODE_ID.to_owned(),
            expected: count,
            actual: ids.len(),
        });
    }
    ids.into_iter()
        .map(|id| u64::try_from(id).map_err(|_| invalid()))
        .collect()
}

/// Extracts a uniform, non-negative integer type id.
pub(crate) fn reserved_type_id(value: AttributeValue, attribute: &'static str) -> Result<u64> {
    match value {
        AttributeValue::Uniform(Value::Int(id)) => {
            u64::try_from(id).map_err(|_| NetworkError::InvalidReservedAttribute {
                attribute,
                reason: "must be a non-negative integer",
            })
        }
        _ => Err(NetworkError::InvalidReservedAttribute {
            attribute,
            reason: "must be a single uniform integer",
        }),
    }
}

/// A declaration whose attributes passed validation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ValidatedNodes {
    pub(crate) count: usize,
    pub(crate) node_type_id: Option<u64>,
    pub(crate) node_ids: Option<Vec<u64>>,
    pub(crate) type_attributes: Vec<(String, Value)>,
    pub(crate) columns: Vec<(String, Column)>,
}

/// A validated declaration with its resolved type id.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct NodeBatch {
    pub(crate) node_type_id: u64,
    pub(crate) nodes: ValidatedNodes,
}

impl NodeBatch {
    fn signature(&self) -> GroupSignature {
        GroupSignature::new(
            self.nodes
                .columns
                .iter()
                .map(|(name, column)| (name.as_str(), column.dtype())),
        )
    }
}

/// Position of a node inside a [`NodeSet`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct NodeLocation {
    pub(crate) batch: usize,
    pub(crate) row: usize,
}

#[derive(Debug)]
struct BuiltBatch {
    node_ids: Vec<u64>,
    node_type_id: u64,
    slot: GroupSlot,
    type_attributes: Vec<(String, Value)>,
    columns: Vec<(String, Column)>,
}

impl BuiltBatch {
    fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, column)| column)
    }

    fn type_attribute(&self, name: &str) -> Option<&Value> {
        self.type_attributes
            .iter()
            .find(|(attribute, _)| attribute == name)
            .map(|(_, value)| value)
    }
}

/// The immutable node table of a built network.
///
/// Nodes keep declaration order: batches in the order they were added and
/// rows in the order they were declared within each batch.
#[derive(Debug)]
pub struct NodeSet {
    network: String,
    origin: u64,
    batches: Vec<BuiltBatch>,
    index: HashMap<u64, NodeLocation>,
    groups: Vec<GroupLayout>,
    types: TypeTable,
    len: usize,
}

impl NodeSet {
    /// Materializes the declared batches.
    ///
    /// User-supplied ids are collected first; the remaining nodes receive
    /// consecutive ids continuing after the largest supplied id.
    pub(crate) fn build(network: &str, batches: &[NodeBatch]) -> Result<Self> {
        let mut index = HashMap::new();
        let mut next_id = 0_u64;
        for (batch_idx, batch) in batches.iter().enumerate() {
            for (row, &node_id) in batch.nodes.node_ids.iter().flatten().enumerate() {
                let location = NodeLocation {
                    batch: batch_idx,
                    row,
                };
                if index.insert(node_id, location).is_some() {
                    return Err(NetworkError::DuplicateNodeId { node_id });
                }
                next_id = next_id.max(node_id.saturating_add(1));
            }
        }

        let signatures: Vec<GroupSignature> = batches.iter().map(NodeBatch::signature).collect();
        let mut registry = SchemaRegistry::new();
        let group_ids: Vec<u32> = signatures
            .iter()
            .map(|signature| registry.intern(signature))
            .collect();

        let mut types = TypeTable::default();
        let mut built = Vec::with_capacity(batches.len());
        for (batch_idx, (batch, group_id)) in batches.iter().zip(group_ids).enumerate() {
            let count = batch.nodes.count;
            let node_ids = if let Some(ids) = &batch.nodes.node_ids {
                ids.clone()
            } else {
                let ids: Vec<u64> = (next_id..).take(count).collect();
                for (row, &node_id) in ids.iter().enumerate() {
                    index.insert(
                        node_id,
                        NodeLocation {
                            batch: batch_idx,
                            row,
                        },
                    );
                }
                next_id += count as u64;
                ids
            };
            types.insert(batch.node_type_id, batch.nodes.type_attributes.clone());
            built.push(BuiltBatch {
                node_ids,
                node_type_id: batch.node_type_id,
                slot: registry.reserve(group_id, count as u64),
                type_attributes: batch.nodes.type_attributes.clone(),
                columns: batch.nodes.columns.clone(),
            });
        }

        let len = built.iter().map(|batch| batch.node_ids.len()).sum();
        Ok(Self {
            network: network.to_owned(),
            origin: 0,
            batches: built,
            index,
            groups: registry.into_groups(),
            types,
            len,
        })
    }

    /// Tags the set with the identity of the network instance that built it.
    pub(crate) fn with_origin(mut self, origin: u64) -> Self {
        self.origin = origin;
        self
    }

    /// Returns the owning network's name.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    pub(crate) fn origin(&self) -> u64 {
        self.origin
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the set holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates every node in node-table order.
    pub fn iter(&self) -> impl Iterator<Item = Node<'_>> {
        self.batches.iter().flat_map(move |batch| {
            (0..batch.node_ids.len()).map(move |row| Node {
                set: self,
                batch,
                row,
            })
        })
    }

    /// Looks a node up by id.
    #[must_use]
    pub fn get(&self, node_id: u64) -> Option<Node<'_>> {
        self.index
            .get(&node_id)
            .and_then(|location| self.node(*location))
    }

    /// Returns the node groups indexed by group id.
    #[must_use]
    pub fn groups(&self) -> &[GroupLayout] {
        &self.groups
    }

    /// Returns the node type table.
    #[must_use]
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Returns the largest node id, if any.
    #[must_use]
    pub fn max_node_id(&self) -> Option<u64> {
        self.index.keys().copied().max()
    }

    /// Concatenates the values of `attribute` for every member of `group_id`,
    /// ordered by group index.
    #[must_use]
    pub fn group_column(&self, group_id: u32, attribute: &str) -> Option<Column> {
        let dtype = self.groups.get(group_id as usize)?.signature.dtype(attribute)?;
        let mut column = Column::empty(dtype);
        for batch in self.batches.iter().filter(|batch| batch.slot.group_id == group_id) {
            column.extend_from(batch.column(attribute)?).ok()?;
        }
        Some(column)
    }

    pub(crate) fn node(&self, location: NodeLocation) -> Option<Node<'_>> {
        let batch = self.batches.get(location.batch)?;
        (location.row < batch.node_ids.len()).then_some(Node {
            set: self,
            batch,
            row: location.row,
        })
    }

    /// Resolves `selector` to node locations in node-table order.
    pub(crate) fn select(&self, selector: &Selector) -> Vec<NodeLocation> {
        match selector {
            Selector::Ids(ids) => {
                let mut locations: Vec<NodeLocation> = ids
                    .iter()
                    .filter_map(|id| self.index.get(id).copied())
                    .collect();
                locations.sort_unstable();
                locations
            }
            _ => self
                .batches
                .iter()
                .enumerate()
                .flat_map(|(batch_idx, batch)| {
                    (0..batch.node_ids.len()).map(move |row| NodeLocation {
                        batch: batch_idx,
                        row,
                    })
                })
                .filter(|location| {
                    self.node(*location)
                        .is_some_and(|node| selector.matches(&node))
                })
                .collect(),
        }
    }
}

/// Read-only view of one built node.
#[derive(Clone, Copy)]
pub struct Node<'a> {
    set: &'a NodeSet,
    batch: &'a BuiltBatch,
    row: usize,
}

impl<'a> Node<'a> {
    /// Returns the node id.
    #[must_use]
    pub fn node_id(&self) -> u64 {
        self.batch.node_ids[self.row]
    }

    /// Returns the node type id.
    #[must_use]
    pub fn node_type_id(&self) -> u64 {
        self.batch.node_type_id
    }

    /// Returns the id of the group storing this node's attributes.
    #[must_use]
    pub fn group_id(&self) -> u32 {
        self.batch.slot.group_id
    }

    /// Returns the node's row inside its group.
    #[must_use]
    pub fn group_index(&self) -> u64 {
        self.batch.slot.offset + self.row as u64
    }

    /// Returns the owning network's name.
    #[must_use]
    pub fn network(&self) -> &'a str {
        &self.set.network
    }

    /// Looks up an attribute: group attributes first, then type attributes,
    /// then the reserved ids.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(column) = self.batch.column(name) {
            return column.get(self.row);
        }
        if let Some(value) = self.batch.type_attribute(name) {
            return Some(value.clone());
        }
        self.reserved(name)
    }

    /// Returns a numeric attribute as a float.
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|value| value.as_f64())
    }

    /// Returns an integer attribute.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|value| value.as_i64())
    }

    /// Returns a string attribute without copying it.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&'a str> {
        match self.batch.column(name) {
            Some(Column::Str(values)) => values.get(self.row).map(String::as_str),
            Some(_) => None,
            None => self.batch.type_attribute(name).and_then(Value::as_str),
        }
    }

    /// Returns whether the attribute `name` equals `expected`.
    ///
    /// Missing attributes never match.
    #[must_use]
    pub fn attribute_matches(&self, name: &str, expected: &Value) -> bool {
        if let Some(column) = self.batch.column(name) {
            return column.matches_at(self.row, expected);
        }
        if let Some(value) = self.batch.type_attribute(name) {
            return value.matches(expected);
        }
        self.reserved(name)
            .is_some_and(|value| value.matches(expected))
    }

    fn reserved(&self, name: &str) -> Option<Value> {
        let id = match name {
            NODE_ID => self.node_id(),
            NODE_TYPE_ID => self.node_type_id(),
            _ => return None,
        };
        i64::try_from(id).ok().map(Value::Int)
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("network", &self.network())
            .field("node_id", &self.node_id())
            .field("node_type_id", &self.node_type_id())
            .field("group_id", &self.group_id())
            .field("group_index", &self.group_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DType;

    fn batch(node_type_id: u64, declaration: NodeDeclaration) -> NodeBatch {
        NodeBatch {
            node_type_id,
            nodes: declaration.validate().expect("declaration is valid"),
        }
    }

    #[test]
    fn validate_splits_uniform_and_per_instance_attributes() {
        let nodes = NodeDeclaration::new(2)
            .with_attribute("ei", "e")
            .with_attribute("weight", vec![0.5, 1.5])
            .validate()
            .expect("declaration is valid");
        assert_eq!(nodes.type_attributes, [("ei".to_owned(), Value::from("e"))]);
        assert_eq!(nodes.columns.len(), 1);
        assert_eq!(nodes.columns[0].1.dtype(), DType::Float);
    }

    #[test]
    fn validate_rejects_short_columns() {
        let err = NodeDeclaration::new(100)
            .with_attribute("positions", vec![[0.0; 3]; 101])
            .validate()
            .expect_err("length mismatch must fail");
        assert!(matches!(
            err,
            NetworkError::AttributeLengthMismatch {
                expected: 100,
                actual: 101,
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_uniform_node_ids() {
        let err = NodeDeclaration::new(2)
            .with_attribute(NODE_ID, 5_i64)
            .validate()
            .expect_err("node ids must be per instance");
        assert!(matches!(
            err,
            NetworkError::InvalidReservedAttribute { attribute: "node_id", .. }
        ));
    }

    #[test]
    fn validate_rejects_per_instance_type_ids() {
        let err = NodeDeclaration::new(2)
            .with_attribute(NODE_TYPE_ID, vec![1_i64, 2])
            .validate()
            .expect_err("type ids must be uniform");
        assert!(matches!(
            err,
            NetworkError::InvalidReservedAttribute {
                attribute: "node_type_id",
                ..
            }
        ));
    }

    #[test]
    fn build_continues_auto_ids_after_supplied_ids() {
        let batches = [
            batch(100, NodeDeclaration::new(2)),
            batch(101, NodeDeclaration::new(2).with_node_ids([10, 11])),
        ];
        let set = NodeSet::build("net", &batches).expect("build succeeds");
        let ids: Vec<u64> = set.iter().map(|node| node.node_id()).collect();
        assert_eq!(ids, [12, 13, 10, 11]);
        assert_eq!(set.max_node_id(), Some(13));
    }

    #[test]
    fn build_rejects_duplicate_supplied_ids() {
        let batches = [
            batch(100, NodeDeclaration::new(2).with_node_ids([1, 2])),
            batch(100, NodeDeclaration::new(1).with_node_ids([2])),
        ];
        let err = NodeSet::build("net", &batches).expect_err("duplicate ids fail");
        assert!(matches!(err, NetworkError::DuplicateNodeId { node_id: 2 }));
    }

    #[test]
    fn build_assigns_groups_by_signature() {
        let batches = [
            batch(100, NodeDeclaration::new(3).with_attribute("x", vec![1.0, 2.0, 3.0])),
            batch(101, NodeDeclaration::new(2)),
            batch(102, NodeDeclaration::new(2).with_attribute("x", vec![4.0, 5.0])),
        ];
        let set = NodeSet::build("net", &batches).expect("build succeeds");
        let slots: Vec<(u32, u64)> = set
            .iter()
            .map(|node| (node.group_id(), node.group_index()))
            .collect();
        assert_eq!(slots, [(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (0, 3), (0, 4)]);
        assert_eq!(
            set.group_column(0, "x"),
            Some(Column::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0]))
        );
        assert_eq!(set.group_column(1, "x"), None);
    }

    #[test]
    fn node_lookup_prefers_group_then_type_then_reserved() {
        let batches = [batch(
            100,
            NodeDeclaration::new(1)
                .with_attribute("ei", "e")
                .with_attribute("depth", vec![3_i64]),
        )];
        let set = NodeSet::build("net", &batches).expect("build succeeds");
        let node = set.get(0).expect("node 0 exists");
        assert_eq!(node.get("depth"), Some(Value::Int(3)));
        assert_eq!(node.get_str("ei"), Some("e"));
        assert_eq!(node.get("node_type_id"), Some(Value::Int(100)));
        assert_eq!(node.get("missing"), None);
    }
}

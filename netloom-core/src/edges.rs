//! Materialized edge populations and edge queries.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::Arc,
};

use crate::{
    attribute::{EDGE_TYPE_ID, NSYNS},
    error::SortError,
    index::EdgeIndex,
    nodes::{Node, NodeSet},
    pool::Selector,
    schema::{GroupSignature, SchemaRegistry, TypeTable},
    sort::{SortOptions, visit_sorted_rows},
    value::{Column, Value},
};

/// Per-edge properties shared by every edge of one group.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeGroup {
    signature: GroupSignature,
    columns: Vec<(String, Column)>,
}

impl EdgeGroup {
    fn new(signature: GroupSignature) -> Self {
        let columns = signature
            .fields()
            .iter()
            .map(|(name, dtype)| (name.clone(), Column::empty(*dtype)))
            .collect();
        Self { signature, columns }
    }

    /// Returns the `(name, dtype)` signature of the group.
    #[must_use]
    pub fn signature(&self) -> &GroupSignature {
        &self.signature
    }

    /// Returns the property columns in name order.
    #[must_use]
    pub fn columns(&self) -> &[(String, Column)] {
        &self.columns
    }

    /// Returns the column holding `name`.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, column)| column)
    }
}

/// Edges between one source network and one target network.
///
/// Rows are stored in materialization order until [`EdgeTable::sorted`]
/// reorders them; group properties are never moved, rows reference them
/// through `(edge_group_id, edge_group_index)`.
#[derive(Clone)]
pub struct EdgeTable {
    source_nodes: Arc<NodeSet>,
    target_nodes: Arc<NodeSet>,
    source_node_ids: Vec<u64>,
    target_node_ids: Vec<u64>,
    edge_ids: Vec<u64>,
    edge_type_ids: Vec<u64>,
    group_ids: Vec<u32>,
    group_indices: Vec<u64>,
    groups: Vec<EdgeGroup>,
    types: TypeTable,
    source_index: EdgeIndex,
    target_index: EdgeIndex,
}

impl EdgeTable {
    /// Returns the source network's name.
    #[must_use]
    pub fn source_network(&self) -> &str {
        self.source_nodes.network()
    }

    /// Returns the target network's name.
    #[must_use]
    pub fn target_network(&self) -> &str {
        self.target_nodes.network()
    }

    /// Returns the population name, `{source}_to_{target}`.
    #[must_use]
    pub fn population(&self) -> String {
        format!("{}_to_{}", self.source_network(), self.target_network())
    }

    /// Returns the source node set.
    #[must_use]
    pub fn source_nodes(&self) -> &Arc<NodeSet> {
        &self.source_nodes
    }

    /// Returns the target node set.
    #[must_use]
    pub fn target_nodes(&self) -> &Arc<NodeSet> {
        &self.target_nodes
    }

    /// Returns the number of edge rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edge_ids.len()
    }

    /// Returns whether the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edge_ids.is_empty()
    }

    /// Returns the number of connections, counting `nsyns` where present.
    #[must_use]
    pub fn connection_count(&self) -> u64 {
        self.iter().map(|edge| edge.nsyns()).sum()
    }

    /// Iterates the rows in storage order.
    pub fn iter(&self) -> impl Iterator<Item = Edge<'_>> {
        (0..self.len()).map(move |row| Edge { table: self, row })
    }

    /// Returns the edge stored at `row`.
    #[must_use]
    pub fn edge(&self, row: usize) -> Option<Edge<'_>> {
        (row < self.len()).then_some(Edge { table: self, row })
    }

    /// Returns the source id of every row.
    #[must_use]
    pub fn source_node_ids(&self) -> &[u64] {
        &self.source_node_ids
    }

    /// Returns the target id of every row.
    #[must_use]
    pub fn target_node_ids(&self) -> &[u64] {
        &self.target_node_ids
    }

    /// Returns the edge id of every row.
    #[must_use]
    pub fn edge_ids(&self) -> &[u64] {
        &self.edge_ids
    }

    /// Returns the edge type id of every row.
    #[must_use]
    pub fn edge_type_ids(&self) -> &[u64] {
        &self.edge_type_ids
    }

    /// Returns the group id of every row.
    #[must_use]
    pub fn group_ids(&self) -> &[u32] {
        &self.group_ids
    }

    /// Returns the group index of every row.
    #[must_use]
    pub fn group_indices(&self) -> &[u64] {
        &self.group_indices
    }

    /// Returns the edge groups indexed by group id.
    #[must_use]
    pub fn groups(&self) -> &[EdgeGroup] {
        &self.groups
    }

    /// Returns the edge type table.
    #[must_use]
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Returns the source to target index.
    #[must_use]
    pub fn source_index(&self) -> &EdgeIndex {
        &self.source_index
    }

    /// Returns the target to source index.
    #[must_use]
    pub fn target_index(&self) -> &EdgeIndex {
        &self.target_index
    }

    /// Returns a copy with rows reordered by `options`, indices rebuilt.
    ///
    /// Rows are copied into the new columns as the sort emits them, so no
    /// permutation or merged record list is kept alongside the copy.
    ///
    /// # Errors
    /// Returns [`SortError`] when the external sort fails.
    pub fn sorted(&self, options: &SortOptions) -> Result<Self, SortError> {
        let mut rows = RowColumns::with_capacity(self.len());
        visit_sorted_rows(&self.source_node_ids, &self.target_node_ids, options, |row| {
            rows.push_from(self, row);
        })?;
        Ok(Self {
            source_nodes: Arc::clone(&self.source_nodes),
            target_nodes: Arc::clone(&self.target_nodes),
            source_index: EdgeIndex::build(&rows.source_node_ids),
            target_index: EdgeIndex::build(&rows.target_node_ids),
            source_node_ids: rows.source_node_ids,
            target_node_ids: rows.target_node_ids,
            edge_ids: rows.edge_ids,
            edge_type_ids: rows.edge_type_ids,
            group_ids: rows.group_ids,
            group_indices: rows.group_indices,
            groups: self.groups.clone(),
            types: self.types.clone(),
        })
    }

    /// Returns the rows matching `query`, in storage order.
    #[must_use]
    pub fn select(&self, query: &EdgeQuery) -> Vec<usize> {
        if query
            .source_network
            .as_deref()
            .is_some_and(|name| name != self.source_network())
            || query
                .target_network
                .as_deref()
                .is_some_and(|name| name != self.target_network())
        {
            return Vec::new();
        }

        let source_ids = query
            .source_nodes
            .as_ref()
            .map(|selector| selected_ids(&self.source_nodes, selector));
        let target_ids = query
            .target_nodes
            .as_ref()
            .map(|selector| selected_ids(&self.target_nodes, selector));

        let mut rows: Vec<usize> = match (&source_ids, &target_ids) {
            (_, Some(targets)) => targets
                .iter()
                .flat_map(|&id| self.target_index.rows(id))
                .filter(|&row| {
                    source_ids
                        .as_ref()
                        .is_none_or(|sources| sources.contains(&self.source_node_ids[row]))
                })
                .collect(),
            (Some(sources), None) => sources
                .iter()
                .flat_map(|&id| self.source_index.rows(id))
                .collect(),
            (None, None) => (0..self.len()).collect(),
        };
        rows.retain(|&row| {
            query.attributes.iter().all(|(name, expected)| {
                self.edge(row)
                    .is_some_and(|edge| edge.attribute_matches(name, expected))
            })
        });
        rows.sort_unstable();
        rows
    }
}

impl fmt::Debug for EdgeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeTable")
            .field("population", &self.population())
            .field("rows", &self.len())
            .field("groups", &self.groups.len())
            .field("types", &self.types.len())
            .finish_non_exhaustive()
    }
}

fn selected_ids(nodes: &NodeSet, selector: &Selector) -> HashSet<u64> {
    nodes
        .select(selector)
        .into_iter()
        .filter_map(|location| nodes.node(location))
        .map(|node| node.node_id())
        .collect()
}

/// Per-row columns of an edge table under construction.
struct RowColumns {
    source_node_ids: Vec<u64>,
    target_node_ids: Vec<u64>,
    edge_ids: Vec<u64>,
    edge_type_ids: Vec<u64>,
    group_ids: Vec<u32>,
    group_indices: Vec<u64>,
}

impl RowColumns {
    fn with_capacity(rows: usize) -> Self {
        Self {
            source_node_ids: Vec::with_capacity(rows),
            target_node_ids: Vec::with_capacity(rows),
            edge_ids: Vec::with_capacity(rows),
            edge_type_ids: Vec::with_capacity(rows),
            group_ids: Vec::with_capacity(rows),
            group_indices: Vec::with_capacity(rows),
        }
    }

    fn push_from(&mut self, table: &EdgeTable, row: usize) {
        if row >= table.len() {
            return;
        }
        self.source_node_ids.push(table.source_node_ids[row]);
        self.target_node_ids.push(table.target_node_ids[row]);
        self.edge_ids.push(table.edge_ids[row]);
        self.edge_type_ids.push(table.edge_type_ids[row]);
        self.group_ids.push(table.group_ids[row]);
        self.group_indices.push(table.group_indices[row]);
    }
}

/// Accumulates the rows of one edge population during a build.
pub(crate) struct EdgeTableBuilder {
    source_nodes: Arc<NodeSet>,
    target_nodes: Arc<NodeSet>,
    source_node_ids: Vec<u64>,
    target_node_ids: Vec<u64>,
    edge_type_ids: Vec<u64>,
    group_ids: Vec<u32>,
    group_indices: Vec<u64>,
    registry: SchemaRegistry,
    groups: Vec<EdgeGroup>,
    types: TypeTable,
}

impl EdgeTableBuilder {
    pub(crate) fn new(source_nodes: Arc<NodeSet>, target_nodes: Arc<NodeSet>) -> Self {
        Self {
            source_nodes,
            target_nodes,
            source_node_ids: Vec::new(),
            target_node_ids: Vec::new(),
            edge_type_ids: Vec::new(),
            group_ids: Vec::new(),
            group_indices: Vec::new(),
            registry: SchemaRegistry::new(),
            groups: Vec::new(),
            types: TypeTable::default(),
        }
    }

    /// Returns the name of an endpoint set built by a different network
    /// instance than the one this population already holds.
    pub(crate) fn conflicting_network<'n>(
        &self,
        source: &'n NodeSet,
        target: &'n NodeSet,
    ) -> Option<&'n str> {
        if source.origin() != self.source_nodes.origin() {
            Some(source.network())
        } else if target.origin() != self.target_nodes.origin() {
            Some(target.network())
        } else {
            None
        }
    }

    pub(crate) fn add_type(&mut self, edge_type_id: u64, attributes: Vec<(String, Value)>) {
        self.types.insert(edge_type_id, attributes);
    }

    pub(crate) fn len(&self) -> usize {
        self.source_node_ids.len()
    }

    /// Appends one row; later duplicates of a property name win.
    pub(crate) fn push(
        &mut self,
        source: u64,
        target: u64,
        edge_type_id: u64,
        properties: impl IntoIterator<Item = (String, Value)>,
    ) {
        let properties: BTreeMap<String, Value> = properties.into_iter().collect();
        let signature = GroupSignature::new(
            properties
                .iter()
                .map(|(name, value)| (name.as_str(), value.dtype())),
        );
        let group_id = self.registry.intern(&signature);
        if group_id as usize == self.groups.len() {
            self.groups.push(EdgeGroup::new(signature));
        }
        let slot = self.registry.reserve(group_id, 1);
        if let Some(group) = self.groups.get_mut(group_id as usize) {
            // Signature order and BTreeMap order agree, so columns zip with values.
            for ((_, column), (_, value)) in group.columns.iter_mut().zip(properties) {
                let pushed = column.push(value);
                debug_assert!(pushed.is_ok(), "group columns follow the row signature");
            }
        }
        self.source_node_ids.push(source);
        self.target_node_ids.push(target);
        self.edge_type_ids.push(edge_type_id);
        self.group_ids.push(slot.group_id);
        self.group_indices.push(slot.offset);
    }

    pub(crate) fn finish(self) -> EdgeTable {
        let edge_ids = (0..self.source_node_ids.len() as u64).collect();
        EdgeTable {
            source_index: EdgeIndex::build(&self.source_node_ids),
            target_index: EdgeIndex::build(&self.target_node_ids),
            source_nodes: self.source_nodes,
            target_nodes: self.target_nodes,
            source_node_ids: self.source_node_ids,
            target_node_ids: self.target_node_ids,
            edge_ids,
            edge_type_ids: self.edge_type_ids,
            group_ids: self.group_ids,
            group_indices: self.group_indices,
            groups: self.groups,
            types: self.types,
        }
    }
}

/// Read-only view of one edge row.
#[derive(Clone, Copy)]
pub struct Edge<'a> {
    table: &'a EdgeTable,
    row: usize,
}

impl<'a> Edge<'a> {
    /// Returns the source node id.
    #[must_use]
    pub fn source_node_id(&self) -> u64 {
        self.table.source_node_ids[self.row]
    }

    /// Returns the target node id.
    #[must_use]
    pub fn target_node_id(&self) -> u64 {
        self.table.target_node_ids[self.row]
    }

    /// Returns the edge id assigned at materialization.
    #[must_use]
    pub fn edge_id(&self) -> u64 {
        self.table.edge_ids[self.row]
    }

    /// Returns the edge type id.
    #[must_use]
    pub fn edge_type_id(&self) -> u64 {
        self.table.edge_type_ids[self.row]
    }

    /// Returns the id of the group holding the edge's properties.
    #[must_use]
    pub fn group_id(&self) -> u32 {
        self.table.group_ids[self.row]
    }

    /// Returns the edge's row inside its group.
    #[must_use]
    pub fn group_index(&self) -> u64 {
        self.table.group_indices[self.row]
    }

    /// Returns the source network's name.
    #[must_use]
    pub fn source_network(&self) -> &'a str {
        self.table.source_network()
    }

    /// Returns the target network's name.
    #[must_use]
    pub fn target_network(&self) -> &'a str {
        self.table.target_network()
    }

    /// Returns the source node.
    #[must_use]
    pub fn source_node(&self) -> Option<Node<'a>> {
        self.table.source_nodes.get(self.source_node_id())
    }

    /// Returns the target node.
    #[must_use]
    pub fn target_node(&self) -> Option<Node<'a>> {
        self.table.target_nodes.get(self.target_node_id())
    }

    /// Returns how many connections the row stands for.
    #[must_use]
    pub fn nsyns(&self) -> u64 {
        self.group_value(NSYNS)
            .and_then(|value| value.as_i64())
            .and_then(|count| u64::try_from(count).ok())
            .unwrap_or(1)
    }

    /// Looks up a property: group properties first, then type attributes.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.group_value(name) {
            return Some(value);
        }
        if name == EDGE_TYPE_ID {
            return i64::try_from(self.edge_type_id()).ok().map(Value::Int);
        }
        self.table.types.get(self.edge_type_id(), name).cloned()
    }

    fn group_value(&self, name: &str) -> Option<Value> {
        let index = usize::try_from(self.group_index()).ok()?;
        self.group()?.column(name)?.get(index)
    }

    fn group(&self) -> Option<&'a EdgeGroup> {
        self.table.groups.get(self.group_id() as usize)
    }

    fn attribute_matches(&self, name: &str, expected: &Value) -> bool {
        if let Some(column) = self.group().and_then(|group| group.column(name)) {
            return usize::try_from(self.group_index())
                .is_ok_and(|index| column.matches_at(index, expected));
        }
        self.get(name).is_some_and(|value| value.matches(expected))
    }
}

impl fmt::Debug for Edge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("source", &(self.source_network(), self.source_node_id()))
            .field("target", &(self.target_network(), self.target_node_id()))
            .field("edge_type_id", &self.edge_type_id())
            .field("group_id", &self.group_id())
            .field("group_index", &self.group_index())
            .finish()
    }
}

/// Filters edges of a built network.
///
/// # Examples
/// ```
/// use netloom_core::{EdgeQuery, Selector};
///
/// let query = EdgeQuery::new()
///     .with_target_nodes(Selector::attribute("ei", "i"))
///     .with_source_network("LGN")
///     .with_attribute("nsyns", 3_i64);
/// assert_eq!(query.source_network(), Some("LGN"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct EdgeQuery {
    source_nodes: Option<Selector>,
    target_nodes: Option<Selector>,
    source_network: Option<String>,
    target_network: Option<String>,
    attributes: Vec<(String, Value)>,
}

impl EdgeQuery {
    /// Creates a query matching every edge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the source nodes.
    #[must_use]
    pub fn with_source_nodes(mut self, selector: impl Into<Selector>) -> Self {
        self.source_nodes = Some(selector.into());
        self
    }

    /// Restricts the target nodes.
    #[must_use]
    pub fn with_target_nodes(mut self, selector: impl Into<Selector>) -> Self {
        self.target_nodes = Some(selector.into());
        self
    }

    /// Restricts the source network.
    #[must_use]
    pub fn with_source_network(mut self, network: impl Into<String>) -> Self {
        self.source_network = Some(network.into());
        self
    }

    /// Restricts the target network.
    #[must_use]
    pub fn with_target_network(mut self, network: impl Into<String>) -> Self {
        self.target_network = Some(network.into());
        self
    }

    /// Requires a property or type attribute to equal `value`.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Returns the source network filter.
    #[must_use]
    pub fn source_network(&self) -> Option<&str> {
        self.source_network.as_deref()
    }

    /// Returns the target network filter.
    #[must_use]
    pub fn target_network(&self) -> Option<&str> {
        self.target_network.as_deref()
    }
}

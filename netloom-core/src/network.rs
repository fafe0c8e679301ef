//! The network builder: declarations, the build state machine and accessors.

use std::{
    collections::{BTreeMap, HashSet, btree_map::Entry},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::{debug, info, instrument};

use crate::{
    attribute::NSYNS,
    connector::connect,
    edges::{Edge, EdgeQuery, EdgeTable, EdgeTableBuilder},
    error::{NetworkError, Result, TypeScope},
    nodes::{NodeBatch, NodeDeclaration, NodeLocation, NodeSet},
    pool::{NodePool, Selector},
    rule::{
        ConnectionMap, EdgeDeclaration, Endpoint, RuleOutput, ValidatedEdges,
        is_reserved_edge_column,
    },
    schema::TypeIdAllocator,
    value::Value,
};

/// Type attribute marking electrical synapses.
pub const IS_GAP_JUNCTION: &str = "is_gap_junction";

static NEXT_NETWORK_ID: AtomicU64 = AtomicU64::new(1);

/// Whether a part of the network reflects its declarations.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BuildState {
    /// Declarations changed since the last build.
    Declared,
    /// Materialized data matches the declarations.
    Built,
}

/// A named collection of node and edge declarations.
///
/// Nodes and edges are materialized lazily: every accessor builds whatever
/// is out of date, and adding declarations returns the affected part to
/// [`BuildState::Declared`].
///
/// # Examples
/// ```
/// use netloom_core::{EdgeDeclaration, Network, NodeDeclaration, Selector};
///
/// let mut net = Network::new("V1")?;
/// net.add_nodes(NodeDeclaration::new(10).with_attribute("ei", "e"))?;
/// net.add_nodes(NodeDeclaration::new(5).with_attribute("ei", "i"))?;
/// net.add_edges(
///     EdgeDeclaration::new()
///         .with_source(Selector::attribute("ei", "e"))
///         .with_target(Selector::attribute("ei", "i"))
///         .with_rule(3),
/// )?;
/// net.build(false)?;
/// assert_eq!(net.nnodes()?, 15);
/// assert_eq!(net.nedges()?, 50);
/// assert_eq!(net.connection_count()?, 150);
/// # Ok::<(), netloom_core::NetworkError>(())
/// ```
#[derive(Debug)]
pub struct Network {
    id: u64,
    name: String,
    node_batches: Vec<NodeBatch>,
    connection_maps: Vec<ConnectionMap>,
    supplied_ids: HashSet<u64>,
    node_types: TypeIdAllocator,
    edge_types: TypeIdAllocator,
    nodes: Option<Arc<NodeSet>>,
    edges: Option<Vec<EdgeTable>>,
}

impl Network {
    /// Creates an empty network.
    ///
    /// # Errors
    /// Returns [`NetworkError::EmptyNetworkName`] for an empty name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(NetworkError::EmptyNetworkName);
        }
        Ok(Self {
            id: NEXT_NETWORK_ID.fetch_add(1, Ordering::Relaxed),
            name,
            node_batches: Vec::new(),
            connection_maps: Vec::new(),
            supplied_ids: HashSet::new(),
            node_types: TypeIdAllocator::new(TypeScope::Node),
            edge_types: TypeIdAllocator::new(TypeScope::Edge),
            nodes: None,
            edges: None,
        })
    }

    /// Returns the network name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the node table reflects every node declaration.
    #[must_use]
    pub fn nodes_state(&self) -> BuildState {
        if self.nodes.is_some() {
            BuildState::Built
        } else {
            BuildState::Declared
        }
    }

    /// Returns whether the edge tables reflect every edge declaration.
    #[must_use]
    pub fn edges_state(&self) -> BuildState {
        if self.edges.is_some() {
            BuildState::Built
        } else {
            BuildState::Declared
        }
    }

    /// Returns whether both nodes and edges are built.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.nodes.is_some() && self.edges.is_some()
    }

    /// Adds a batch of nodes.
    ///
    /// # Errors
    /// Returns a configuration error for malformed attributes or repeated node
    /// ids and [`NetworkError::TypeIdConflict`] when a node type id is reused
    /// with different type attributes.
    pub fn add_nodes(&mut self, declaration: NodeDeclaration) -> Result<()> {
        let nodes = declaration.validate()?;
        if let Some(ids) = &nodes.node_ids {
            let mut seen = HashSet::with_capacity(ids.len());
            for &node_id in ids {
                if self.supplied_ids.contains(&node_id) || !seen.insert(node_id) {
                    return Err(NetworkError::DuplicateNodeId { node_id });
                }
            }
        }
        let node_type_id = self
            .node_types
            .resolve(nodes.node_type_id, &nodes.type_attributes)?;
        if let Some(ids) = &nodes.node_ids {
            self.supplied_ids.extend(ids.iter().copied());
        }
        debug!(
            network = %self.name,
            count = nodes.count,
            node_type_id,
            "declared nodes"
        );
        self.node_batches.push(NodeBatch {
            node_type_id,
            nodes,
        });
        self.nodes = None;
        self.edges = None;
        Ok(())
    }

    /// Adds a set of chemical connections.
    ///
    /// The returned [`ConnectionMap`] accepts post-hoc properties until the
    /// network is built.
    ///
    /// # Errors
    /// Returns [`NetworkError::IncompatibleRule`] when the rule cannot be
    /// driven by the iteration strategy, and a schema conflict when the edge
    /// type id is reused with different attributes.
    pub fn add_edges(&mut self, declaration: EdgeDeclaration) -> Result<&mut ConnectionMap> {
        let edges = declaration.validate()?;
        self.check_pool_origin(&edges.source)?;
        self.check_pool_origin(&edges.target)?;
        self.register_edges(edges)
    }

    /// Adds a set of gap junctions between nodes of this network.
    ///
    /// # Errors
    /// Returns [`NetworkError::CrossNetworkGapJunction`] when either endpoint
    /// is a pool of another network, plus every error of [`Self::add_edges`].
    pub fn add_gap_junctions(
        &mut self,
        declaration: EdgeDeclaration,
    ) -> Result<&mut ConnectionMap> {
        let mut edges = declaration.validate()?;
        self.check_pool_origin(&edges.source)?;
        self.check_pool_origin(&edges.target)?;
        let source_network = self.endpoint_network(&edges.source).to_owned();
        let target_network = self.endpoint_network(&edges.target).to_owned();
        if source_network != self.name || target_network != self.name {
            return Err(NetworkError::CrossNetworkGapJunction {
                network: self.name.clone(),
                source_network,
                target_network,
            });
        }
        edges
            .type_attributes
            .retain(|(name, _)| name != IS_GAP_JUNCTION);
        edges
            .type_attributes
            .push((IS_GAP_JUNCTION.to_owned(), Value::Bool(true)));
        self.register_edges(edges)
    }

    /// Rejects pools of another network that carries this network's name.
    fn check_pool_origin(&self, endpoint: &Endpoint) -> Result<()> {
        match endpoint {
            Endpoint::Pool(pool) if pool.network() == self.name && pool.origin() != self.id => {
                Err(NetworkError::DuplicateNetworkName {
                    name: self.name.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn endpoint_network<'a>(&'a self, endpoint: &'a Endpoint) -> &'a str {
        match endpoint {
            Endpoint::Pool(pool) => pool.network(),
            Endpoint::All | Endpoint::Query(_) => &self.name,
        }
    }

    fn register_edges(&mut self, edges: ValidatedEdges) -> Result<&mut ConnectionMap> {
        let edge_type_id = self
            .edge_types
            .resolve(edges.edge_type_id, &edges.type_attributes)?;
        let index = self.connection_maps.len();
        debug!(
            network = %self.name,
            declaration = index,
            edge_type_id,
            rule = edges.rule.name(),
            iteration = %edges.iteration,
            "declared edges"
        );
        self.connection_maps.push(ConnectionMap {
            index,
            source: edges.source,
            target: edges.target,
            rule: edges.rule,
            iteration: edges.iteration,
            edge_type_id,
            type_attributes: edges.type_attributes,
            properties: Vec::new(),
        });
        self.edges = None;
        Ok(&mut self.connection_maps[index])
    }

    /// Materializes nodes and edges that are out of date, or everything when
    /// `force` is set.
    ///
    /// Nothing is replaced unless the whole build succeeds.
    ///
    /// # Errors
    /// Returns the first configuration or schema error met while
    /// materializing.
    #[instrument(
        name = "network.build",
        err,
        skip(self),
        fields(network = %self.name, force = force),
    )]
    pub fn build(&mut self, force: bool) -> Result<()> {
        if !force && self.is_built() {
            return Ok(());
        }
        let nodes = match &self.nodes {
            Some(nodes) if !force => Arc::clone(nodes),
            _ => self.build_nodes()?,
        };
        let edges = self.build_edges(&nodes)?;
        self.nodes = Some(nodes);
        self.edges = Some(edges);
        Ok(())
    }

    /// Builds whatever is out of date.
    ///
    /// # Errors
    /// See [`Self::build`].
    pub fn ensure_built(&mut self) -> Result<()> {
        self.build(false)
    }

    fn ensure_nodes(&mut self) -> Result<Arc<NodeSet>> {
        if let Some(nodes) = &self.nodes {
            return Ok(Arc::clone(nodes));
        }
        let nodes = self.build_nodes()?;
        self.nodes = Some(Arc::clone(&nodes));
        Ok(nodes)
    }

    #[instrument(name = "network.build_nodes", err, skip(self), fields(network = %self.name))]
    fn build_nodes(&self) -> Result<Arc<NodeSet>> {
        let nodes = Arc::new(NodeSet::build(&self.name, &self.node_batches)?.with_origin(self.id));
        info!(
            nodes = nodes.len(),
            groups = nodes.groups().len(),
            types = nodes.types().len(),
            "nodes built"
        );
        Ok(nodes)
    }

    #[instrument(name = "network.build_edges", err, skip(self, own), fields(network = %self.name))]
    fn build_edges(&self, own: &Arc<NodeSet>) -> Result<Vec<EdgeTable>> {
        let mut builders: BTreeMap<(String, String), EdgeTableBuilder> = BTreeMap::new();
        for map in &self.connection_maps {
            let (source_set, source_locations) = self.resolve_endpoint(&map.source, own);
            let (target_set, target_locations) = self.resolve_endpoint(&map.target, own);
            let sources: Vec<_> = source_locations
                .iter()
                .filter_map(|location| source_set.node(*location))
                .collect();
            let targets: Vec<_> = target_locations
                .iter()
                .filter_map(|location| target_set.node(*location))
                .collect();

            let key = (
                source_set.network().to_owned(),
                target_set.network().to_owned(),
            );
            let builder = match builders.entry(key) {
                Entry::Occupied(entry) => {
                    let builder = entry.into_mut();
                    if let Some(name) = builder.conflicting_network(&source_set, &target_set) {
                        return Err(NetworkError::DuplicateNetworkName {
                            name: name.to_owned(),
                        });
                    }
                    builder
                }
                Entry::Vacant(entry) => entry.insert(EdgeTableBuilder::new(
                    Arc::clone(&source_set),
                    Arc::clone(&target_set),
                )),
            };
            builder.add_type(map.edge_type_id, map.type_attributes.clone());
            let before = builder.len();
            connect(
                map.index,
                &map.rule,
                map.iteration,
                &sources,
                &targets,
                |source, target, output| {
                    let (source_id, target_id) = (source.node_id(), target.node_id());
                    match output {
                        RuleOutput::Count(count) if map.has_properties() => {
                            for _ in 0..count {
                                let row = map.evaluate_properties(source, target)?;
                                builder.push(source_id, target_id, map.edge_type_id, row);
                            }
                        }
                        RuleOutput::Count(count) => builder.push(
                            source_id,
                            target_id,
                            map.edge_type_id,
                            [(NSYNS.to_owned(), Value::Int(count))],
                        ),
                        RuleOutput::Edges(rows) => {
                            for row in rows {
                                if let Some(name) =
                                    row.keys().find(|name| is_reserved_edge_column(name))
                                {
                                    return Err(NetworkError::ReservedProperty {
                                        property: name.clone(),
                                    });
                                }
                                let extra = map.evaluate_properties(source, target)?;
                                builder.push(
                                    source_id,
                                    target_id,
                                    map.edge_type_id,
                                    row.into_iter().chain(extra),
                                );
                            }
                        }
                    }
                    Ok(())
                },
            )?;
            debug!(
                declaration = map.index,
                sources = sources.len(),
                targets = targets.len(),
                rows = builder.len() - before,
                "evaluated edge declaration"
            );
        }

        let tables: Vec<EdgeTable> = builders.into_values().map(EdgeTableBuilder::finish).collect();
        info!(
            populations = tables.len(),
            rows = tables.iter().map(EdgeTable::len).sum::<usize>(),
            "edges built"
        );
        Ok(tables)
    }

    /// Resolves an endpoint to its node set and selected rows.
    ///
    /// Pools of this network are re-evaluated against the current node table
    /// so they follow rebuilds.
    fn resolve_endpoint(
        &self,
        endpoint: &Endpoint,
        own: &Arc<NodeSet>,
    ) -> (Arc<NodeSet>, Vec<NodeLocation>) {
        match endpoint {
            Endpoint::All => (Arc::clone(own), own.select(&Selector::All)),
            Endpoint::Query(selector) => (Arc::clone(own), own.select(selector)),
            Endpoint::Pool(pool) if pool.origin() == self.id => {
                (Arc::clone(own), own.select(pool.selector()))
            }
            Endpoint::Pool(pool) => (Arc::clone(pool.node_set()), pool.locations().to_vec()),
        }
    }

    /// Returns a pool of every node, building nodes if required.
    ///
    /// # Errors
    /// See [`Self::build`].
    pub fn nodes(&mut self) -> Result<NodePool> {
        self.nodes_where(Selector::All)
    }

    /// Returns a pool of the nodes matching `selector`.
    ///
    /// # Errors
    /// See [`Self::build`].
    pub fn nodes_where(&mut self, selector: Selector) -> Result<NodePool> {
        Ok(NodePool::new(self.ensure_nodes()?, selector))
    }

    /// Returns the built node table.
    ///
    /// # Errors
    /// See [`Self::build`].
    pub fn node_set(&mut self) -> Result<Arc<NodeSet>> {
        self.ensure_nodes()
    }

    /// Returns the node table if it is built, without building.
    #[must_use]
    pub fn built_nodes(&self) -> Option<&Arc<NodeSet>> {
        self.nodes.as_ref()
    }

    /// Returns the edge populations if they are built, without building.
    #[must_use]
    pub fn built_edges(&self) -> Option<&[EdgeTable]> {
        self.edges.as_deref()
    }

    /// Returns every edge population, building if required.
    ///
    /// # Errors
    /// See [`Self::build`].
    pub fn edge_tables(&mut self) -> Result<&[EdgeTable]> {
        self.ensure_built()?;
        self.edges.as_deref().ok_or_else(|| NetworkError::NotBuilt {
            network: self.name.clone(),
        })
    }

    /// Returns the registered edge declarations.
    #[must_use]
    pub fn connection_maps(&self) -> &[ConnectionMap] {
        &self.connection_maps
    }

    /// Returns the number of nodes.
    ///
    /// # Errors
    /// See [`Self::build`].
    pub fn nnodes(&mut self) -> Result<usize> {
        Ok(self.ensure_nodes()?.len())
    }

    /// Returns the number of edge rows across populations.
    ///
    /// # Errors
    /// See [`Self::build`].
    pub fn nedges(&mut self) -> Result<usize> {
        Ok(self.edge_tables()?.iter().map(EdgeTable::len).sum())
    }

    /// Returns the number of connections, counting `nsyns` per row.
    ///
    /// # Errors
    /// See [`Self::build`].
    pub fn connection_count(&mut self) -> Result<u64> {
        Ok(self
            .edge_tables()?
            .iter()
            .map(EdgeTable::connection_count)
            .sum())
    }

    /// Returns the edges matching `query`, population by population.
    ///
    /// # Errors
    /// See [`Self::build`].
    pub fn edges(&mut self, query: &EdgeQuery) -> Result<Vec<Edge<'_>>> {
        let tables = self.edge_tables()?;
        Ok(tables
            .iter()
            .flat_map(|table| {
                table
                    .select(query)
                    .into_iter()
                    .filter_map(|row| table.edge(row))
            })
            .collect())
    }

    /// Discards every declaration and all built state.
    pub fn clear(&mut self) {
        self.node_batches.clear();
        self.connection_maps.clear();
        self.supplied_ids.clear();
        self.node_types.clear();
        self.edge_types.clear();
        self.nodes = None;
        self.edges = None;
        debug!(network = %self.name, "cleared network");
    }
}

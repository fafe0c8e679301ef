//! Connection rules, iteration strategies and edge declarations.

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    attribute::{AttributeList, AttributeValue, EDGE_TYPE_ID, NSYNS},
    error::{NetworkError, Result},
    nodes::{Node, reserved_type_id},
    pool::{NodePool, Selector},
    value::{DType, Value},
};

/// Properties of one edge row returned by a rule.
pub type EdgeProperties = BTreeMap<String, Value>;

/// Rule evaluated once per `(source, target)` pair.
pub type PairwiseFn = dyn Fn(&Node<'_>, &Node<'_>) -> RuleOutput + Send + Sync;

/// Rule evaluated once per anchor node against the whole opposite pool.
pub type PooledFn = dyn Fn(&Node<'_>, &[Node<'_>]) -> Vec<RuleOutput> + Send + Sync;

/// Rule computing post-hoc edge properties for one connection.
pub type PropertyFn = dyn Fn(&Node<'_>, &Node<'_>) -> Vec<Value> + Send + Sync;

/// Result of evaluating a rule for one pair.
#[derive(Clone, Debug, PartialEq)]
pub enum RuleOutput {
    /// Number of connections; zero or negative means none.
    Count(i64),
    /// One edge row per property map.
    Edges(Vec<EdgeProperties>),
}

impl RuleOutput {
    /// Returns the output for "no connection".
    #[must_use]
    pub const fn none() -> Self {
        Self::Count(0)
    }
}

impl From<i64> for RuleOutput {
    fn from(count: i64) -> Self {
        Self::Count(count)
    }
}

impl From<i32> for RuleOutput {
    fn from(count: i32) -> Self {
        Self::Count(i64::from(count))
    }
}

impl From<u32> for RuleOutput {
    fn from(count: u32) -> Self {
        Self::Count(i64::from(count))
    }
}

impl From<Option<i64>> for RuleOutput {
    fn from(count: Option<i64>) -> Self {
        Self::Count(count.unwrap_or(0))
    }
}

impl From<EdgeProperties> for RuleOutput {
    fn from(properties: EdgeProperties) -> Self {
        Self::Edges(vec![properties])
    }
}

impl From<Vec<EdgeProperties>> for RuleOutput {
    fn from(edges: Vec<EdgeProperties>) -> Self {
        Self::Edges(edges)
    }
}

/// How many connections each visited pair receives.
///
/// # Examples
/// ```
/// use netloom_core::{ConnectionRule, RuleOutput};
///
/// let same_layer = ConnectionRule::pairwise(|source, target| {
///     i64::from(source.get_str("layer") == target.get_str("layer"))
/// });
/// assert_eq!(same_layer.name(), "pairwise");
/// assert_eq!(ConnectionRule::default().name(), "constant");
/// let _ = RuleOutput::none();
/// ```
#[derive(Clone)]
pub enum ConnectionRule {
    /// The same count for every pair.
    Constant(i64),
    /// One count per visited pair, in visit order.
    Values(Vec<i64>),
    /// Function of the pair.
    Pairwise(Arc<PairwiseFn>),
    /// Function of an anchor node and the whole opposite pool.
    Pooled(Arc<PooledFn>),
}

impl Default for ConnectionRule {
    fn default() -> Self {
        Self::Constant(1)
    }
}

impl ConnectionRule {
    /// Wraps a pairwise rule.
    pub fn pairwise<F, R>(rule: F) -> Self
    where
        F: Fn(&Node<'_>, &Node<'_>) -> R + Send + Sync + 'static,
        R: Into<RuleOutput>,
    {
        Self::Pairwise(Arc::new(move |source, target| rule(source, target).into()))
    }

    /// Wraps a pooled rule; its result is aligned with the pool it receives.
    pub fn pooled<F, R>(rule: F) -> Self
    where
        F: Fn(&Node<'_>, &[Node<'_>]) -> Vec<R> + Send + Sync + 'static,
        R: Into<RuleOutput>,
    {
        Self::Pooled(Arc::new(move |anchor, pool| {
            rule(anchor, pool).into_iter().map(Into::into).collect()
        }))
    }

    /// Returns the variant name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Constant(_) => "constant",
            Self::Values(_) => "values",
            Self::Pairwise(_) => "pairwise",
            Self::Pooled(_) => "pooled",
        }
    }

    fn check(&self, iteration: IterationStrategy) -> Result<()> {
        let pooled_iteration = matches!(
            iteration,
            IterationStrategy::OneToAll | IterationStrategy::AllToOne
        );
        let compatible = match self {
            Self::Constant(_) => true,
            Self::Pooled(_) => pooled_iteration,
            Self::Pairwise(_) | Self::Values(_) => !pooled_iteration,
        };
        if compatible {
            Ok(())
        } else {
            Err(NetworkError::IncompatibleRule {
                rule: self.name(),
                iteration,
            })
        }
    }
}

impl fmt::Debug for ConnectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(count) => f.debug_tuple("Constant").field(count).finish(),
            Self::Values(values) => f.debug_tuple("Values").field(&values.len()).finish(),
            Self::Pairwise(_) => f.write_str("Pairwise(..)"),
            Self::Pooled(_) => f.write_str("Pooled(..)"),
        }
    }
}

impl From<i64> for ConnectionRule {
    fn from(count: i64) -> Self {
        Self::Constant(count)
    }
}

impl From<Vec<i64>> for ConnectionRule {
    fn from(values: Vec<i64>) -> Self {
        Self::Values(values)
    }
}

/// Order in which source and target nodes are visited.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum IterationStrategy {
    /// Cross product, source-major.
    #[default]
    AllToAll,
    /// Positional pairing of equally sized endpoints.
    OneToOne,
    /// Pooled rule once per source with every target.
    OneToAll,
    /// Pooled rule once per target with every source.
    AllToOne,
}

impl fmt::Display for IterationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AllToAll => "all_to_all",
            Self::OneToOne => "one_to_one",
            Self::OneToAll => "one_to_all",
            Self::AllToOne => "all_to_one",
        };
        f.write_str(name)
    }
}

/// One side of an edge declaration.
#[derive(Clone, Debug, Default)]
pub enum Endpoint {
    /// Every node of the declaring network.
    #[default]
    All,
    /// Nodes of the declaring network matching the selector.
    Query(Selector),
    /// An explicit pool, possibly of another network.
    Pool(NodePool),
}

impl From<Selector> for Endpoint {
    fn from(selector: Selector) -> Self {
        Self::Query(selector)
    }
}

impl From<NodePool> for Endpoint {
    fn from(pool: NodePool) -> Self {
        Self::Pool(pool)
    }
}

impl From<&NodePool> for Endpoint {
    fn from(pool: &NodePool) -> Self {
        Self::Pool(pool.clone())
    }
}

/// Describes a set of connections to add to a network.
///
/// Attributes are type-level: they are stored once in the edge type table.
///
/// # Examples
/// ```
/// use netloom_core::{ConnectionRule, EdgeDeclaration, IterationStrategy, Selector};
///
/// let declaration = EdgeDeclaration::new()
///     .with_source(Selector::attribute("ei", "e"))
///     .with_target(Selector::attribute("ei", "i"))
///     .with_rule(ConnectionRule::Constant(3))
///     .with_iteration(IterationStrategy::AllToAll)
///     .with_attribute("syn_weight", 0.5);
/// assert_eq!(declaration.iteration(), IterationStrategy::AllToAll);
/// ```
#[derive(Clone, Debug, Default)]
pub struct EdgeDeclaration {
    source: Endpoint,
    target: Endpoint,
    rule: ConnectionRule,
    iteration: IterationStrategy,
    attributes: AttributeList,
}

impl EdgeDeclaration {
    /// Creates an all-to-all declaration with one connection per pair.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source endpoint.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<Endpoint>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the target endpoint.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<Endpoint>) -> Self {
        self.target = target.into();
        self
    }

    /// Sets the connection rule.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<ConnectionRule>) -> Self {
        self.rule = rule.into();
        self
    }

    /// Sets the iteration strategy.
    #[must_use]
    pub fn with_iteration(mut self, iteration: IterationStrategy) -> Self {
        self.iteration = iteration;
        self
    }

    /// Fixes the edge type id instead of letting the network assign one.
    #[must_use]
    pub fn with_edge_type_id(self, edge_type_id: u64) -> Self {
        let id = i64::try_from(edge_type_id).unwrap_or(i64::MAX);
        self.with_attribute(EDGE_TYPE_ID, Value::Int(id))
    }

    /// Attaches a type-level attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns the iteration strategy.
    #[must_use]
    pub fn iteration(&self) -> IterationStrategy {
        self.iteration
    }

    pub(crate) fn validate(self) -> Result<ValidatedEdges> {
        self.rule.check(self.iteration)?;
        let mut attributes = self.attributes;
        let edge_type_id = attributes
            .remove(EDGE_TYPE_ID)
            .map(|value| reserved_type_id(value, EDGE_TYPE_ID))
            .transpose()?;
        let type_attributes = attributes
            .into_inner()
            .into_iter()
            .map(|(name, value)| match value {
                AttributeValue::Uniform(value) => Ok((name, value)),
                AttributeValue::PerInstance(_) => {
                    Err(NetworkError::PerInstanceEdgeAttribute { attribute: name })
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ValidatedEdges {
            source: self.source,
            target: self.target,
            rule: self.rule,
            iteration: self.iteration,
            edge_type_id,
            type_attributes,
        })
    }
}

pub(crate) struct ValidatedEdges {
    pub(crate) source: Endpoint,
    pub(crate) target: Endpoint,
    pub(crate) rule: ConnectionRule,
    pub(crate) iteration: IterationStrategy,
    pub(crate) edge_type_id: Option<u64>,
    pub(crate) type_attributes: Vec<(String, Value)>,
}

/// Post-hoc properties computed for every materialized connection.
#[derive(Clone)]
pub(crate) struct PropertyRule {
    pub(crate) names: Vec<String>,
    pub(crate) dtypes: Vec<DType>,
    pub(crate) rule: Arc<PropertyFn>,
}

/// A registered edge declaration.
///
/// Returned by [`crate::Network::add_edges`] so per-connection properties can
/// be attached before the network is built.
///
/// # Examples
/// ```
/// use netloom_core::{DType, EdgeDeclaration, Network, NodeDeclaration, Value};
///
/// let mut net = Network::new("V1")?;
/// net.add_nodes(NodeDeclaration::new(2))?;
/// net.add_edges(EdgeDeclaration::new().with_rule(2))?
///     .add_property("syn_weight", DType::Float, |_, _| Value::Float(0.5))?;
/// assert_eq!(net.nedges()?, 8);
/// # Ok::<(), netloom_core::NetworkError>(())
/// ```
#[derive(Clone)]
pub struct ConnectionMap {
    pub(crate) index: usize,
    pub(crate) source: Endpoint,
    pub(crate) target: Endpoint,
    pub(crate) rule: ConnectionRule,
    pub(crate) iteration: IterationStrategy,
    pub(crate) edge_type_id: u64,
    pub(crate) type_attributes: Vec<(String, Value)>,
    pub(crate) properties: Vec<PropertyRule>,
}

impl ConnectionMap {
    /// Returns the edge type id shared by the declaration's edges.
    #[must_use]
    pub fn edge_type_id(&self) -> u64 {
        self.edge_type_id
    }

    /// Returns the type-level attributes stored in the edge type table.
    #[must_use]
    pub fn type_attributes(&self) -> &[(String, Value)] {
        &self.type_attributes
    }

    /// Returns the position of the declaration within its network.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the iteration strategy.
    #[must_use]
    pub fn iteration(&self) -> IterationStrategy {
        self.iteration
    }

    /// Returns whether post-hoc properties are attached.
    #[must_use]
    pub fn has_properties(&self) -> bool {
        !self.properties.is_empty()
    }

    /// Attaches a single property computed from the connected pair.
    ///
    /// # Errors
    /// Returns [`NetworkError::ReservedProperty`] when `name` shadows a
    /// reserved edge column.
    pub fn add_property<F>(
        &mut self,
        name: impl Into<String>,
        dtype: DType,
        rule: F,
    ) -> Result<&mut Self>
    where
        F: Fn(&Node<'_>, &Node<'_>) -> Value + Send + Sync + 'static,
    {
        self.add_properties([name.into()], [dtype], move |source, target| {
            vec![rule(source, target)]
        })
    }

    /// Attaches several properties computed together from the connected pair.
    ///
    /// # Errors
    /// Returns [`NetworkError::PropertyArity`] when `names` and `dtypes` differ
    /// in length, and [`NetworkError::ReservedProperty`] when a name shadows a
    /// reserved edge column.
    pub fn add_properties<F>(
        &mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
        dtypes: impl IntoIterator<Item = DType>,
        rule: F,
    ) -> Result<&mut Self>
    where
        F: Fn(&Node<'_>, &Node<'_>) -> Vec<Value> + Send + Sync + 'static,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let dtypes: Vec<DType> = dtypes.into_iter().collect();
        if names.len() != dtypes.len() {
            return Err(NetworkError::PropertyArity {
                names: names.len(),
                dtypes: dtypes.len(),
            });
        }
        if let Some(reserved) = names.iter().find(|name| is_reserved_edge_column(name)) {
            return Err(NetworkError::ReservedProperty {
                property: reserved.clone(),
            });
        }
        self.properties.push(PropertyRule {
            names,
            dtypes,
            rule: Arc::new(rule),
        });
        Ok(self)
    }

    /// Evaluates every property rule for one connection.
    pub(crate) fn evaluate_properties(
        &self,
        source: &Node<'_>,
        target: &Node<'_>,
    ) -> Result<Vec<(String, Value)>> {
        let mut row = Vec::new();
        for property in &self.properties {
            let values = (property.rule)(source, target);
            if values.len() != property.names.len() {
                return Err(NetworkError::PropertyCount {
                    declaration: self.index,
                    expected: property.names.len(),
                    actual: values.len(),
                });
            }
            for ((name, dtype), value) in property.names.iter().zip(&property.dtypes).zip(values) {
                let actual = value.dtype();
                let value = value
                    .coerce(*dtype)
                    .ok_or_else(|| NetworkError::PropertyTypeMismatch {
                        declaration: self.index,
                        property: name.clone(),
                        expected: *dtype,
                        actual,
                    })?;
                row.push((name.clone(), value));
            }
        }
        Ok(row)
    }
}

impl fmt::Debug for ConnectionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionMap")
            .field("index", &self.index)
            .field("rule", &self.rule)
            .field("iteration", &self.iteration)
            .field("edge_type_id", &self.edge_type_id)
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}

/// Returns whether `name` is one of the fixed edge columns.
pub(crate) fn is_reserved_edge_column(name: &str) -> bool {
    matches!(
        name,
        "source_node_id"
            | "target_node_id"
            | "edge_id"
            | "edge_type_id"
            | "edge_group_id"
            | "edge_group_index"
    ) || name == NSYNS
}

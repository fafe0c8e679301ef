//! Node selectors and re-iterable node pools.

use std::{
    collections::BTreeSet,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};

use crate::{
    nodes::{Node, NodeLocation, NodeSet},
    value::Value,
};

/// Predicate used by [`Selector::Filter`].
pub type NodeFilter = dyn Fn(&Node<'_>) -> bool + Send + Sync;

/// Chooses a subset of a network's nodes.
///
/// Attribute criteria form a conjunction; each criterion accepts any of its
/// listed values. Attributes unknown to a node never match, so selecting on a
/// name no node carries yields an empty pool rather than an error.
///
/// # Examples
/// ```
/// use netloom_core::Selector;
///
/// let selector = Selector::attribute("ei", "e").and("location", "L4");
/// assert!(matches!(selector, Selector::Attributes(ref criteria) if criteria.len() == 2));
/// ```
#[derive(Clone, Default)]
pub enum Selector {
    /// Every node.
    #[default]
    All,
    /// Nodes whose ids are listed.
    Ids(BTreeSet<u64>),
    /// Conjunction of `name ∈ values` criteria.
    Attributes(Vec<(String, Vec<Value>)>),
    /// Arbitrary predicate.
    Filter(Arc<NodeFilter>),
}

impl Selector {
    /// Selects nodes by id.
    pub fn ids(ids: impl IntoIterator<Item = u64>) -> Self {
        Self::Ids(ids.into_iter().collect())
    }

    /// Selects nodes whose attribute `name` equals `value`.
    pub fn attribute(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Attributes(vec![(name.into(), vec![value.into()])])
    }

    /// Selects nodes whose attribute `name` equals any of `values`.
    pub fn attribute_in<V: Into<Value>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::Attributes(vec![(
            name.into(),
            values.into_iter().map(Into::into).collect(),
        )])
    }

    /// Selects nodes accepted by `predicate`.
    pub fn filter<F>(predicate: F) -> Self
    where
        F: Fn(&Node<'_>) -> bool + Send + Sync + 'static,
    {
        Self::Filter(Arc::new(predicate))
    }

    /// Narrows the selector with another attribute criterion.
    #[must_use]
    pub fn and(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self {
            Self::All => Self::Attributes(vec![(name, vec![value])]),
            Self::Attributes(mut criteria) => {
                criteria.push((name, vec![value]));
                Self::Attributes(criteria)
            }
            base @ (Self::Ids(_) | Self::Filter(_)) => Self::filter(move |node| {
                base.matches(node) && node.attribute_matches(&name, &value)
            }),
        }
    }

    /// Returns whether `node` is selected.
    #[must_use]
    pub fn matches(&self, node: &Node<'_>) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.contains(&node.node_id()),
            Self::Attributes(criteria) => criteria.iter().all(|(name, allowed)| {
                allowed
                    .iter()
                    .any(|value| node.attribute_matches(name, value))
            }),
            Self::Filter(predicate) => predicate(node),
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Ids(ids) => f.debug_tuple("Ids").field(ids).finish(),
            Self::Attributes(criteria) => f.debug_tuple("Attributes").field(criteria).finish(),
            Self::Filter(_) => f.write_str("Filter(..)"),
        }
    }
}

impl From<u64> for Selector {
    fn from(node_id: u64) -> Self {
        Self::ids([node_id])
    }
}

impl From<Vec<u64>> for Selector {
    fn from(node_ids: Vec<u64>) -> Self {
        Self::ids(node_ids)
    }
}

impl<const N: usize> From<[u64; N]> for Selector {
    fn from(node_ids: [u64; N]) -> Self {
        Self::ids(node_ids)
    }
}

impl From<&NodePool> for Selector {
    fn from(pool: &NodePool) -> Self {
        Self::ids(pool.node_ids())
    }
}

/// A re-iterable view over the nodes of a built network matching a selector.
///
/// The selection is resolved on first use and cached; the underlying
/// [`NodeSet`] is shared and never mutated.
#[derive(Clone)]
pub struct NodePool {
    nodes: Arc<NodeSet>,
    selector: Selector,
    members: Arc<OnceLock<Vec<NodeLocation>>>,
}

impl NodePool {
    /// Creates a pool over `nodes` restricted by `selector`.
    #[must_use]
    pub fn new(nodes: Arc<NodeSet>, selector: Selector) -> Self {
        Self {
            nodes,
            selector,
            members: Arc::new(OnceLock::new()),
        }
    }

    /// Returns the name of the network the nodes belong to.
    #[must_use]
    pub fn network(&self) -> &str {
        self.nodes.network()
    }

    pub(crate) fn origin(&self) -> u64 {
        self.nodes.origin()
    }

    /// Returns the selector defining the pool.
    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Returns the node set backing the pool.
    #[must_use]
    pub fn node_set(&self) -> &Arc<NodeSet> {
        &self.nodes
    }

    /// Returns the number of selected nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations().len()
    }

    /// Returns whether no node is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations().is_empty()
    }

    /// Iterates the selected nodes in node-table order.
    pub fn iter(&self) -> impl Iterator<Item = Node<'_>> {
        self.locations()
            .iter()
            .filter_map(|location| self.nodes.node(*location))
    }

    /// Returns the selected node ids in node-table order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<u64> {
        self.iter().map(|node| node.node_id()).collect()
    }

    /// Narrows the pool with a further selector.
    #[must_use]
    pub fn filter(&self, selector: Selector) -> Self {
        let outer = self.selector.clone();
        let combined = match outer {
            Selector::All => selector,
            outer => Selector::filter(move |node| outer.matches(node) && selector.matches(node)),
        };
        Self::new(Arc::clone(&self.nodes), combined)
    }

    pub(crate) fn locations(&self) -> &[NodeLocation] {
        self.members
            .get_or_init(|| self.nodes.select(&self.selector))
    }
}

impl PartialEq for NodePool {
    fn eq(&self, other: &Self) -> bool {
        self.network() == other.network() && self.node_ids() == other.node_ids()
    }
}

impl Eq for NodePool {}

impl Hash for NodePool {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.network().hash(state);
        self.node_ids().hash(state);
    }
}

impl fmt::Debug for NodePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("network", &self.network())
            .field("selector", &self.selector)
            .field("len", &self.len())
            .finish()
    }
}

impl<'a> IntoIterator for &'a NodePool {
    type Item = Node<'a>;
    type IntoIter = Box<dyn Iterator<Item = Node<'a>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

//! Benchmark parameter types.

use std::fmt;

/// Parameters for a network build or save benchmark run.
#[derive(Clone, Debug)]
pub struct NetworkBenchParams {
    /// Number of nodes in the network.
    pub node_count: usize,
    /// Probability that an ordered pair is connected.
    pub connection_probability: f64,
}

impl fmt::Display for NetworkBenchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n={},p={}", self.node_count, self.connection_probability)
    }
}

/// Parameters for an edge sort benchmark run.
#[derive(Clone, Debug)]
pub struct SortBenchParams {
    /// Number of edges sorted.
    pub edge_count: usize,
    /// Whether the sort spills to disk.
    pub external: bool,
}

impl fmt::Display for SortBenchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.external { "external" } else { "memory" };
        write!(f, "e={},{mode}", self.edge_count)
    }
}

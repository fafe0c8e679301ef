//! Netloom core library.
//!
//! Declares populations of nodes and rule-driven connections between them,
//! materializes them into typed, grouped node and edge tables, and indexes
//! the edges for fast lookup by source or target node.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod attribute;
mod connector;
mod edges;
mod error;
mod index;
pub mod logging;
mod network;
mod nodes;
mod pool;
mod rule;
mod schema;
mod sort;
mod value;

#[cfg(test)]
mod test_utils;

pub use crate::{
    attribute::{AttributeValue, EDGE_TYPE_ID, NODE_ID, NODE_TYPE_ID, NSYNS},
    edges::{Edge, EdgeGroup, EdgeQuery, EdgeTable},
    error::{
        ErrorKind, NetworkError, NetworkErrorCode, Result, SortError, SortErrorCode, TypeScope,
    },
    index::EdgeIndex,
    network::{BuildState, IS_GAP_JUNCTION, Network},
    nodes::{Node, NodeDeclaration, NodeSet},
    pool::{NodeFilter, NodePool, Selector},
    rule::{
        ConnectionMap, ConnectionRule, EdgeDeclaration, EdgeProperties, Endpoint,
        IterationStrategy, PairwiseFn, PooledFn, PropertyFn, RuleOutput,
    },
    schema::{FIRST_AUTO_TYPE_ID, GroupLayout, GroupSignature, GroupSlot, SchemaRegistry, TypeTable},
    sort::{
        ExternalSorter, MergedRuns, SortOptions, SortOrder, SortRecord, sort_in_memory,
        sort_permutation, visit_sorted_rows,
    },
    value::{Column, ColumnTypeMismatch, DType, Value},
};

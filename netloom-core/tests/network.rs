//! End-to-end tests for declaring and building networks.

mod common;

use std::collections::BTreeMap;

use common::layered_network;
use netloom_core::{
    ConnectionRule, DType, EdgeDeclaration, EdgeProperties, EdgeQuery, ErrorKind,
    IterationStrategy, Network, NetworkError, Node, NodeDeclaration, Selector, Value,
};
use rstest::rstest;

#[test]
fn constant_rule_connects_every_pair_once_per_row() {
    let mut net = layered_network("NET1", 10, 0);
    net.add_edges(EdgeDeclaration::new().with_rule(3))
        .expect("edges declared");

    let edges = net.edges(&EdgeQuery::new()).expect("network builds");
    assert_eq!(edges.len(), 100);
    assert!(edges.iter().all(|edge| edge.nsyns() == 3));
    assert_eq!(net.connection_count().expect("built"), 300);
}

#[test]
fn edge_ids_follow_materialization_order() {
    let mut net = layered_network("NET1", 3, 0);
    net.add_edges(EdgeDeclaration::new()).expect("edges declared");
    let tables = net.edge_tables().expect("network builds");
    assert_eq!(tables.len(), 1);
    let table = &tables[0];
    assert_eq!(table.population(), "NET1_to_NET1");
    assert_eq!(table.edge_ids(), [0, 1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(table.source_node_ids(), [0, 0, 0, 1, 1, 1, 2, 2, 2]);
    assert_eq!(table.target_node_ids(), [0, 1, 2, 0, 1, 2, 0, 1, 2]);
}

#[test]
fn selectors_restrict_endpoints() {
    let mut net = layered_network("V1", 10, 5);
    net.add_edges(
        EdgeDeclaration::new()
            .with_source(Selector::attribute("ei", "e"))
            .with_target(Selector::attribute("ei", "i"))
            .with_rule(2),
    )
    .expect("edges declared");

    let edges = net.edges(&EdgeQuery::new()).expect("network builds");
    assert_eq!(edges.len(), 50);
    for edge in &edges {
        assert!(edge.source_node_id() < 10);
        assert!(edge.target_node_id() >= 10);
        let source = edge.source_node().expect("source node resolves");
        assert_eq!(source.get_str("ei"), Some("e"));
    }
}

#[test]
fn selecting_an_unknown_attribute_yields_no_edges() {
    let mut net = layered_network("V1", 4, 4);
    net.add_edges(EdgeDeclaration::new().with_source(Selector::attribute("model", "lif")))
        .expect("edges declared");
    assert_eq!(net.nedges().expect("network builds"), 0);
    let pool = net
        .nodes_where(Selector::attribute("model", "lif"))
        .expect("nodes build");
    assert!(pool.is_empty());
}

#[test]
fn one_to_one_requires_equal_endpoints() {
    let mut net = layered_network("V1", 10, 5);
    net.add_edges(
        EdgeDeclaration::new()
            .with_source(Selector::attribute("ei", "e"))
            .with_target(Selector::attribute("ei", "i"))
            .with_iteration(IterationStrategy::OneToOne),
    )
    .expect("edges declared");

    let err = net.build(false).expect_err("cardinality mismatch");
    assert!(matches!(
        err,
        NetworkError::CardinalityMismatch {
            sources: 10,
            targets: 5,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn one_to_one_pairs_positionally() {
    let mut net = layered_network("V1", 5, 5);
    net.add_edges(
        EdgeDeclaration::new()
            .with_source(Selector::attribute("ei", "e"))
            .with_target(Selector::attribute("ei", "i"))
            .with_iteration(IterationStrategy::OneToOne),
    )
    .expect("edges declared");

    let pairs: Vec<(u64, u64)> = net
        .edges(&EdgeQuery::new())
        .expect("network builds")
        .iter()
        .map(|edge| (edge.source_node_id(), edge.target_node_id()))
        .collect();
    assert_eq!(pairs, [(0, 5), (1, 6), (2, 7), (3, 8), (4, 9)]);
}

#[test]
fn attribute_lengths_must_match_the_node_count() {
    let mut net = Network::new("V1").expect("valid name");
    let positions: Vec<f64> = (0..101).map(f64::from).collect();
    let err = net
        .add_nodes(NodeDeclaration::new(100).with_attribute("x", positions))
        .expect_err("length mismatch");
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
fn pairwise_rules_see_node_attributes() {
    let mut net = layered_network("V1", 6, 0);
    net.add_edges(EdgeDeclaration::new().with_rule(ConnectionRule::pairwise(
        |source, target| {
            let source_x = source.get_f64("x").unwrap_or_default();
            let target_x = target.get_f64("x").unwrap_or_default();
            let distance = (source_x - target_x).abs();
            i64::from(distance > 0.0 && distance <= 1.0)
        },
    )))
    .expect("edges declared");

    assert_eq!(net.nedges().expect("network builds"), 10);
}

#[test]
fn values_rules_are_consumed_in_visit_order() {
    let mut net = layered_network("V1", 2, 0);
    net.add_edges(EdgeDeclaration::new().with_rule(vec![1_i64, 0, 4, 2]))
        .expect("edges declared");
    let rows: Vec<(u64, u64, u64)> = net
        .edges(&EdgeQuery::new())
        .expect("network builds")
        .iter()
        .map(|edge| (edge.source_node_id(), edge.target_node_id(), edge.nsyns()))
        .collect();
    assert_eq!(rows, [(0, 0, 1), (1, 0, 4), (1, 1, 2)]);
}

#[test]
fn values_rules_must_cover_every_pair() {
    let mut net = layered_network("V1", 3, 0);
    net.add_edges(EdgeDeclaration::new().with_rule(vec![1_i64, 1]))
        .expect("edges declared");
    let err = net.build(false).expect_err("too few values");
    assert!(matches!(
        err,
        NetworkError::RuleOutputLength {
            expected: 9,
            actual: 2,
            ..
        }
    ));
}

#[test]
fn pooled_rules_require_pooled_iteration() {
    let mut net = layered_network("V1", 3, 0);
    let err = net
        .add_edges(EdgeDeclaration::new().with_rule(ConnectionRule::pooled(
            |_, pool: &[Node<'_>]| vec![1_i64; pool.len()],
        )))
        .expect_err("pooled rule needs one_to_all or all_to_one");
    assert!(matches!(err, NetworkError::IncompatibleRule { rule: "pooled", .. }));
}

#[test]
fn one_to_all_rules_receive_the_whole_target_pool() {
    let mut net = layered_network("V1", 2, 3);
    net.add_edges(
        EdgeDeclaration::new()
            .with_source(Selector::attribute("ei", "e"))
            .with_target(Selector::attribute("ei", "i"))
            .with_iteration(IterationStrategy::OneToAll)
            .with_rule(ConnectionRule::pooled(|_, pool: &[Node<'_>]| {
                (0..pool.len()).map(|index| i64::from(index == 0)).collect::<Vec<_>>()
            })),
    )
    .expect("edges declared");

    let pairs: Vec<(u64, u64)> = net
        .edges(&EdgeQuery::new())
        .expect("network builds")
        .iter()
        .map(|edge| (edge.source_node_id(), edge.target_node_id()))
        .collect();
    assert_eq!(pairs, [(0, 2), (1, 2)]);
}

#[test]
fn pools_from_another_network_create_a_cross_population() {
    let mut lgn = layered_network("NET1", 4, 0);
    let sources = lgn.nodes().expect("nodes build");
    let mut v1 = layered_network("NET2", 3, 0);
    v1.add_edges(EdgeDeclaration::new().with_source(&sources).with_rule(2))
        .expect("edges declared");

    let tables = v1.edge_tables().expect("network builds");
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].population(), "NET1_to_NET2");
    assert_eq!(tables[0].len(), 12);

    let from_first = v1
        .edges(
            &EdgeQuery::new()
                .with_source_network("NET1")
                .with_source_nodes(Selector::ids([0])),
        )
        .expect("built");
    assert_eq!(from_first.len(), 3);
    assert!(from_first.iter().all(|edge| edge.source_network() == "NET1"));
    assert!(
        v1.edges(&EdgeQuery::new().with_source_network("NET2"))
            .expect("built")
            .is_empty()
    );
}

#[test]
fn gap_junctions_may_not_leave_the_network() {
    let mut lgn = layered_network("NET1", 2, 0);
    let foreign = lgn.nodes().expect("nodes build");
    let mut v1 = layered_network("NET2", 2, 0);
    let err = v1
        .add_gap_junctions(EdgeDeclaration::new().with_source(&foreign))
        .expect_err("cross-network gap junction");
    assert!(matches!(err, NetworkError::CrossNetworkGapJunction { .. }));
}

#[test]
fn edge_queries_filter_by_target_and_attribute() {
    let mut net = layered_network("V1", 4, 2);
    net.add_edges(
        EdgeDeclaration::new()
            .with_target(Selector::attribute("ei", "i"))
            .with_rule(1)
            .with_attribute("syn_type", "exc"),
    )
    .expect("edges declared");
    net.add_edges(
        EdgeDeclaration::new()
            .with_target(Selector::attribute("ei", "e"))
            .with_rule(5)
            .with_attribute("syn_type", "inh"),
    )
    .expect("edges declared");

    let into_first = net
        .edges(&EdgeQuery::new().with_target_nodes(Selector::ids([4])))
        .expect("network builds");
    assert_eq!(into_first.len(), 6);
    assert!(into_first.iter().all(|edge| edge.target_node_id() == 4));

    let inhibitory = net
        .edges(&EdgeQuery::new().with_attribute("syn_type", "inh"))
        .expect("built");
    assert_eq!(inhibitory.len(), 24);
    assert!(inhibitory.iter().all(|edge| edge.nsyns() == 5));
}

#[test]
fn distinct_property_schemas_form_separate_groups() {
    let mut net = layered_network("V1", 2, 0);
    net.add_edges(EdgeDeclaration::new())
        .expect("edges declared")
        .add_property("syn_weight", DType::Float, |_, _| Value::Float(0.5))
        .expect("property added");
    net.add_edges(EdgeDeclaration::new().with_rule(2))
        .expect("edges declared");

    let tables = net.edge_tables().expect("network builds");
    let table = &tables[0];
    assert_eq!(table.groups().len(), 2);
    assert_eq!(table.len(), 8);
    let weights = table.groups()[0]
        .column("syn_weight")
        .expect("weight column");
    assert_eq!(weights.len(), 4);
    assert_eq!(table.group_indices(), [0, 1, 2, 3, 0, 1, 2, 3]);
}

#[test]
fn rule_property_maps_become_edge_rows() {
    let mut net = layered_network("V1", 2, 0);
    net.add_edges(EdgeDeclaration::new().with_rule(ConnectionRule::pairwise(
        |source, target| {
            if source.node_id() == target.node_id() {
                return Vec::new();
            }
            let mut synapse: EdgeProperties = BTreeMap::new();
            synapse.insert("delay".to_owned(), Value::Float(1.5));
            vec![synapse.clone(), synapse]
        },
    )))
    .expect("edges declared");

    let edges = net.edges(&EdgeQuery::new()).expect("network builds");
    assert_eq!(edges.len(), 4);
    assert!(edges.iter().all(|edge| edge.get("delay") == Some(Value::Float(1.5))));
    assert!(edges.iter().all(|edge| edge.nsyns() == 1));
}

#[rstest]
#[case(Some(100), Some(100), true)]
#[case(Some(100), None, false)]
#[case(None, None, false)]
fn reusing_a_node_type_id_requires_identical_attributes(
    #[case] first: Option<u64>,
    #[case] second: Option<u64>,
    #[case] conflicts: bool,
) {
    let mut net = Network::new("V1").expect("valid name");
    let declare = |type_id: Option<u64>, model: &str| {
        let declaration = NodeDeclaration::new(2).with_attribute("model", model);
        match type_id {
            Some(id) => declaration.with_node_type_id(id),
            None => declaration,
        }
    };
    net.add_nodes(declare(first, "lif")).expect("first batch");
    let result = net.add_nodes(declare(second, "izh"));
    assert_eq!(result.is_err(), conflicts);
    if let Err(err) = result {
        assert_eq!(err.kind(), ErrorKind::SchemaConflict);
    }
}

#[test]
fn nodes_keep_declaration_order_and_auto_type_ids() {
    let mut net = layered_network("V1", 2, 2);
    let nodes = net.node_set().expect("nodes build");
    let ids: Vec<u64> = nodes.iter().map(|node| node.node_id()).collect();
    assert_eq!(ids, [0, 1, 2, 3]);
    let types: Vec<u64> = nodes.iter().map(|node| node.node_type_id()).collect();
    assert_eq!(types, [100, 100, 101, 101]);
    assert_eq!(
        nodes.get(2).and_then(|node| node.get("ei")),
        Some(Value::from("i"))
    );
}

#[test]
fn rebuilding_follows_new_declarations() {
    let mut net = layered_network("V1", 2, 0);
    net.add_edges(EdgeDeclaration::new()).expect("edges declared");
    assert_eq!(net.nedges().expect("network builds"), 4);
    net.add_nodes(NodeDeclaration::new(1)).expect("nodes declared");
    assert_eq!(net.nedges().expect("network rebuilds"), 9);
    net.build(true).expect("forced rebuild");
    assert_eq!(net.nedges().expect("built"), 9);
}

#[rstest]
#[case::single("edge_type_id")]
#[case::single_group_column("edge_group_index")]
fn single_properties_may_not_shadow_reserved_columns(#[case] name: &str) {
    let mut net = layered_network("V1", 2, 0);
    let map = net
        .add_edges(EdgeDeclaration::new())
        .expect("edges declared");
    let err = map
        .add_property(name, DType::Int, |_, _| Value::Int(7))
        .expect_err("reserved name is rejected");
    assert!(matches!(err, NetworkError::ReservedProperty { ref property } if property == name));
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let edges = net.edges(&EdgeQuery::new()).expect("network builds");
    assert!(edges.iter().all(|edge| edge.get("edge_type_id") == Some(Value::Int(100))));
}

#[test]
fn grouped_properties_may_not_shadow_reserved_columns() {
    let mut net = layered_network("V1", 2, 0);
    let map = net
        .add_edges(EdgeDeclaration::new())
        .expect("edges declared");
    let err = map
        .add_properties(
            ["syn_weight", "source_node_id"],
            [DType::Float, DType::Int],
            |_, _| vec![Value::Float(0.5), Value::Int(3)],
        )
        .expect_err("reserved name is rejected");
    assert!(matches!(err, NetworkError::ReservedProperty { ref property } if property == "source_node_id"));
    assert!(!map.has_properties());
}

#[test]
fn rule_rows_may_not_shadow_reserved_columns() {
    let mut net = layered_network("V1", 2, 0);
    net.add_edges(EdgeDeclaration::new().with_rule(ConnectionRule::pairwise(|_, _| {
        vec![EdgeProperties::from([("edge_id".to_owned(), Value::Int(9))])]
    })))
    .expect("edges declared");
    let err = net.build(false).expect_err("reserved row column fails");
    assert!(matches!(err, NetworkError::ReservedProperty { ref property } if property == "edge_id"));
}

#[test]
fn foreign_pools_sharing_the_network_name_are_rejected() {
    let mut first = layered_network("V1", 2, 0);
    let foreign = first.nodes().expect("nodes build");
    let mut second = layered_network("V1", 5, 0);

    let err = second
        .add_edges(EdgeDeclaration::new().with_source(&foreign).with_rule(1))
        .expect_err("same name, different network");
    assert!(matches!(err, NetworkError::DuplicateNetworkName { ref name } if name == "V1"));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let err = second
        .add_gap_junctions(EdgeDeclaration::new().with_target(&foreign))
        .expect_err("same name, different network");
    assert!(matches!(err, NetworkError::DuplicateNetworkName { .. }));
    assert!(second.connection_maps().is_empty());
}

#[test]
fn own_pools_follow_rebuilds() {
    let mut net = layered_network("V1", 2, 0);
    let excitatory = net
        .nodes_where(Selector::attribute("ei", "e"))
        .expect("nodes build");
    net.add_nodes(NodeDeclaration::new(3).with_attribute("ei", "e"))
        .expect("nodes declared");
    net.add_edges(EdgeDeclaration::new().with_source(&excitatory).with_rule(1))
        .expect("edges declared");
    assert_eq!(net.nedges().expect("network builds"), 25);
}

#[test]
fn distinct_foreign_networks_sharing_a_name_are_rejected_at_build() {
    let mut lgn_a = layered_network("LGN", 2, 0);
    let mut lgn_b = layered_network("LGN", 3, 0);
    let from_a = lgn_a.nodes().expect("nodes build");
    let from_b = lgn_b.nodes().expect("nodes build");
    let mut v1 = layered_network("V1", 2, 0);
    v1.add_edges(EdgeDeclaration::new().with_source(&from_a))
        .expect("edges declared");
    v1.add_edges(EdgeDeclaration::new().with_source(&from_b))
        .expect("edges declared");

    let err = v1.build(false).expect_err("ambiguous population");
    assert!(matches!(err, NetworkError::DuplicateNetworkName { ref name } if name == "LGN"));
    assert!(!v1.is_built());
}

#[test]
fn failed_forced_rebuild_keeps_the_previous_build() {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    let broken = Arc::new(AtomicBool::new(false));
    let mut net = layered_network("V1", 3, 0);
    let flag = Arc::clone(&broken);
    net.add_edges(EdgeDeclaration::new())
        .expect("edges declared")
        .add_property("delay", DType::Float, move |_, _| {
            if flag.load(Ordering::Relaxed) {
                Value::from("slow")
            } else {
                Value::Float(1.0)
            }
        })
        .expect("property added");
    net.build(false).expect("first build");
    let nodes = Arc::clone(net.built_nodes().expect("nodes built"));

    broken.store(true, Ordering::Relaxed);
    let err = net.build(true).expect_err("forced rebuild fails");
    assert!(matches!(err, NetworkError::PropertyTypeMismatch { .. }));
    assert!(net.is_built());
    assert!(Arc::ptr_eq(net.built_nodes().expect("nodes kept"), &nodes));
    assert_eq!(net.built_edges().expect("edges kept")[0].len(), 9);
}

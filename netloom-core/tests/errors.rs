use netloom_core::{
    DType, ErrorKind, IterationStrategy, NetworkError, NetworkErrorCode, SortError, SortErrorCode,
    TypeScope,
};
use rstest::rstest;

#[rstest]
#[case(NetworkError::EmptyNetworkName, NetworkErrorCode::EmptyNetworkName, "NETWORK_EMPTY_NAME")]
#[case(
    NetworkError::AttributeLengthMismatch { attribute: "x".to_owned(), expected: 100, actual: 101 },
    NetworkErrorCode::AttributeLengthMismatch,
    "NETWORK_ATTRIBUTE_LENGTH_MISMATCH",
)]
#[case(
    NetworkError::DuplicateNodeId { node_id: 7 },
    NetworkErrorCode::DuplicateNodeId,
    "NETWORK_DUPLICATE_NODE_ID",
)]
#[case(
    NetworkError::CardinalityMismatch { declaration: 0, sources: 10, targets: 5 },
    NetworkErrorCode::CardinalityMismatch,
    "NETWORK_CARDINALITY_MISMATCH",
)]
#[case(
    NetworkError::IncompatibleRule { rule: "pooled", iteration: IterationStrategy::AllToAll },
    NetworkErrorCode::IncompatibleRule,
    "NETWORK_INCOMPATIBLE_RULE",
)]
#[case(
    NetworkError::NotBuilt { network: "V1".to_owned() },
    NetworkErrorCode::NotBuilt,
    "NETWORK_NOT_BUILT",
)]
fn returns_expected_network_code(
    #[case] error: NetworkError,
    #[case] expected: NetworkErrorCode,
    #[case] code: &str,
) {
    assert_eq!(error.code(), expected);
    assert_eq!(error.code().as_str(), code);
    assert_eq!(error.code().to_string(), code);
}

#[rstest]
#[case(NetworkError::EmptyNetworkName, ErrorKind::Configuration)]
#[case(
    NetworkError::TypeIdConflict { scope: TypeScope::Node, type_id: 100 },
    ErrorKind::SchemaConflict,
)]
#[case(
    NetworkError::PropertyTypeMismatch {
        declaration: 0,
        property: "delay".to_owned(),
        expected: DType::Float,
        actual: DType::Str,
    },
    ErrorKind::SchemaConflict,
)]
#[case(NetworkError::Sort(SortError::ZeroRunCapacity), ErrorKind::Io)]
fn classifies_network_errors(#[case] error: NetworkError, #[case] expected: ErrorKind) {
    assert_eq!(error.kind(), expected);
}

#[test]
fn sort_failures_expose_their_inner_code() {
    let error = NetworkError::from(SortError::ZeroRunCapacity);
    assert_eq!(error.code(), NetworkErrorCode::Sort);
    assert_eq!(error.sort_code(), Some(SortErrorCode::ZeroRunCapacity));
    assert_eq!(NetworkError::EmptyNetworkName.sort_code(), None);
}

#[test]
fn messages_name_the_offending_type_id() {
    let error = NetworkError::TypeIdConflict {
        scope: TypeScope::Edge,
        type_id: 100,
    };
    assert_eq!(
        error.to_string(),
        "edge type id 100 is already declared with different type attributes"
    );
}

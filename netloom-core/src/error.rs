//! Error types for the netloom core library.
//!
//! Defines the error enums exposed by the public API, the coarse
//! [`ErrorKind`] taxonomy shared with storage providers, and a convenient
//! result alias.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::{rule::IterationStrategy, value::DType};

/// Generates a stable error-code enum for an error type.
///
/// The generated enum exposes `as_str()` and implements [`fmt::Display`]; the
/// error type gains a `code()` accessor mapping each variant to its code.
#[doc(hidden)]
#[macro_export]
macro_rules! define_error_codes {
    (
        $(#[$enum_meta:meta])*
        enum $CodeTy:ident for $ErrTy:ident {
            $(
                $(#[$variant_meta:meta])*
                $CodeVariant:ident => $ErrVariant:ident $( { $($pattern:tt)* } )? $( ( $($tuple:tt)* ) )? => $code:expr
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[non_exhaustive]
        pub enum $CodeTy {
            $(
                $(#[$variant_meta])*
                $CodeVariant,
            )+
        }

        impl $CodeTy {
            /// Return the stable machine-readable representation of this error code.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$CodeVariant => $code,)+
                }
            }
        }

        impl ::std::fmt::Display for $CodeTy {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $ErrTy {
            #[doc = concat!(
                "Retrieve the stable [`",
                stringify!($CodeTy),
                "`] for this error."
            )]
            #[must_use]
            pub const fn code(&self) -> $CodeTy {
                match self {
                    $(Self::$ErrVariant $( { $($pattern)* } )? $( ( $($tuple)* ) )? => $CodeTy::$CodeVariant,)+
                }
            }
        }
    };
}

/// Coarse classification of failures, shared by the core and storage crates.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Inconsistent or invalid declarations and options.
    Configuration,
    /// Conflicting type or attribute schemas.
    SchemaConflict,
    /// Output already exists and overwriting was not requested.
    IoConflict,
    /// Input files are malformed or lack the expected layout.
    Format,
    /// Underlying filesystem or encoding failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configuration => "configuration",
            Self::SchemaConflict => "schema conflict",
            Self::IoConflict => "i/o conflict",
            Self::Format => "format",
            Self::Io => "i/o",
        };
        f.write_str(label)
    }
}

/// Whether a type id belongs to the node or edge namespace.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TypeScope {
    /// `node_type_id`.
    Node,
    /// `edge_type_id`.
    Edge,
}

impl fmt::Display for TypeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => f.write_str("node"),
            Self::Edge => f.write_str("edge"),
        }
    }
}

/// Errors raised by the external edge sort.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SortError {
    /// Creating, writing or reading a spill run failed.
    #[error("spill run i/o failed in {}: {source}", path.display())]
    Io {
        /// Run file or scratch directory involved in the failure.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A record could not be encoded or decoded.
    #[error("spill run encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
    /// Run capacity must hold at least one record.
    #[error("run capacity must be at least 1")]
    ZeroRunCapacity,
}

define_error_codes! {
    /// Stable codes describing [`SortError`] variants.
    enum SortErrorCode for SortError {
        /// Creating, writing or reading a spill run failed.
        Io => Io { .. } => "SORT_IO",
        /// A record could not be encoded or decoded.
        Encoding => Encoding(..) => "SORT_ENCODING",
        /// Run capacity must hold at least one record.
        ZeroRunCapacity => ZeroRunCapacity => "SORT_ZERO_RUN_CAPACITY",
    }
}

/// Error type produced while declaring, building or querying a
/// [`crate::Network`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NetworkError {
    /// Network names must be non-empty.
    #[error("network name must not be empty")]
    EmptyNetworkName,
    /// Two distinct networks met under one name.
    #[error("network name `{name}` is used by more than one network")]
    DuplicateNetworkName {
        /// The shared name.
        name: String,
    },
    /// A per-instance attribute did not supply one value per node.
    #[error("attribute `{attribute}` has {actual} values but the declaration has {expected} nodes")]
    AttributeLengthMismatch {
        /// Offending attribute.
        attribute: String,
        /// Number of nodes in the declaration.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
    /// A reserved attribute was supplied with the wrong shape or type.
    #[error("reserved attribute `{attribute}` {reason}")]
    InvalidReservedAttribute {
        /// Reserved attribute name.
        attribute: &'static str,
        /// Human-readable constraint that was violated.
        reason: &'static str,
    },
    /// A node id was supplied more than once.
    #[error("node id {node_id} is declared more than once")]
    DuplicateNodeId {
        /// The repeated id.
        node_id: u64,
    },
    /// Edge declarations only accept uniform type attributes.
    #[error("edge attribute `{attribute}` must be a single uniform value")]
    PerInstanceEdgeAttribute {
        /// Offending attribute.
        attribute: String,
    },
    /// A type id was reused with different type attributes.
    #[error("{scope} type id {type_id} is already declared with different type attributes")]
    TypeIdConflict {
        /// Node or edge namespace.
        scope: TypeScope,
        /// The reused id.
        type_id: u64,
    },
    /// One-to-one iteration needs equally sized endpoints.
    #[error(
        "edge declaration {declaration}: one_to_one iteration needs equal endpoints, got {sources} sources and {targets} targets"
    )]
    CardinalityMismatch {
        /// Index of the offending edge declaration.
        declaration: usize,
        /// Number of selected sources.
        sources: usize,
        /// Number of selected targets.
        targets: usize,
    },
    /// The rule cannot be driven by the requested iteration strategy.
    #[error("a {rule} rule cannot be used with {iteration} iteration")]
    IncompatibleRule {
        /// Rule variant name.
        rule: &'static str,
        /// Requested iteration strategy.
        iteration: IterationStrategy,
    },
    /// A rule produced a different number of results than visited pairs.
    #[error("edge declaration {declaration}: rule returned {actual} results for {expected} pairs")]
    RuleOutputLength {
        /// Index of the offending edge declaration.
        declaration: usize,
        /// Number of results required.
        expected: usize,
        /// Number of results produced.
        actual: usize,
    },
    /// Gap junctions must connect nodes of the declaring network.
    #[error(
        "gap junctions of network `{network}` must stay within it, got `{source_network}` -> `{target_network}`"
    )]
    CrossNetworkGapJunction {
        /// Declaring network.
        network: String,
        /// Network of the source pool.
        source_network: String,
        /// Network of the target pool.
        target_network: String,
    },
    /// Property names and dtypes must pair up.
    #[error("{names} property names were given with {dtypes} dtypes")]
    PropertyArity {
        /// Number of property names.
        names: usize,
        /// Number of dtypes.
        dtypes: usize,
    },
    /// Property names may not shadow reserved edge columns.
    #[error("edge property `{property}` clashes with a reserved column")]
    ReservedProperty {
        /// Offending property name.
        property: String,
    },
    /// A post-hoc property rule produced a value of the wrong type.
    #[error(
        "edge declaration {declaration}: property `{property}` expected {expected} but the rule returned {actual}"
    )]
    PropertyTypeMismatch {
        /// Index of the offending edge declaration.
        declaration: usize,
        /// Property name.
        property: String,
        /// Declared dtype.
        expected: DType,
        /// Dtype of the returned value.
        actual: DType,
    },
    /// A property rule returned the wrong number of values.
    #[error(
        "edge declaration {declaration}: property rule returned {actual} values for {expected} properties"
    )]
    PropertyCount {
        /// Index of the offending edge declaration.
        declaration: usize,
        /// Number of declared properties.
        expected: usize,
        /// Number of returned values.
        actual: usize,
    },
    /// Data was requested from a network that has not been built.
    #[error("network `{network}` has not been built")]
    NotBuilt {
        /// Name of the unbuilt network.
        network: String,
    },
    /// Sorting edges failed.
    #[error("sorting edges failed: {0}")]
    Sort(#[from] SortError),
}

define_error_codes! {
    /// Stable codes describing [`NetworkError`] variants.
    enum NetworkErrorCode for NetworkError {
        /// Network names must be non-empty.
        EmptyNetworkName => EmptyNetworkName => "NETWORK_EMPTY_NAME",
        /// Two distinct networks met under one name.
        DuplicateNetworkName => DuplicateNetworkName { .. } => "NETWORK_DUPLICATE_NAME",
        /// A per-instance attribute did not supply one value per node.
        AttributeLengthMismatch => AttributeLengthMismatch { .. } => "NETWORK_ATTRIBUTE_LENGTH_MISMATCH",
        /// A reserved attribute was supplied with the wrong shape or type.
        InvalidReservedAttribute => InvalidReservedAttribute { .. } => "NETWORK_INVALID_RESERVED_ATTRIBUTE",
        /// A node id was supplied more than once.
        DuplicateNodeId => DuplicateNodeId { .. } => "NETWORK_DUPLICATE_NODE_ID",
        /// Edge declarations only accept uniform type attributes.
        PerInstanceEdgeAttribute => PerInstanceEdgeAttribute { .. } => "NETWORK_PER_INSTANCE_EDGE_ATTRIBUTE",
        /// A type id was reused with different type attributes.
        TypeIdConflict => TypeIdConflict { .. } => "NETWORK_TYPE_ID_CONFLICT",
        /// One-to-one iteration needs equally sized endpoints.
        CardinalityMismatch => CardinalityMismatch { .. } => "NETWORK_CARDINALITY_MISMATCH",
        /// The rule cannot be driven by the requested iteration strategy.
        IncompatibleRule => IncompatibleRule { .. } => "NETWORK_INCOMPATIBLE_RULE",
        /// A rule produced a different number of results than visited pairs.
        RuleOutputLength => RuleOutputLength { .. } => "NETWORK_RULE_OUTPUT_LENGTH",
        /// Gap junctions must connect nodes of the declaring network.
        CrossNetworkGapJunction => CrossNetworkGapJunction { .. } => "NETWORK_CROSS_NETWORK_GAP_JUNCTION",
        /// Property names and dtypes must pair up.
        PropertyArity => PropertyArity { .. } => "NETWORK_PROPERTY_ARITY",
        /// Property names may not shadow reserved edge columns.
        ReservedProperty => ReservedProperty { .. } => "NETWORK_RESERVED_PROPERTY",
        /// A post-hoc property rule produced a value of the wrong type.
        PropertyTypeMismatch => PropertyTypeMismatch { .. } => "NETWORK_PROPERTY_TYPE_MISMATCH",
        /// A property rule returned the wrong number of values.
        PropertyCount => PropertyCount { .. } => "NETWORK_PROPERTY_COUNT",
        /// Data was requested from a network that has not been built.
        NotBuilt => NotBuilt { .. } => "NETWORK_NOT_BUILT",
        /// Sorting edges failed.
        Sort => Sort(..) => "NETWORK_SORT",
    }
}

impl NetworkError {
    /// Classifies the error into the shared [`ErrorKind`] taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TypeIdConflict { .. } | Self::PropertyTypeMismatch { .. } => {
                ErrorKind::SchemaConflict
            }
            Self::Sort(_) => ErrorKind::Io,
            _ => ErrorKind::Configuration,
        }
    }

    /// Retrieve the inner [`SortErrorCode`] when the error came from the edge sort.
    #[must_use]
    pub const fn sort_code(&self) -> Option<SortErrorCode> {
        match self {
            Self::Sort(error) => Some(error.code()),
            _ => None,
        }
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = core::result::Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(NetworkError::EmptyNetworkName, ErrorKind::Configuration, "NETWORK_EMPTY_NAME")]
    #[case(
        NetworkError::DuplicateNetworkName { name: "V1".to_owned() },
        ErrorKind::Configuration,
        "NETWORK_DUPLICATE_NAME"
    )]
    #[case(
        NetworkError::TypeIdConflict { scope: TypeScope::Node, type_id: 100 },
        ErrorKind::SchemaConflict,
        "NETWORK_TYPE_ID_CONFLICT"
    )]
    #[case(
        NetworkError::Sort(SortError::ZeroRunCapacity),
        ErrorKind::Io,
        "NETWORK_SORT"
    )]
    fn errors_expose_kind_and_code(
        #[case] error: NetworkError,
        #[case] kind: ErrorKind,
        #[case] code: &str,
    ) {
        assert_eq!(error.kind(), kind);
        assert_eq!(error.code().as_str(), code);
    }

    #[test]
    fn sort_code_surfaces_inner_code() {
        let err = NetworkError::from(SortError::ZeroRunCapacity);
        assert_eq!(err.sort_code(), Some(SortErrorCode::ZeroRunCapacity));
        assert_eq!(NetworkError::EmptyNetworkName.sort_code(), None);
    }

    #[test]
    fn type_id_conflict_names_scope() {
        let err = NetworkError::TypeIdConflict {
            scope: TypeScope::Edge,
            type_id: 101,
        };
        assert_eq!(
            err.to_string(),
            "edge type id 101 is already declared with different type attributes"
        );
    }
}

//! Benchmark setup error type.
//!
//! Aggregates the failures that may arise while preparing benchmark
//! networks so setup functions can propagate them with `?`.

use netloom_core::{NetworkError, SortError};
use netloom_providers_columnar::StorageError;

/// Errors that may occur during benchmark setup.
#[derive(Debug, thiserror::Error)]
pub enum BenchSetupError {
    /// Declaring or building a network failed.
    #[error("network operation failed: {0}")]
    Network(#[from] NetworkError),
    /// Sorting an edge population failed.
    #[error("edge sort failed: {0}")]
    Sort(#[from] SortError),
    /// Writing network files failed.
    #[error("storage operation failed: {0}")]
    Storage(#[from] StorageError),
    /// A zero value was passed where a non-zero integer was required.
    #[error("expected a non-zero value for {context}")]
    ZeroValue {
        /// A description of the parameter that was unexpectedly zero.
        context: &'static str,
    },
    /// A connection probability fell outside `[0, 1]`.
    #[error("connection probability {0} is outside [0, 1]")]
    Probability(f64),
    /// Creating scratch space failed.
    #[error("scratch directory unavailable: {0}")]
    Scratch(#[from] std::io::Error),
}

//! Benchmark support crate for netloom.
//!
//! Provides seeded synthetic networks and parameter types used by the
//! Criterion benchmarks for building, sorting and saving networks.

pub mod error;
pub mod params;
pub mod synthetic;

//! Columnar storage for built networks.
//!
//! Node and edge populations are written as dataset containers (one Parquet
//! file holding path-addressed datasets) next to space-delimited type tables.
//!
//! ```no_run
//! use netloom_core::{Network, NodeDeclaration};
//! use netloom_providers_columnar::{SaveOptions, save};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut network = Network::new("V1")?;
//! network.add_nodes(NodeDeclaration::new(10).with_attribute("ei", "e"))?;
//! let report = save(&mut network, &SaveOptions::new("network"))?;
//! assert_eq!(report.nodes.rows, 10);
//! # Ok(())
//! # }
//! ```

mod atomic;
mod container;
mod errors;
mod import;
mod save;
mod type_table;

pub use container::{Container, Dataset, DatasetValues};
pub use errors::{StorageError, StorageErrorCode};
pub use import::import_nodes;
pub use save::{
    Compression, DEFAULT_NULL_TOKEN, EdgeFiles, NodeFiles, SaveOptions, SaveReport,
    SavedPopulation, WriteMode, edge_container, node_container, save, save_edges, save_nodes,
};
pub use type_table::{load_type_table, read_type_table, save_type_table, write_type_table};

use std::{collections::BTreeSet, path::Path};

use netloom_core::{Network, NodeDeclaration};
use netloom_providers_columnar::Container;

/// Declares `excitatory` nodes with `ei = "e"` then `inhibitory` nodes with
/// `ei = "i"`, each carrying its declaration row as `x`.
#[must_use]
pub fn layered_network(name: &str, excitatory: usize, inhibitory: usize) -> Network {
    let mut net = Network::new(name).expect("valid network name");
    for (count, label, offset) in [(excitatory, "e", 0), (inhibitory, "i", excitatory)] {
        if count == 0 {
            continue;
        }
        let positions: Vec<f64> = (offset..offset + count).map(|row| row as f64).collect();
        net.add_nodes(
            NodeDeclaration::new(count)
                .with_attribute("ei", label)
                .with_attribute("x", positions),
        )
        .expect("nodes declared");
    }
    net
}

/// Reads `(source, target, edge_id)` triples of one stored population.
#[must_use]
pub fn stored_edges(path: &Path, population: &str) -> Vec<(u64, u64, u64)> {
    let container = Container::read(path).expect("container reads");
    let column = |name: &str| {
        let dataset = format!("/edges/{population}/{name}");
        container
            .require(&dataset)
            .expect("dataset present")
            .to_u64(&dataset)
            .expect("integer dataset")
    };
    let sources = column("source_node_id");
    let targets = column("target_node_id");
    let ids = column("edge_id");
    sources
        .into_iter()
        .zip(targets)
        .zip(ids)
        .map(|((source, target), id)| (source, target, id))
        .collect()
}

/// Lists the file names inside `dir`.
#[must_use]
pub fn file_names(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .expect("directory lists")
        .map(|entry| {
            entry
                .expect("entry reads")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

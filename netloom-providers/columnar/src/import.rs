//! Reads node populations back into a [`Network`].
use std::path::Path;

use netloom_core::{Column, NODE_TYPE_ID, Network, NodeDeclaration};
use tracing::{debug, info, instrument};

use crate::{
    container::Container,
    errors::StorageError,
    save::DEFAULT_NULL_TOKEN,
    type_table::load_type_table,
};

/// Stored per-node datasets.
struct NodeRows {
    node_ids: Vec<u64>,
    type_ids: Vec<u64>,
    group_ids: Vec<u64>,
    group_indices: Vec<u64>,
}

/// Adds the nodes of one stored population to `network`.
///
/// Consecutive nodes sharing a type and group become one declaration that
/// keeps the stored node ids and type id. Returns the number of nodes added.
///
/// # Errors
/// Returns [`StorageError::MissingNodes`] when the container holds no node
/// populations, [`StorageError::PopulationRequired`] when several are stored
/// and `population` is `None`, [`StorageError::UnknownPopulation`] for an
/// unknown name, and format or network errors for inconsistent data.
#[instrument(
    name = "storage.import_nodes",
    err,
    skip(network, nodes_file, node_types_file),
    fields(network = %network.name(), nodes_file = %nodes_file.display()),
)]
pub fn import_nodes(
    network: &mut Network,
    nodes_file: &Path,
    node_types_file: &Path,
    population: Option<&str>,
) -> Result<usize, StorageError> {
    let container = Container::read(nodes_file)?;
    let population = select_population(&container, nodes_file, population)?;
    let types = load_type_table(node_types_file, NODE_TYPE_ID, DEFAULT_NULL_TOKEN)?;
    let base = format!("/nodes/{population}");
    let rows = read_rows(&container, &base)?;
    let groups = read_group_columns(&container, &base)?;

    let mut start = 0;
    while start < rows.node_ids.len() {
        let key = (rows.type_ids[start], rows.group_ids[start]);
        let end = (start..rows.node_ids.len())
            .find(|&row| (rows.type_ids[row], rows.group_ids[row]) != key)
            .unwrap_or(rows.node_ids.len());
        let (type_id, group_id) = key;

        let mut declaration = NodeDeclaration::new(end - start)
            .with_node_ids(rows.node_ids[start..end].iter().copied())
            .with_node_type_id(type_id);
        for (name, value) in types.attributes(type_id).unwrap_or_default() {
            declaration = declaration.with_attribute(name.clone(), value.clone());
        }
        if let Some(columns) = groups.iter().find(|(id, _)| *id == group_id) {
            for (name, column, dataset) in &columns.1 {
                let gathered = gather(column, &rows.group_indices[start..end], dataset)?;
                declaration = declaration.with_attribute(name.clone(), gathered);
            }
        }
        debug!(type_id, group_id, count = end - start, "importing node run");
        network.add_nodes(declaration)?;
        start = end;
    }

    info!(
        population = %population,
        nodes = rows.node_ids.len(),
        "imported nodes"
    );
    Ok(rows.node_ids.len())
}

fn select_population(
    container: &Container,
    path: &Path,
    requested: Option<&str>,
) -> Result<String, StorageError> {
    let available = container.children("/nodes");
    match (requested, available.as_slice()) {
        (_, []) => Err(StorageError::MissingNodes {
            path: path.to_path_buf(),
        }),
        (Some(name), _) if available.iter().any(|candidate| candidate == name) => {
            Ok(name.to_owned())
        }
        (Some(name), _) => Err(StorageError::UnknownPopulation {
            path: path.to_path_buf(),
            population: name.to_owned(),
        }),
        (None, [only]) => Ok(only.clone()),
        (None, _) => Err(StorageError::PopulationRequired {
            path: path.to_path_buf(),
            available,
        }),
    }
}

fn read_rows(container: &Container, base: &str) -> Result<NodeRows, StorageError> {
    let read = |name: &str| {
        let path = format!("{base}/{name}");
        container.require(&path)?.to_u64(&path)
    };
    let rows = NodeRows {
        node_ids: read("node_id")?,
        type_ids: read("node_type_id")?,
        group_ids: read("node_group_id")?,
        group_indices: read("node_group_index")?,
    };
    let expected = rows.node_ids.len();
    for (name, len) in [
        ("node_type_id", rows.type_ids.len()),
        ("node_group_id", rows.group_ids.len()),
        ("node_group_index", rows.group_indices.len()),
    ] {
        if len != expected {
            return Err(StorageError::malformed(
                &format!("{base}/{name}"),
                format!("holds {len} rows but node_id holds {expected}"),
            ));
        }
    }
    Ok(rows)
}

type GroupColumns = Vec<(u64, Vec<(String, Column, String)>)>;

fn read_group_columns(container: &Container, base: &str) -> Result<GroupColumns, StorageError> {
    let mut groups = Vec::new();
    for child in container.children(base) {
        let Ok(group_id) = child.parse::<u64>() else {
            continue;
        };
        let group_base = format!("{base}/{child}");
        let mut columns = Vec::new();
        for name in container.children(&group_base) {
            let path = format!("{group_base}/{name}");
            let column = container.require(&path)?.to_column(&path)?;
            columns.push((name, column, path));
        }
        groups.push((group_id, columns));
    }
    Ok(groups)
}

fn gather(column: &Column, indices: &[u64], dataset: &str) -> Result<Column, StorageError> {
    let mut gathered = Column::empty(column.dtype());
    for &index in indices {
        let value = usize::try_from(index)
            .ok()
            .and_then(|row| column.get(row))
            .ok_or_else(|| {
                StorageError::malformed(dataset, format!("group index {index} is out of range"))
            })?;
        gathered.push(value)?;
    }
    Ok(gathered)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::container::Dataset;

    fn container_with(populations: &[&str]) -> Container {
        let mut container = Container::new();
        for name in populations {
            container.insert(format!("/nodes/{name}/node_id"), Dataset::uint64(vec![0]));
        }
        container
    }

    #[rstest]
    #[case(&["V1"], None, Ok("V1"))]
    #[case(&["V1", "LGN"], Some("LGN"), Ok("LGN"))]
    #[case(&["V1", "LGN"], None, Err("STORAGE_POPULATION_REQUIRED"))]
    #[case(&["V1"], Some("LGN"), Err("STORAGE_UNKNOWN_POPULATION"))]
    #[case(&[], None, Err("STORAGE_MISSING_NODES"))]
    fn populations_are_selected_by_name(
        #[case] stored: &[&str],
        #[case] requested: Option<&str>,
        #[case] expected: Result<&str, &str>,
    ) {
        let container = container_with(stored);
        let selected = select_population(&container, Path::new("nodes.parquet"), requested);
        match (selected, expected) {
            (Ok(name), Ok(wanted)) => assert_eq!(name, wanted),
            (Err(err), Err(code)) => assert_eq!(err.code().as_str(), code),
            (other, wanted) => panic!("expected {wanted:?}, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_dataset_lengths_are_rejected() {
        let mut container = Container::new();
        container.insert("/nodes/V1/node_id", Dataset::uint64(vec![0, 1]));
        container.insert("/nodes/V1/node_type_id", Dataset::uint64(vec![100]));
        container.insert("/nodes/V1/node_group_id", Dataset::uint32(&[0, 0]));
        container.insert("/nodes/V1/node_group_index", Dataset::uint64(vec![0, 1]));
        let err = read_rows(&container, "/nodes/V1").err().expect("length mismatch");
        assert!(matches!(err, StorageError::MalformedDataset { .. }));
    }

    #[test]
    fn group_values_are_gathered_by_index() {
        let column = Column::Float(vec![0.5, 1.5, 2.5]);
        let gathered = gather(&column, &[2, 0], "/nodes/V1/0/x").expect("indices in range");
        assert_eq!(gathered, Column::Float(vec![2.5, 0.5]));
        let err = gather(&column, &[3], "/nodes/V1/0/x").expect_err("out of range");
        assert_eq!(err.kind(), netloom_core::ErrorKind::Format);
    }
}

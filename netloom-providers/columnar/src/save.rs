//! Writes built networks as dataset containers plus type tables.
use std::path::{Path, PathBuf};

use netloom_core::{
    BuildState, EDGE_TYPE_ID, EdgeIndex, EdgeTable, NODE_TYPE_ID, Network, NetworkError, NodeSet,
    SortOptions, TypeTable,
};
use parquet::basic::GzipLevel;
use tracing::{debug, info, instrument};

use crate::{
    atomic::StagedWrites,
    container::{Container, Dataset},
    errors::StorageError,
    type_table::{load_type_table, write_type_table},
};

/// Cell written for type attributes a type does not define.
pub const DEFAULT_NULL_TOKEN: &str = "NULL";

/// Compression applied to dataset containers.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Compression {
    /// Store pages uncompressed.
    None,
    /// Gzip at the default level.
    Gzip,
    /// The library default, gzip.
    #[default]
    Default,
}

impl Compression {
    fn to_parquet(self) -> parquet::basic::Compression {
        match self {
            Self::None => parquet::basic::Compression::UNCOMPRESSED,
            Self::Gzip | Self::Default => parquet::basic::Compression::GZIP(GzipLevel::default()),
        }
    }
}

/// How existing dataset containers are treated.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum WriteMode {
    /// Every output file must be new unless overwriting is forced.
    #[default]
    Create,
    /// New populations are merged into existing containers.
    Append,
}

/// Options shared by [`save`], [`save_nodes`] and [`save_edges`].
///
/// # Examples
/// ```
/// use netloom_core::{SortOptions, SortOrder};
/// use netloom_providers_columnar::{Compression, SaveOptions, WriteMode};
///
/// let options = SaveOptions::new("network")
///     .with_compression(Compression::None)
///     .with_mode(WriteMode::Append)
///     .with_sort(SortOptions::new().with_order(SortOrder::Source));
/// assert_eq!(options.output_dir(), std::path::Path::new("network"));
/// assert!(options.force_build());
/// assert!(!options.force_overwrite());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOptions {
    output_dir: PathBuf,
    compression: Compression,
    force_overwrite: bool,
    force_build: bool,
    mode: WriteMode,
    sort: SortOptions,
    null_token: String,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self::new(".")
    }
}

impl SaveOptions {
    /// Creates options writing into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            compression: Compression::Default,
            force_overwrite: false,
            force_build: true,
            mode: WriteMode::Create,
            sort: SortOptions::default(),
            null_token: DEFAULT_NULL_TOKEN.to_owned(),
        }
    }

    /// Sets the container compression.
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Allows replacing existing files and populations.
    #[must_use]
    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    /// Builds unbuilt networks instead of failing.
    #[must_use]
    pub fn with_force_build(mut self, force: bool) -> Self {
        self.force_build = force;
        self
    }

    /// Sets how existing containers are treated.
    #[must_use]
    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the order edges are written in.
    #[must_use]
    pub fn with_sort(mut self, sort: SortOptions) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the type-table cell used for undefined attributes.
    #[must_use]
    pub fn with_null_token(mut self, token: impl Into<String>) -> Self {
        self.null_token = token.into();
        self
    }

    /// Returns the output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns the container compression.
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Returns whether existing outputs may be replaced.
    #[must_use]
    pub fn force_overwrite(&self) -> bool {
        self.force_overwrite
    }

    /// Returns whether unbuilt networks are built before saving.
    #[must_use]
    pub fn force_build(&self) -> bool {
        self.force_build
    }

    /// Returns the write mode.
    #[must_use]
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Returns the edge sort options.
    #[must_use]
    pub fn sort(&self) -> &SortOptions {
        &self.sort
    }

    /// Returns the null token.
    #[must_use]
    pub fn null_token(&self) -> &str {
        &self.null_token
    }

    fn resolve(&self, file: Option<&Path>, default: String) -> PathBuf {
        match file {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.output_dir.join(path),
            None => self.output_dir.join(default),
        }
    }
}

/// File names for [`save_nodes`]; unset names use the network name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeFiles {
    nodes: Option<PathBuf>,
    node_types: Option<PathBuf>,
}

impl NodeFiles {
    /// Uses the default `{name}_nodes.parquet` and `{name}_node_types.csv`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the node container file.
    #[must_use]
    pub fn with_nodes(mut self, path: impl Into<PathBuf>) -> Self {
        self.nodes = Some(path.into());
        self
    }

    /// Overrides the node type table file.
    #[must_use]
    pub fn with_node_types(mut self, path: impl Into<PathBuf>) -> Self {
        self.node_types = Some(path.into());
        self
    }
}

/// File names and population filters for [`save_edges`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeFiles {
    edges: Option<PathBuf>,
    edge_types: Option<PathBuf>,
    source_network: Option<String>,
    target_network: Option<String>,
}

impl EdgeFiles {
    /// Writes every population under `{src}_{trg}_edges.parquet` and
    /// `{src}_{trg}_edge_types.csv`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the edge container file; valid for a single population.
    #[must_use]
    pub fn with_edges(mut self, path: impl Into<PathBuf>) -> Self {
        self.edges = Some(path.into());
        self
    }

    /// Overrides the edge type table file; valid for a single population.
    #[must_use]
    pub fn with_edge_types(mut self, path: impl Into<PathBuf>) -> Self {
        self.edge_types = Some(path.into());
        self
    }

    /// Keeps populations whose sources belong to `network`.
    #[must_use]
    pub fn with_source_network(mut self, network: impl Into<String>) -> Self {
        self.source_network = Some(network.into());
        self
    }

    /// Keeps populations whose targets belong to `network`.
    #[must_use]
    pub fn with_target_network(mut self, network: impl Into<String>) -> Self {
        self.target_network = Some(network.into());
        self
    }

    fn selects(&self, table: &EdgeTable) -> bool {
        self.source_network
            .as_deref()
            .is_none_or(|name| name == table.source_network())
            && self
                .target_network
                .as_deref()
                .is_none_or(|name| name == table.target_network())
    }
}

/// Files written for one population.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedPopulation {
    /// Population name: the network name for nodes, `{src}_to_{trg}` for edges.
    pub population: String,
    /// Dataset container path.
    pub data: PathBuf,
    /// Type table path.
    pub types: PathBuf,
    /// Rows written.
    pub rows: usize,
}

/// Files written by [`save`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveReport {
    /// Node files.
    pub nodes: SavedPopulation,
    /// Edge files, one entry per population.
    pub edges: Vec<SavedPopulation>,
}

struct PlannedWrite {
    group: String,
    population: String,
    data: PathBuf,
    types: PathBuf,
    id_column: &'static str,
    container: Container,
    type_table: TypeTable,
    rows: usize,
}

/// Saves nodes, then every edge population, with default file names.
///
/// Every file is staged before any is renamed into place, so a failure
/// leaves all earlier outputs untouched.
///
/// # Errors
/// See [`save_nodes`] and [`save_edges`].
#[instrument(
    name = "storage.save",
    err,
    skip(network, options),
    fields(
        network = %network.name(),
        mode = ?options.mode(),
        populations = tracing::field::Empty,
    ),
)]
pub fn save(network: &mut Network, options: &SaveOptions) -> Result<SaveReport, StorageError> {
    let mut plans = vec![plan_nodes(network, &NodeFiles::new(), options)?];
    plans.extend(plan_edges(network, &EdgeFiles::new(), options)?);
    let mut saved = write_plans(plans, options)?.into_iter();
    let nodes = saved.next().ok_or_else(|| not_built(network))?;
    Ok(SaveReport {
        nodes,
        edges: saved.collect(),
    })
}

/// Writes the node container and node type table.
///
/// # Errors
/// Returns [`StorageError::Network`] when the nodes are unbuilt and
/// building is not forced, [`StorageError::OutputExists`] or
/// [`StorageError::PopulationExists`] when an output would be replaced
/// without `force_overwrite`, and I/O or encoding failures.
#[instrument(
    name = "storage.save_nodes",
    err,
    skip(network, files, options),
    fields(network = %network.name(), mode = ?options.mode()),
)]
pub fn save_nodes(
    network: &mut Network,
    files: &NodeFiles,
    options: &SaveOptions,
) -> Result<SavedPopulation, StorageError> {
    let plan = plan_nodes(network, files, options)?;
    write_plans(vec![plan], options)?
        .pop()
        .ok_or_else(|| not_built(network))
}

/// Writes one container and type table per selected edge population.
///
/// # Errors
/// Returns [`StorageError::AmbiguousOutput`] when explicit file names are
/// given for more than one population, plus every error of [`save_nodes`]
/// and edge sort failures. Conflicts are checked for all populations before
/// anything is written, and no file is replaced unless every population
/// was staged.
#[instrument(
    name = "storage.save_edges",
    err,
    skip(network, files, options),
    fields(
        network = %network.name(),
        mode = ?options.mode(),
        populations = tracing::field::Empty,
    ),
)]
pub fn save_edges(
    network: &mut Network,
    files: &EdgeFiles,
    options: &SaveOptions,
) -> Result<Vec<SavedPopulation>, StorageError> {
    let plans = plan_edges(network, files, options)?;
    write_plans(plans, options)
}

fn plan_nodes(
    network: &mut Network,
    files: &NodeFiles,
    options: &SaveOptions,
) -> Result<PlannedWrite, StorageError> {
    if network.nodes_state() != BuildState::Built && !options.force_build {
        return Err(not_built(network));
    }
    let nodes = network.node_set()?;
    let name = nodes.network().to_owned();
    Ok(PlannedWrite {
        group: format!("/nodes/{name}"),
        population: name.clone(),
        data: options.resolve(files.nodes.as_deref(), format!("{name}_nodes.parquet")),
        types: options.resolve(files.node_types.as_deref(), format!("{name}_node_types.csv")),
        id_column: NODE_TYPE_ID,
        container: node_container(&nodes),
        type_table: nodes.types().clone(),
        rows: nodes.len(),
    })
}

fn plan_edges(
    network: &mut Network,
    files: &EdgeFiles,
    options: &SaveOptions,
) -> Result<Vec<PlannedWrite>, StorageError> {
    if !network.is_built() && !options.force_build {
        return Err(not_built(network));
    }
    let tables: Vec<&EdgeTable> = network
        .edge_tables()?
        .iter()
        .filter(|table| files.selects(table))
        .collect();
    tracing::Span::current().record("populations", tables.len());
    if tables.len() > 1 {
        for (artifact, explicit) in [("edges", &files.edges), ("edge types", &files.edge_types)] {
            if explicit.is_some() {
                return Err(StorageError::AmbiguousOutput {
                    artifact,
                    pairs: tables.len(),
                });
            }
        }
    }

    let mut plans = Vec::with_capacity(tables.len());
    for table in tables {
        let sorted = table.sorted(&options.sort)?;
        let stem = format!("{}_{}", sorted.source_network(), sorted.target_network());
        debug!(
            population = %sorted.population(),
            rows = sorted.len(),
            order = ?options.sort.order(),
            "sorted edge population"
        );
        plans.push(PlannedWrite {
            group: format!("/edges/{}", sorted.population()),
            population: sorted.population(),
            data: options.resolve(files.edges.as_deref(), format!("{stem}_edges.parquet")),
            types: options.resolve(files.edge_types.as_deref(), format!("{stem}_edge_types.csv")),
            id_column: EDGE_TYPE_ID,
            container: edge_container(&sorted),
            type_table: sorted.types().clone(),
            rows: sorted.len(),
        });
    }
    Ok(plans)
}

fn not_built(network: &Network) -> StorageError {
    StorageError::Network(NetworkError::NotBuilt {
        network: network.name().to_owned(),
    })
}

fn check_conflicts(plans: &[PlannedWrite], options: &SaveOptions) -> Result<(), StorageError> {
    if options.force_overwrite {
        return Ok(());
    }
    for plan in plans {
        match options.mode {
            WriteMode::Create => {
                for path in [&plan.data, &plan.types] {
                    if path.exists() {
                        return Err(StorageError::OutputExists { path: path.clone() });
                    }
                }
            }
            WriteMode::Append => {
                if plan.data.exists() && Container::read(&plan.data)?.contains_group(&plan.group) {
                    return Err(StorageError::PopulationExists {
                        path: plan.data.clone(),
                        population: plan.population.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Checks every plan, stages every file, then renames them all into place.
fn write_plans(
    plans: Vec<PlannedWrite>,
    options: &SaveOptions,
) -> Result<Vec<SavedPopulation>, StorageError> {
    check_conflicts(&plans, options)?;
    let mut staged = StagedWrites::default();
    let saved = plans
        .into_iter()
        .map(|plan| stage(plan, options, &mut staged))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(files = staged.len(), "staged outputs");
    staged.persist()?;
    for population in &saved {
        info!(
            population = %population.population,
            rows = population.rows,
            data = %population.data.display(),
            types = %population.types.display(),
            "saved population"
        );
    }
    Ok(saved)
}

fn stage(
    plan: PlannedWrite,
    options: &SaveOptions,
    staged: &mut StagedWrites,
) -> Result<SavedPopulation, StorageError> {
    let PlannedWrite {
        group,
        population,
        data,
        types,
        id_column,
        mut container,
        mut type_table,
        rows,
    } = plan;

    if options.mode == WriteMode::Append {
        if data.exists() {
            let mut existing = Container::read(&data)?;
            existing.remove_group(&group);
            existing.merge(container);
            container = existing;
        }
        if types.exists() {
            let existing = load_type_table(&types, id_column, &options.null_token)?;
            type_table.merge(&existing);
        }
    }

    let compression = options.compression.to_parquet();
    staged.stage(&data, |file| container.write_parquet(file, compression))?;
    staged.stage(&types, |file| {
        write_type_table(file, &type_table, id_column, &options.null_token)
    })?;
    debug!(
        population = %population,
        datasets = container.len(),
        "staged population"
    );
    Ok(SavedPopulation {
        population,
        data,
        types,
        rows,
    })
}

/// Lays out the node datasets of `nodes` under `/nodes/{network}`.
#[must_use]
pub fn node_container(nodes: &NodeSet) -> Container {
    let base = format!("/nodes/{}", nodes.network());
    let mut node_ids = Vec::with_capacity(nodes.len());
    let mut type_ids = Vec::with_capacity(nodes.len());
    let mut group_ids = Vec::with_capacity(nodes.len());
    let mut group_indices = Vec::with_capacity(nodes.len());
    for node in nodes.iter() {
        node_ids.push(node.node_id());
        type_ids.push(node.node_type_id());
        group_ids.push(node.group_id());
        group_indices.push(node.group_index());
    }

    let mut container = Container::new();
    container.insert(format!("{base}/node_id"), Dataset::uint64(node_ids));
    container.insert(format!("{base}/node_type_id"), Dataset::uint64(type_ids));
    container.insert(format!("{base}/node_group_id"), Dataset::uint32(&group_ids));
    container.insert(format!("{base}/node_group_index"), Dataset::uint64(group_indices));
    for (group_id, layout) in (0_u32..).zip(nodes.groups()) {
        for name in layout.signature.names() {
            if let Some(column) = nodes.group_column(group_id, name) {
                container.insert(
                    format!("{base}/{group_id}/{name}"),
                    Dataset::from_column(&column),
                );
            }
        }
    }
    container
}

/// Lays out the edge datasets and indices of `table` under
/// `/edges/{src}_to_{trg}`.
#[must_use]
pub fn edge_container(table: &EdgeTable) -> Container {
    let base = format!("/edges/{}", table.population());
    let mut container = Container::new();
    container.insert(
        format!("{base}/source_node_id"),
        Dataset::uint64(table.source_node_ids().to_vec()),
    );
    container.insert(
        format!("{base}/target_node_id"),
        Dataset::uint64(table.target_node_ids().to_vec()),
    );
    container.insert(format!("{base}/edge_id"), Dataset::uint64(table.edge_ids().to_vec()));
    container.insert(
        format!("{base}/edge_type_id"),
        Dataset::uint64(table.edge_type_ids().to_vec()),
    );
    container.insert(format!("{base}/edge_group_id"), Dataset::uint32(table.group_ids()));
    container.insert(
        format!("{base}/edge_group_index"),
        Dataset::uint64(table.group_indices().to_vec()),
    );
    for (group_id, group) in (0_u32..).zip(table.groups()) {
        for (name, column) in group.columns() {
            container.insert(format!("{base}/{group_id}/{name}"), Dataset::from_column(column));
        }
    }
    insert_index(
        &mut container,
        &format!("{base}/indices/source_to_target"),
        table.source_index(),
        table.source_nodes(),
    );
    insert_index(
        &mut container,
        &format!("{base}/indices/target_to_source"),
        table.target_index(),
        table.target_nodes(),
    );
    container
}

fn insert_index(container: &mut Container, base: &str, index: &EdgeIndex, nodes: &NodeSet) {
    let node_count = nodes.max_node_id().map_or(0, |max| max + 1);
    container.insert(
        format!("{base}/node_id_to_range"),
        Dataset::ranges(&index.node_id_to_range(node_count)),
    );
    container.insert(
        format!("{base}/range_to_edge_id"),
        Dataset::ranges(index.range_to_edge_id()),
    );
}

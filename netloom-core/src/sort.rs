//! Edge ordering: in-memory sort and external k-way merge.
//!
//! Both paths order [`SortRecord`]s by `(key, other, row)`, so they produce
//! the same permutation for the same input.

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

#[cfg(feature = "parallel")]
use rayon::slice::ParallelSliceMut;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{Span, debug, field, instrument};

use crate::error::SortError;

/// Column the edge table is ordered by.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum SortOrder {
    /// Keep materialization order.
    None,
    /// Order by source node id.
    Source,
    /// Order by target node id.
    #[default]
    Target,
}

/// Configures how edges are ordered before they are written.
///
/// # Examples
/// ```
/// use netloom_core::{SortOptions, SortOrder};
///
/// let options = SortOptions::new()
///     .with_order(SortOrder::Source)
///     .with_external(true)
///     .with_run_capacity(4096);
/// assert!(options.uses_external(10));
/// assert!(!SortOptions::new().uses_external(10));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SortOptions {
    order: SortOrder,
    external: bool,
    memory_limit_edges: usize,
    run_capacity: usize,
    scratch_dir: Option<PathBuf>,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            order: SortOrder::Target,
            external: false,
            memory_limit_edges: 50_000_000,
            run_capacity: 1 << 20,
            scratch_dir: None,
        }
    }
}

impl SortOptions {
    /// Creates options sorting by target in memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sort column.
    #[must_use]
    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Forces the external merge sort regardless of size.
    #[must_use]
    pub fn with_external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }

    /// Sets the edge count above which the external sort is used.
    #[must_use]
    pub fn with_memory_limit_edges(mut self, limit: usize) -> Self {
        self.memory_limit_edges = limit;
        self
    }

    /// Sets how many records each spilled run holds.
    #[must_use]
    pub fn with_run_capacity(mut self, capacity: usize) -> Self {
        self.run_capacity = capacity;
        self
    }

    /// Places spill runs under `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Returns the sort column.
    #[must_use]
    pub fn order(&self) -> SortOrder {
        self.order
    }

    /// Returns the configured run capacity.
    #[must_use]
    pub fn run_capacity(&self) -> usize {
        self.run_capacity
    }

    /// Returns whether `edges` records would be sorted externally.
    #[must_use]
    pub fn uses_external(&self, edges: usize) -> bool {
        self.external || edges > self.memory_limit_edges
    }
}

/// Sort key of one edge row.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct SortRecord {
    /// Node id the table is ordered by.
    pub key: u64,
    /// Node id at the other end of the edge.
    pub other: u64,
    /// Edge row in materialization order.
    pub row: u64,
}

/// Computes the row permutation ordering the edges by `options`.
///
/// `sources` and `targets` hold the endpoint ids of every edge row. The
/// whole permutation is collected; use [`visit_sorted_rows`] to consume rows
/// as the merge produces them.
///
/// # Errors
/// Returns [`SortError`] when spilling or merging runs fails.
///
/// # Examples
/// ```
/// use netloom_core::{SortOptions, sort_permutation};
///
/// let sources = [0, 1, 2];
/// let targets = [5, 3, 3];
/// let rows = sort_permutation(&sources, &targets, &SortOptions::new())?;
/// assert_eq!(rows, [1, 2, 0]);
/// # Ok::<(), netloom_core::SortError>(())
/// ```
pub fn sort_permutation(
    sources: &[u64],
    targets: &[u64],
    options: &SortOptions,
) -> Result<Vec<usize>, SortError> {
    let mut rows = Vec::with_capacity(sources.len());
    visit_sorted_rows(sources, targets, options, |row| rows.push(row))?;
    Ok(rows)
}

/// Calls `visit` with every edge row in the order given by `options`.
///
/// On the external path records stream out of the k-way merge: besides the
/// spill buffer of `run_capacity` records, one record per run is held in
/// memory at a time.
///
/// # Errors
/// Returns [`SortError`] when spilling or merging runs fails.
#[instrument(
    name = "sort.permutation",
    err,
    skip(sources, targets, options, visit),
    fields(edges = sources.len(), order = ?options.order(), external = field::Empty),
)]
pub fn visit_sorted_rows<F>(
    sources: &[u64],
    targets: &[u64],
    options: &SortOptions,
    mut visit: F,
) -> Result<(), SortError>
where
    F: FnMut(usize),
{
    let (keys, others) = match options.order {
        SortOrder::None => {
            (0..sources.len()).for_each(visit);
            return Ok(());
        }
        SortOrder::Source => (sources, targets),
        SortOrder::Target => (targets, sources),
    };
    let records = keys
        .iter()
        .zip(others)
        .enumerate()
        .map(|(row, (&key, &other))| SortRecord {
            key,
            other,
            row: row as u64,
        });

    let external = options.uses_external(sources.len());
    Span::current().record("external", external);
    if external {
        let mut sorter = ExternalSorter::new(options)?;
        for record in records {
            sorter.push(record)?;
        }
        for record in sorter.finish()? {
            visit(record?.row_index());
        }
    } else {
        for record in sort_in_memory(records.collect()) {
            visit(record.row_index());
        }
    }
    Ok(())
}

impl SortRecord {
    fn row_index(self) -> usize {
        usize::try_from(self.row).unwrap_or(usize::MAX)
    }
}

/// Sorts records in memory, in parallel when the `parallel` feature is on.
#[must_use]
pub fn sort_in_memory(mut records: Vec<SortRecord>) -> Vec<SortRecord> {
    #[cfg(feature = "parallel")]
    records.par_sort_unstable();
    #[cfg(not(feature = "parallel"))]
    records.sort_unstable();
    records
}

#[derive(Debug)]
struct Run {
    path: PathBuf,
    len: u64,
}

/// Sorts more records than fit in memory by spilling sorted runs to disk.
///
/// Runs live in a scoped temporary directory removed when the sorter, or the
/// [`MergedRuns`] iterator it turns into, is dropped.
///
/// # Examples
/// ```
/// use netloom_core::{ExternalSorter, SortOptions, SortRecord};
///
/// let options = SortOptions::new().with_run_capacity(2);
/// let mut sorter = ExternalSorter::new(&options)?;
/// for (row, key) in [4_u64, 1, 3, 0, 2].into_iter().enumerate() {
///     sorter.push(SortRecord { key, other: 0, row: row as u64 })?;
/// }
/// let keys: Vec<u64> = sorter
///     .finish()?
///     .map(|record| record.map(|record| record.key))
///     .collect::<Result<_, _>>()?;
/// assert_eq!(keys, [0, 1, 2, 3, 4]);
/// # Ok::<(), netloom_core::SortError>(())
/// ```
#[derive(Debug)]
pub struct ExternalSorter {
    scratch: TempDir,
    run_capacity: usize,
    buffer: Vec<SortRecord>,
    runs: Vec<Run>,
}

impl ExternalSorter {
    /// Creates a sorter with a fresh scratch directory.
    ///
    /// # Errors
    /// Returns [`SortError::ZeroRunCapacity`] for a zero run capacity and
    /// [`SortError::Io`] when the scratch directory cannot be created.
    pub fn new(options: &SortOptions) -> Result<Self, SortError> {
        if options.run_capacity == 0 {
            return Err(SortError::ZeroRunCapacity);
        }
        let scratch = match &options.scratch_dir {
            Some(dir) => TempDir::new_in(dir).map_err(|source| SortError::Io {
                path: dir.clone(),
                source,
            })?,
            None => TempDir::new().map_err(|source| SortError::Io {
                path: std::env::temp_dir(),
                source,
            })?,
        };
        Ok(Self {
            scratch,
            run_capacity: options.run_capacity,
            buffer: Vec::with_capacity(options.run_capacity.min(1 << 16)),
            runs: Vec::new(),
        })
    }

    /// Returns the scratch directory holding the runs.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Returns the number of runs spilled so far.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Returns the number of records waiting in the spill buffer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Adds a record, spilling a run when the buffer is full.
    ///
    /// # Errors
    /// Returns [`SortError`] when the run cannot be written.
    pub fn push(&mut self, record: SortRecord) -> Result<(), SortError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.run_capacity {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<(), SortError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let run = sort_in_memory(std::mem::take(&mut self.buffer));
        let path = self
            .scratch
            .path()
            .join(format!("run-{:05}.bin", self.runs.len()));
        let io_error = |source| SortError::Io {
            path: path.clone(),
            source,
        };
        let file = File::create(&path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        for record in &run {
            bincode::serialize_into(&mut writer, record)?;
        }
        writer.flush().map_err(io_error)?;
        debug!(run = self.runs.len(), records = run.len(), "spilled sort run");
        self.runs.push(Run {
            path,
            len: run.len() as u64,
        });
        Ok(())
    }

    /// Spills the remaining records and starts the k-way merge.
    ///
    /// # Errors
    /// Returns [`SortError`] when a run cannot be written or reopened.
    pub fn finish(mut self) -> Result<MergedRuns, SortError> {
        self.spill()?;
        let mut readers = Vec::with_capacity(self.runs.len());
        for run in self.runs {
            let file = File::open(&run.path).map_err(|source| SortError::Io {
                path: run.path.clone(),
                source,
            })?;
            readers.push(RunReader {
                reader: BufReader::new(file),
                remaining: run.len,
            });
        }
        let mut merged = MergedRuns {
            _scratch: self.scratch,
            readers,
            heap: BinaryHeap::new(),
        };
        for slot in 0..merged.readers.len() {
            merged.refill(slot)?;
        }
        Ok(merged)
    }
}

#[derive(Debug)]
struct RunReader {
    reader: BufReader<File>,
    remaining: u64,
}

impl RunReader {
    fn next_record(&mut self) -> Result<Option<SortRecord>, SortError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(bincode::deserialize_from(&mut self.reader)?))
    }
}

/// Iterator over the merged runs of an [`ExternalSorter`], in sorted order.
#[derive(Debug)]
pub struct MergedRuns {
    _scratch: TempDir,
    readers: Vec<RunReader>,
    heap: BinaryHeap<Reverse<(SortRecord, usize)>>,
}

impl MergedRuns {
    /// Returns the number of records held in memory by the merge.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.heap.len()
    }

    /// Returns the number of runs being merged.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.readers.len()
    }

    fn refill(&mut self, slot: usize) -> Result<(), SortError> {
        if let Some(reader) = self.readers.get_mut(slot)
            && let Some(record) = reader.next_record()?
        {
            self.heap.push(Reverse((record, slot)));
        }
        Ok(())
    }
}

impl Iterator for MergedRuns {
    type Item = Result<SortRecord, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse((record, slot)) = self.heap.pop()?;
        match self.refill(slot) {
            Ok(()) => Some(Ok(record)),
            Err(err) => {
                self.heap.clear();
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use crate::test_utils::suite_proptest_config;
    use rstest::rstest;

    #[rstest]
    #[case(SortOrder::None, vec![0, 1, 2, 3])]
    #[case(SortOrder::Source, vec![2, 3, 1, 0])]
    #[case(SortOrder::Target, vec![3, 1, 0, 2])]
    fn permutation_follows_order(#[case] order: SortOrder, #[case] expected: Vec<usize>) {
        let sources = [9, 1, 0, 1];
        let targets = [2, 1, 5, 0];
        let options = SortOptions::new().with_order(order);
        let rows = sort_permutation(&sources, &targets, &options).expect("sort succeeds");
        assert_eq!(rows, expected);
    }

    #[test]
    fn zero_run_capacity_is_rejected() {
        let options = SortOptions::new().with_run_capacity(0);
        assert!(matches!(
            ExternalSorter::new(&options),
            Err(SortError::ZeroRunCapacity)
        ));
    }

    #[test]
    fn scratch_directory_is_removed_after_merge() {
        let options = SortOptions::new().with_run_capacity(3);
        let mut sorter = ExternalSorter::new(&options).expect("scratch dir");
        let scratch = sorter.scratch_dir().to_path_buf();
        for row in 0..10 {
            sorter
                .push(SortRecord {
                    key: 10 - row,
                    other: 0,
                    row,
                })
                .expect("push");
        }
        assert_eq!(sorter.run_count(), 3);
        let merged: Vec<SortRecord> = sorter
            .finish()
            .expect("finish")
            .collect::<Result<_, _>>()
            .expect("merge");
        assert_eq!(merged.len(), 10);
        assert!(!scratch.exists());
    }

    #[test]
    fn scratch_directory_honours_configured_parent() {
        let parent = tempfile::tempdir().expect("parent dir");
        let options = SortOptions::new().with_scratch_dir(parent.path());
        let sorter = ExternalSorter::new(&options).expect("scratch dir");
        assert!(sorter.scratch_dir().starts_with(parent.path()));
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(1_000)]
    fn shuffled_records_merge_in_order(#[case] capacity: usize) {
        use rand::{SeedableRng, rngs::SmallRng, seq::SliceRandom};

        let mut records: Vec<SortRecord> = (0..500)
            .map(|row| SortRecord {
                key: row % 37,
                other: row % 11,
                row,
            })
            .collect();
        records.shuffle(&mut SmallRng::seed_from_u64(17));

        let options = SortOptions::new().with_run_capacity(capacity);
        let mut sorter = ExternalSorter::new(&options).expect("scratch dir");
        for record in records.iter().copied() {
            sorter.push(record).expect("push");
        }
        let merged: Vec<SortRecord> = sorter
            .finish()
            .expect("finish")
            .collect::<Result<_, _>>()
            .expect("merge");
        assert_eq!(merged, sort_in_memory(records));
    }

    #[test]
    fn external_merge_holds_at_most_one_record_per_run() {
        let options = SortOptions::new().with_run_capacity(7);
        let mut sorter = ExternalSorter::new(&options).expect("scratch dir");
        for row in 0..200 {
            sorter
                .push(SortRecord {
                    key: (row * 31) % 17,
                    other: row % 5,
                    row,
                })
                .expect("push");
            assert!(sorter.buffered() < 7);
        }
        let mut merged = sorter.finish().expect("finish");
        let runs = merged.run_count();
        assert_eq!(runs, 29);
        let mut previous = None;
        let mut streamed = 0;
        while let Some(record) = merged.next() {
            let record = record.expect("merge");
            assert!(merged.buffered() <= runs);
            assert!(previous.is_none_or(|previous| previous <= record));
            previous = Some(record);
            streamed += 1;
        }
        assert_eq!(streamed, 200);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn visited_rows_match_the_permutation(#[case] external: bool) {
        let sources: Vec<u64> = (0..50).map(|row| (row * 7) % 13).collect();
        let targets: Vec<u64> = (0..50).map(|row| (row * 3) % 11).collect();
        let options = SortOptions::new()
            .with_external(external)
            .with_run_capacity(4);
        let mut visited = Vec::new();
        visit_sorted_rows(&sources, &targets, &options, |row| visited.push(row))
            .expect("sort succeeds");
        let expected = sort_permutation(&sources, &targets, &SortOptions::new())
            .expect("sort succeeds");
        assert_eq!(visited, expected);
    }

    proptest! {
        #![proptest_config(suite_proptest_config(32))]

        #[test]
        fn external_and_in_memory_sorts_agree(
            edges in prop::collection::vec((0_u64..32, 0_u64..32), 0..300),
            capacity in 1_usize..40,
        ) {
            let (sources, targets): (Vec<u64>, Vec<u64>) = edges.into_iter().unzip();
            let memory = SortOptions::new();
            let external = SortOptions::new().with_external(true).with_run_capacity(capacity);
            let in_memory = sort_permutation(&sources, &targets, &memory)
                .map_err(|err| TestCaseError::fail(err.to_string()))?;
            let on_disk = sort_permutation(&sources, &targets, &external)
                .map_err(|err| TestCaseError::fail(err.to_string()))?;
            prop_assert_eq!(in_memory, on_disk);
        }
    }
}

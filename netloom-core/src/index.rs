//! CSR-style lookup from node ids to the edge rows incident on them.

#[cfg(feature = "parallel")]
use rayon::slice::ParallelSliceMut;

/// Maps node ids to runs of edge rows.
///
/// Every node id present in the key column owns a `[start, end)` slice of
/// `range_to_edge_id`; each entry there is a `[start, end)` range of
/// consecutive edge rows sharing that key. Sorting the edge table by the key
/// collapses every node to a single range.
///
/// # Examples
/// ```
/// use netloom_core::EdgeIndex;
///
/// // Target ids of five edge rows, not sorted.
/// let index = EdgeIndex::build(&[3, 3, 1, 3, 1]);
/// assert_eq!(index.keys(), [1, 3]);
/// assert_eq!(index.ranges(3), [(0, 2), (3, 4)]);
/// assert_eq!(index.rows(1).collect::<Vec<_>>(), [2, 4]);
/// assert!(index.ranges(2).is_empty());
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EdgeIndex {
    keys: Vec<u64>,
    node_ranges: Vec<(usize, usize)>,
    edge_ranges: Vec<(u64, u64)>,
}

impl EdgeIndex {
    /// Builds the index from the key of every edge row, in row order.
    #[must_use]
    pub fn build(keys_by_row: &[u64]) -> Self {
        let mut runs: Vec<(u64, u64, u64)> = Vec::new();
        for (row, &key) in keys_by_row.iter().enumerate() {
            let row = row as u64;
            match runs.last_mut() {
                Some((last_key, _, end)) if *last_key == key && *end == row => *end = row + 1,
                _ => runs.push((key, row, row + 1)),
            }
        }
        sort_runs(&mut runs);

        let mut index = Self {
            keys: Vec::new(),
            node_ranges: Vec::new(),
            edge_ranges: Vec::with_capacity(runs.len()),
        };
        for (key, start, end) in runs {
            if index.keys.last() != Some(&key) {
                let at = index.edge_ranges.len();
                index.keys.push(key);
                index.node_ranges.push((at, at));
            }
            index.edge_ranges.push((start, end));
            if let Some(range) = index.node_ranges.last_mut() {
                range.1 += 1;
            }
        }
        index
    }

    /// Returns the distinct node ids in ascending order.
    #[must_use]
    pub fn keys(&self) -> &[u64] {
        &self.keys
    }

    /// Returns the edge-row ranges incident on `node_id`.
    #[must_use]
    pub fn ranges(&self, node_id: u64) -> &[(u64, u64)] {
        self.keys
            .binary_search(&node_id)
            .ok()
            .and_then(|at| self.node_ranges.get(at))
            .and_then(|&(start, end)| self.edge_ranges.get(start..end))
            .unwrap_or(&[])
    }

    /// Iterates the edge rows incident on `node_id` in row order.
    pub fn rows(&self, node_id: u64) -> impl Iterator<Item = usize> + '_ {
        self.ranges(node_id).iter().flat_map(|&(start, end)| {
            let start = usize::try_from(start).unwrap_or(usize::MAX);
            let end = usize::try_from(end).unwrap_or(usize::MAX);
            start..end
        })
    }

    /// Returns the number of edge rows incident on `node_id`.
    #[must_use]
    pub fn degree(&self, node_id: u64) -> u64 {
        self.ranges(node_id)
            .iter()
            .map(|&(start, end)| end - start)
            .sum()
    }

    /// Returns every edge-row range grouped by node id.
    #[must_use]
    pub fn range_to_edge_id(&self) -> &[(u64, u64)] {
        &self.edge_ranges
    }

    /// Returns `[start, end)` slices of [`Self::range_to_edge_id`] for every
    /// node id in `0..node_count`; nodes without edges map to `(0, 0)`.
    #[must_use]
    pub fn node_id_to_range(&self, node_count: u64) -> Vec<(u64, u64)> {
        let mut dense = vec![(0, 0); usize::try_from(node_count).unwrap_or(0)];
        for (key, &(start, end)) in self.keys.iter().zip(&self.node_ranges) {
            if let Some(slot) = usize::try_from(*key).ok().and_then(|at| dense.get_mut(at)) {
                *slot = (start as u64, end as u64);
            }
        }
        dense
    }
}

#[cfg(feature = "parallel")]
fn sort_runs(runs: &mut [(u64, u64, u64)]) {
    runs.par_sort_unstable();
}

#[cfg(not(feature = "parallel"))]
fn sort_runs(runs: &mut [(u64, u64, u64)]) {
    runs.sort_unstable();
}

//! Lazy-deletion priority propagation

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use terrabox_core::raster::{try_filled_vec, Connectivity};
use terrabox_core::{Error, ProgressReporter, Result};

/// Marks a cell with no predecessor
pub const NO_PARENT: usize = usize::MAX;

/// A queued cell.
///
/// `parent` is the row-major index of the cell this candidate was reached
/// from, or the cell's own index for seeds.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub key: f64,
    pub row: usize,
    pub col: usize,
    pub parent: usize,
}

impl Candidate {
    pub fn new(key: f64, row: usize, col: usize, parent: usize) -> Self {
        Self { key, row, col, parent }
    }

    fn sort_key(&self) -> (f64, usize, usize, usize) {
        (self.key, self.row, self.col, self.parent)
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        let (k1, r1, c1, p1) = self.sort_key();
        let (k2, r2, c2, p2) = other.sort_key();
        k1.total_cmp(&k2).then((r1, c1, p1).cmp(&(r2, c2, p2)))
    }
}

/// Min-priority queue over grid cells that settles each cell once.
///
/// A cell may be pushed any number of times; [`PriorityPropagation::pop`]
/// discards entries for cells that are already settled. Popping therefore
/// yields at most `rows * cols` candidates in total.
///
/// Callers wanting largest-first order push negated keys.
pub struct PriorityPropagation {
    cols: usize,
    heap: BinaryHeap<Reverse<Candidate>>,
    settled: Vec<bool>,
    settle_count: usize,
}

impl PriorityPropagation {
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        Ok(Self {
            cols,
            heap: BinaryHeap::new(),
            settled: try_filled_vec(cell_count(rows, cols)?, false)?,
            settle_count: 0,
        })
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn is_settled(&self, row: usize, col: usize) -> bool {
        self.settled[self.index(row, col)]
    }

    /// Queue a candidate unless its cell is already settled
    pub fn push(&mut self, candidate: Candidate) {
        if !self.is_settled(candidate.row, candidate.col) {
            self.heap.push(Reverse(candidate));
        }
    }

    /// Settle a cell without visiting it, e.g. to make it a barrier
    pub fn exclude(&mut self, row: usize, col: usize) {
        let ix = self.index(row, col);
        self.settled[ix] = true;
    }

    /// Pop the lowest candidate whose cell is not yet settled, and settle it
    pub fn pop(&mut self) -> Option<Candidate> {
        while let Some(Reverse(candidate)) = self.heap.pop() {
            let ix = self.index(candidate.row, candidate.col);
            if self.settled[ix] {
                continue;
            }
            self.settled[ix] = true;
            self.settle_count += 1;
            return Some(candidate);
        }
        None
    }

    /// Number of cells settled by [`PriorityPropagation::pop`]
    pub fn settle_count(&self) -> usize {
        self.settle_count
    }

    /// Entries still queued, stale ones included
    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    /// Poll for cancellation and report progress once per scan-line's
    /// worth of settled cells
    pub fn checkpoint(&self, progress: &mut ProgressReporter<'_>, total: usize) -> Result<()> {
        if self.settle_count % self.cols.max(1) == 0 {
            progress.check_cancelled()?;
            progress.fraction(self.settle_count, total);
        }
        Ok(())
    }
}

/// Result of [`shortest_paths`]
#[derive(Debug, Clone)]
pub struct ShortestPaths {
    pub rows: usize,
    pub cols: usize,
    /// Accumulated cost per cell, `INFINITY` where unreached
    pub cost: Vec<f64>,
    /// Predecessor index per cell; seeds point at themselves, unreached
    /// cells hold [`NO_PARENT`]
    pub parent: Vec<usize>,
    /// Row-major indices in the order cells were settled
    pub order: Vec<usize>,
}

impl ShortestPaths {
    /// Follow predecessors from `index` back to its seed
    pub fn seed_of(&self, mut index: usize) -> Option<usize> {
        for _ in 0..=self.order.len() {
            let parent = self.parent[index];
            if parent == NO_PARENT {
                return None;
            }
            if parent == index {
                return Some(index);
            }
            index = parent;
        }
        None
    }
}

fn cell_count(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols)
        .ok_or(Error::ResourceExhausted { cells: usize::MAX })
}

/// Dijkstra-style cost propagation from a set of seed cells.
///
/// `step_cost(from, to, weight)` prices a move between neighbouring cells,
/// where `weight` is 1 for axis steps and √2 for diagonal ones; `None` makes
/// `to` unreachable from `from`. Ties are broken by the candidate's
/// `(row, col)` and then by its predecessor index.
pub fn shortest_paths<F>(
    rows: usize,
    cols: usize,
    seeds: &[(usize, usize)],
    connectivity: Connectivity,
    progress: &mut ProgressReporter<'_>,
    mut step_cost: F,
) -> Result<ShortestPaths>
where
    F: FnMut((usize, usize), (usize, usize), f64) -> Option<f64>,
{
    let total = cell_count(rows, cols)?;
    let mut queue = PriorityPropagation::new(rows, cols)?;
    let mut cost = try_filled_vec(total, f64::INFINITY)?;
    let mut parent = try_filled_vec(total, NO_PARENT)?;
    let mut order = Vec::new();

    // seeds off the grid are ignored, as in flood_fill
    for &(r, c) in seeds.iter().filter(|&&(r, c)| r < rows && c < cols) {
        let ix = queue.index(r, c);
        cost[ix] = 0.0;
        queue.push(Candidate::new(0.0, r, c, ix));
    }

    while let Some(cell) = queue.pop() {
        let here = queue.index(cell.row, cell.col);
        cost[here] = cell.key;
        parent[here] = cell.parent;
        order.push(here);

        for &(dr, dc, weight) in connectivity.neighbors() {
            let nr = cell.row as isize + dr;
            let nc = cell.col as isize + dc;
            if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            if queue.is_settled(nr, nc) {
                continue;
            }
            let Some(step) = step_cost((cell.row, cell.col), (nr, nc), weight) else {
                continue;
            };
            let next = cell.key + step;
            let ix = queue.index(nr, nc);
            if next <= cost[ix] {
                cost[ix] = next;
                queue.push(Candidate::new(next, nr, nc, here));
            }
        }

        queue.checkpoint(progress, total)?;
    }

    tracing::debug!(
        "propagation settled {} of {} cells",
        queue.settle_count(),
        total
    );

    Ok(ShortestPaths {
        rows,
        cols,
        cost,
        parent,
        order,
    })
}

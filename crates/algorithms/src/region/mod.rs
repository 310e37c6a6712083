//! Region-growing engine
//!
//! Two reusable expansion strategies over a [`Raster`](terrabox_core::Raster):
//!
//! - [`flood_fill`]: stamps a label over every connected cell that satisfies
//!   a membership predicate, using an explicit stack so region size is not
//!   bounded by the call stack.
//! - [`PriorityPropagation`]: a lazy-deletion min-priority queue that settles
//!   each cell at most once, in `(key, row, col, parent)` order.
//!   [`shortest_paths`] builds chamfer-weighted cost propagation on top of it.

mod flood;
mod priority;

pub use flood::flood_fill;
pub use priority::{shortest_paths, Candidate, PriorityPropagation, ShortestPaths, NO_PARENT};

/// Ground distance between the centres of two cells
pub fn step_length(from: (usize, usize), to: (usize, usize), cell_x: f64, cell_y: f64) -> f64 {
    let dy = (to.0 as f64 - from.0 as f64) * cell_y;
    let dx = (to.1 as f64 - from.1 as f64) * cell_x;
    dx.hypot(dy)
}

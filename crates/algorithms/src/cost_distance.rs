//! Cost-distance analysis
//!
//! Computes the accumulated cost of traveling from source cells across a cost
//! surface using Dijkstra's algorithm with 8-connectivity, together with a
//! backlink grid recording each cell's predecessor on its least-cost path.
//! [`cost_allocation`] follows those backlinks to assign every cell the value
//! of the source it drains to.

use terrabox_core::raster::{backlink, try_filled_vec, Connectivity, DataScale, DataType, Raster};
use terrabox_core::{Algorithm, Error, ProgressReporter, Result};

use crate::region::{shortest_paths, step_length};

/// Accumulated cost and backlink grids
#[derive(Debug, Clone)]
pub struct CostDistanceOutputs {
    pub distance: Raster,
    /// Direction to the predecessor cell as a power of two, 0 at sources
    pub backlink: Raster,
}

/// Cost-distance algorithm. Input is `(sources, cost)`.
#[derive(Debug, Clone, Default)]
pub struct CostDistance;

impl Algorithm for CostDistance {
    type Input = (Raster, Raster);
    type Output = CostDistanceOutputs;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Cost Distance"
    }

    fn description(&self) -> &'static str {
        "Accumulated least cost to the nearest source, with backlinks"
    }

    fn execute(
        &self,
        input: Self::Input,
        _params: Self::Params,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Self::Output> {
        let (sources, cost) = input;
        cost_distance(&sources, &cost, progress)
    }
}

/// Compute accumulated cost distance from source cells.
///
/// Sources are the non-zero, valid cells of `sources`. Moving between two
/// neighbouring cells costs the mean of their cost values times the ground
/// distance between their centres. Cost cells that are NoData or negative
/// are impassable; they and any cell no source can reach are NoData in both
/// outputs.
pub fn cost_distance(
    sources: &Raster,
    cost: &Raster,
    progress: &mut ProgressReporter<'_>,
) -> Result<CostDistanceOutputs> {
    sources.check_same_grid(cost)?;
    let (rows, cols) = cost.shape();
    let nodata = cost.nodata();
    let cost_grid = cost.data();
    let (cell_x, cell_y) = (cost.cell_size_x(), cost.cell_size_y());
    let passable = |v: f64| !cost.is_nodata(v) && v >= 0.0;

    let seeds: Vec<(usize, usize)> = sources
        .data()
        .indexed_iter()
        .filter(|&(ix, &v)| v != 0.0 && !sources.is_nodata(v) && passable(cost_grid[ix]))
        .map(|(ix, _)| ix)
        .collect();
    if seeds.is_empty() {
        return Err(Error::Algorithm("No source cells found for cost distance".into()));
    }

    progress.set_label("Cost distance");
    let paths = shortest_paths(rows, cols, &seeds, Connectivity::Eight, progress, |from, to, _| {
        let next = cost_grid[to];
        passable(next)
            .then(|| (cost_grid[from] + next) / 2.0 * step_length(from, to, cell_x, cell_y))
    })?;

    let mut distance = cost.derive(DataType::Float, nodata, nodata)?;
    distance.set_data_scale(DataScale::Continuous);
    let mut links = cost.derive(DataType::Float, nodata, nodata)?;
    links.set_data_scale(DataScale::Categorical);

    {
        let dist = distance.data_mut()?;
        for &ix in &paths.order {
            dist[(ix / cols, ix % cols)] = paths.cost[ix];
        }
    }
    {
        let link = links.data_mut()?;
        for &ix in &paths.order {
            let parent = paths.parent[ix];
            let (r, c) = (ix / cols, ix % cols);
            link[(r, c)] = if parent == ix {
                0.0
            } else {
                let dr = (parent / cols) as isize - r as isize;
                let dc = (parent % cols) as isize - c as isize;
                backlink::OFFSETS
                    .iter()
                    .position(|&o| o == (dr, dc))
                    .map_or(nodata, backlink::code)
            };
        }
    }

    progress.update(100);
    Ok(CostDistanceOutputs {
        distance,
        backlink: links,
    })
}

/// Cost allocation algorithm. Input is `(sources, backlink)`.
#[derive(Debug, Clone, Default)]
pub struct CostAllocation;

impl Algorithm for CostAllocation {
    type Input = (Raster, Raster);
    type Output = Raster;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Cost Allocation"
    }

    fn description(&self) -> &'static str {
        "Assign each cell the value of the source its backlink path leads to"
    }

    fn execute(
        &self,
        input: Self::Input,
        _params: Self::Params,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Self::Output> {
        let (sources, links) = input;
        cost_allocation(&sources, &links, progress)
    }
}

const UNRESOLVED: f64 = f64::NAN;

/// Follow backlinks from every cell to a source and copy its value.
///
/// A path ends at a cell whose backlink is 0. Paths that leave the grid,
/// reach NoData, meet an invalid code or loop back on themselves give
/// NoData.
pub fn cost_allocation(
    sources: &Raster,
    links: &Raster,
    progress: &mut ProgressReporter<'_>,
) -> Result<Raster> {
    sources.check_same_grid(links)?;
    let (rows, cols) = links.shape();
    let nodata = sources.nodata();
    let link_grid = links.data();

    let mut out = try_filled_vec(rows * cols, UNRESOLVED)?;
    let mut path: Vec<usize> = Vec::new();

    progress.set_label("Cost allocation");
    for row in 0..rows {
        for col in 0..cols {
            let start = row * cols + col;
            if !out[start].is_nan() {
                continue;
            }

            path.clear();
            let (mut r, mut c) = (row as isize, col as isize);
            let value = loop {
                if !links.in_bounds(r, c) {
                    break nodata;
                }
                let ix = r as usize * cols + c as usize;
                if !out[ix].is_nan() {
                    break out[ix];
                }
                if path.len() > rows * cols {
                    break nodata;
                }
                path.push(ix);
                let link = link_grid[(r as usize, c as usize)];
                if links.is_nodata(link) {
                    break nodata;
                }
                if link == 0.0 {
                    let v = sources.get(r, c);
                    break if sources.is_nodata(v) { nodata } else { v };
                }
                match backlink::decode(link) {
                    Some((dr, dc)) => {
                        r += dr;
                        c += dc;
                    }
                    None => break nodata,
                }
            };
            for &ix in &path {
                out[ix] = value;
            }
        }
        progress.check_cancelled()?;
        progress.fraction(row + 1, rows);
    }

    let mut header = sources.header().derive(sources.data_type(), nodata);
    header.data_scale = sources.data_scale();
    let data = ndarray::Array2::from_shape_vec((rows, cols), out)
        .map_err(|e| Error::Other(e.to_string()))?;
    Raster::with_header(data, header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::SQRT_2;

    fn uniform_cost(rows: usize, cols: usize, val: f64) -> Raster {
        let mut r = Raster::new(rows, cols);
        r.fill(val).unwrap();
        r
    }

    fn source_at(rows: usize, cols: usize, cells: &[(isize, isize, f64)]) -> Raster {
        let mut r = Raster::new(rows, cols);
        for &(row, col, v) in cells {
            r.set(row, col, v).unwrap();
        }
        r
    }

    #[test]
    fn test_cost_distance_basic() {
        let cost = uniform_cost(10, 10, 1.0);
        let sources = source_at(10, 10, &[(0, 0, 1.0)]);
        let out = cost_distance(&sources, &cost, &mut ProgressReporter::silent()).unwrap();

        let v00 = out.distance.get(0, 0);
        assert!(v00.abs() < 1e-10, "Source should be 0, got {}", v00);

        let v01 = out.distance.get(0, 1);
        assert!((v01 - 1.0).abs() < 1e-10, "Adjacent should be 1.0, got {}", v01);

        let v11 = out.distance.get(1, 1);
        assert!((v11 - SQRT_2).abs() < 1e-10, "Diagonal should be sqrt(2), got {}", v11);

        assert_eq!(out.backlink.get(0, 0), 0.0);
        // (0, 1) points west to the source
        assert_eq!(out.backlink.get(0, 1), 32.0);
        // (1, 1) points north-west
        assert_eq!(out.backlink.get(1, 1), 64.0);
    }

    #[test]
    fn test_cost_distance_barrier() {
        let mut cost = uniform_cost(5, 5, 1.0);
        for r in 0..5 {
            cost.set(r, 2, cost.nodata()).unwrap();
        }
        let sources = source_at(5, 5, &[(2, 0, 1.0)]);
        let out = cost_distance(&sources, &cost, &mut ProgressReporter::silent()).unwrap();

        assert_eq!(out.distance.get(2, 2), out.distance.nodata());
        assert_eq!(out.distance.get(2, 4), out.distance.nodata());
        assert_eq!(out.backlink.get(0, 4), out.backlink.nodata());
    }

    #[test]
    fn test_cost_distance_needs_sources() {
        let cost = uniform_cost(3, 3, 1.0);
        let sources = Raster::new(3, 3);
        assert!(cost_distance(&sources, &cost, &mut ProgressReporter::silent()).is_err());
    }

    #[test]
    fn test_cost_allocation_follows_backlinks() {
        let cost = uniform_cost(4, 6, 1.0);
        let sources = source_at(4, 6, &[(0, 0, 7.0), (3, 5, 9.0)]);
        let dist = cost_distance(&sources, &cost, &mut ProgressReporter::silent()).unwrap();
        let alloc =
            cost_allocation(&sources, &dist.backlink, &mut ProgressReporter::silent()).unwrap();

        assert_eq!(alloc.get(0, 0), 7.0);
        assert_eq!(alloc.get(0, 1), 7.0);
        assert_eq!(alloc.get(3, 5), 9.0);
        assert_eq!(alloc.get(3, 4), 9.0);
    }

    #[test]
    fn test_cost_allocation_mismatch_is_configuration_error() {
        let sources = Raster::new(3, 3);
        let links = Raster::new(3, 4);
        let err = cost_allocation(&sources, &links, &mut ProgressReporter::silent()).unwrap_err();
        assert_eq!(err.kind(), terrabox_core::ErrorKind::Configuration);
    }

    #[test]
    fn test_cost_allocation_broken_paths() {
        let sources = source_at(1, 3, &[(0, 0, 5.0)]);
        let mut links = Raster::new(1, 3);
        links.set(0, 1, 32.0).unwrap(); // west, to the source
        links.set(0, 2, 128.0).unwrap(); // north, off the grid
        let alloc = cost_allocation(&sources, &links, &mut ProgressReporter::silent()).unwrap();
        assert_eq!(alloc.get(0, 0), 5.0);
        assert_eq!(alloc.get(0, 1), 5.0);
        assert_eq!(alloc.get(0, 2), alloc.nodata());
    }

    #[test]
    fn test_cost_allocation_cycle_is_nodata() {
        let sources = Raster::new(1, 2);
        let mut links = Raster::new(1, 2);
        links.set(0, 0, 2.0).unwrap(); // east
        links.set(0, 1, 32.0).unwrap(); // west
        let alloc = cost_allocation(&sources, &links, &mut ProgressReporter::silent()).unwrap();
        assert_eq!(alloc.get(0, 0), alloc.nodata());
    }
}

//! Euclidean allocation and distance
//!
//! Every non-zero, valid cell of the input is a target. Each other cell is
//! assigned the value of its nearest target and the distance to it, measured
//! along 8-connected chamfer paths (axis steps one cell size, diagonal steps
//! the cell diagonal).

use terrabox_core::raster::{Connectivity, DataScale, DataType, Raster};
use terrabox_core::{Algorithm, Error, ProgressReporter, Result};

use crate::region::{shortest_paths, step_length};

/// Allocation and distance grids produced together
#[derive(Debug, Clone)]
pub struct EuclideanOutputs {
    /// Value of the nearest target
    pub allocation: Raster,
    /// Distance to the nearest target, in map units
    pub distance: Raster,
}

/// Euclidean allocation algorithm
#[derive(Debug, Clone, Default)]
pub struct EuclideanAllocation;

impl Algorithm for EuclideanAllocation {
    type Input = Raster;
    type Output = EuclideanOutputs;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Euclidean Allocation"
    }

    fn description(&self) -> &'static str {
        "Assign every cell the value of its nearest non-zero cell"
    }

    fn execute(
        &self,
        input: Self::Input,
        _params: Self::Params,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Self::Output> {
        euclidean_allocation(&input, progress)
    }
}

/// Compute nearest-target allocation and distance.
///
/// NoData cells are impassable and stay NoData in both outputs, as do
/// cells no target can reach.
pub fn euclidean_allocation(
    input: &Raster,
    progress: &mut ProgressReporter<'_>,
) -> Result<EuclideanOutputs> {
    let (rows, cols) = input.shape();
    let nodata = input.nodata();
    let grid = input.data();
    let (cell_x, cell_y) = (input.cell_size_x(), input.cell_size_y());

    let seeds: Vec<(usize, usize)> = grid
        .indexed_iter()
        .filter(|&(_, &v)| v != 0.0 && !input.is_nodata(v))
        .map(|(ix, _)| ix)
        .collect();
    if seeds.is_empty() {
        tracing::warn!("no target cells in {}", input.name());
    }

    progress.set_label("Allocating");
    let paths = shortest_paths(rows, cols, &seeds, Connectivity::Eight, progress, |from, to, _| {
        (!input.is_nodata(grid[to])).then(|| step_length(from, to, cell_x, cell_y))
    })?;

    let mut allocation = input.derive(input.data_type(), nodata, nodata)?;
    allocation.set_data_scale(input.data_scale());
    let mut distance = input.derive(DataType::Float, nodata, nodata)?;
    distance.set_data_scale(DataScale::Continuous);

    {
        let alloc = allocation.data_mut()?;
        let alloc_cells = alloc
            .as_slice_mut()
            .ok_or_else(|| Error::Other("grid is not contiguous".into()))?;
        for &ix in &paths.order {
            let parent = paths.parent[ix];
            alloc_cells[ix] = if parent == ix {
                grid[(ix / cols, ix % cols)]
            } else {
                alloc_cells[parent]
            };
        }
    }
    {
        let dist = distance.data_mut()?;
        for &ix in &paths.order {
            dist[(ix / cols, ix % cols)] = paths.cost[ix];
        }
    }

    progress.update(100);
    Ok(EuclideanOutputs {
        allocation,
        distance,
    })
}

/// Distance from every cell to the nearest non-zero cell
pub fn euclidean_distance(input: &Raster, progress: &mut ProgressReporter<'_>) -> Result<Raster> {
    euclidean_allocation(input, progress).map(|out| out.distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::SQRT_2;

    #[test]
    fn test_single_target_distances() {
        let mut input = Raster::new(3, 3);
        input.set(1, 1, 4.0).unwrap();
        let out = euclidean_allocation(&input, &mut ProgressReporter::silent()).unwrap();

        assert!(out.allocation.data().iter().all(|&v| v == 4.0));
        assert_eq!(out.distance.get(1, 1), 0.0);
        assert_relative_eq!(out.distance.get(0, 1), 1.0, epsilon = 1e-12);
        assert_relative_eq!(out.distance.get(0, 0), SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn test_nodata_is_impassable_and_preserved() {
        let nd = -32768.0;
        #[rustfmt::skip]
        let values = vec![
            1.0, nd, 0.0,
            0.0, nd, 0.0,
            0.0, nd, 2.0,
        ];
        let input = Raster::from_vec(values, 3, 3).unwrap();
        let out = euclidean_allocation(&input, &mut ProgressReporter::silent()).unwrap();
        for r in 0..3 {
            assert_eq!(out.allocation.get(r, 1), nd);
            assert_eq!(out.distance.get(r, 1), nd);
            assert_eq!(out.allocation.get(r, 0), 1.0);
            assert_eq!(out.allocation.get(r, 2), 2.0);
        }
        assert_relative_eq!(out.distance.get(2, 0), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_no_targets_gives_nodata() {
        let input = Raster::new(2, 2);
        let out = euclidean_distance(&input, &mut ProgressReporter::silent()).unwrap();
        assert!(out.data().iter().all(|&v| v == out.nodata()));
    }

    #[test]
    fn test_distance_scales_with_cell_size() {
        use terrabox_core::raster::{Extent, RasterHeader};
        let mut header = RasterHeader::new(1, 4, Extent::new(10.0, 0.0, 40.0, 0.0));
        header.data_type = DataType::Double;
        let mut input = Raster::from_header(header, 0.0).unwrap();
        input.set(0, 0, 1.0).unwrap();
        let out = euclidean_distance(&input, &mut ProgressReporter::silent()).unwrap();
        assert_relative_eq!(out.get(0, 3), 30.0, epsilon = 1e-12);
    }
}

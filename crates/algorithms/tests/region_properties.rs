//! Properties of the region-growing engine and the procedures built on it.
//!
//! Grids here are small and synthetic so that expected values can be worked
//! out by hand.

use std::collections::HashMap;
use std::f64::consts::SQRT_2;

use approx::assert_relative_eq;
use terrabox_algorithms::prelude::*;
use terrabox_algorithms::region::{Candidate, NO_PARENT};
use terrabox_core::io::native;
use terrabox_core::LogHost;

const ND: f64 = -32768.0;

/// Deterministic pseudo-random categorical grid
fn patchy(rows: usize, cols: usize, classes: usize) -> Raster {
    let values = (0..rows * cols)
        .map(|i| ((i * 7919 + (i / cols) * 104_729) % 97 % classes) as f64)
        .collect();
    Raster::from_vec(values, rows, cols).unwrap()
}

fn with_holes(mut raster: Raster, holes: &[(isize, isize)]) -> Raster {
    for &(r, c) in holes {
        raster.set(r, c, ND).unwrap();
    }
    raster
}

#[test]
fn edge_policies_on_persisted_raster() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edges.dep");
    let source = patchy(4, 6, 5);
    native::write_raster(&source, &path).unwrap();

    let mut raster = Raster::open(&path, Access::ReadOnly).unwrap();
    let (rows, cols) = (raster.rows() as isize, raster.cols() as isize);
    for c in 0..cols {
        assert_eq!(raster.get(-1, c), raster.nodata());
        assert_eq!(raster.get(rows, c), raster.nodata());
    }

    raster.set_edge_policy(EdgePolicy::Reflect);
    for c in 0..cols {
        assert_eq!(raster.get(-1, c), raster.get(0, c));
        assert_eq!(raster.get(rows, c), raster.get(rows - 1, c));
    }
    for r in 0..rows {
        assert_eq!(raster.get(r, -1), raster.get(r, 0));
        assert_eq!(raster.get(r, cols), raster.get(r, cols - 1));
    }
}

#[test]
fn persisted_round_trip_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dem.dep");
    let values: Vec<f64> = (0..35).map(|i| (i as f64).sin() * 1e3 + 0.1).collect();
    let mut header = RasterHeader::new(5, 7, Extent::new(500.0, 250.0, 1350.0, 1000.0));
    header.data_type = DataType::Double;
    let raster = Raster::with_header(
        ndarray::Array2::from_shape_vec((5, 7), values).unwrap(),
        header,
    )
    .unwrap();
    native::write_raster(&raster, &path).unwrap();

    let back = Raster::open(&path, Access::ReadOnly).unwrap();
    assert_eq!(back.shape(), (5, 7));
    assert_eq!(back.extent(), raster.extent());
    assert_eq!(back.cell_size_x(), 50.0);
    assert_eq!(back.cell_size_y(), 50.0);
    assert_eq!(back.nodata(), raster.nodata());
    for (a, b) in raster.data().iter().zip(back.data().iter()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn clump_output_is_a_fixed_point() {
    for diagonal in [true, false] {
        let params = ClumpParams {
            diagonal,
            zero_background: false,
        };
        let input = with_holes(patchy(12, 15, 3), &[(0, 0), (5, 7), (11, 14)]);
        let first = clump(&input, &params, &mut ProgressReporter::silent()).unwrap();
        let second = clump(&first, &params, &mut ProgressReporter::silent()).unwrap();

        let mut forward: HashMap<u64, u64> = HashMap::new();
        let mut backward: HashMap<u64, u64> = HashMap::new();
        for (a, b) in first.data().iter().zip(second.data().iter()) {
            assert_eq!(*forward.entry(a.to_bits()).or_insert(b.to_bits()), b.to_bits());
            assert_eq!(*backward.entry(b.to_bits()).or_insert(a.to_bits()), a.to_bits());
        }
    }
}

#[test]
fn propagation_settles_each_cell_at_most_once() {
    let (rows, cols) = (9, 11);
    let mut queue = PriorityPropagation::new(rows, cols).unwrap();
    // flood the queue with duplicates for every cell
    for round in 0..4 {
        for r in 0..rows {
            for c in 0..cols {
                let key = ((r * 31 + c * 17 + round * 5) % 13) as f64;
                queue.push(Candidate::new(key, r, c, NO_PARENT));
            }
        }
    }
    let mut popped = 0;
    let mut last = f64::NEG_INFINITY;
    while let Some(cell) = queue.pop() {
        assert!(cell.key >= last);
        last = cell.key;
        popped += 1;
    }
    assert_eq!(popped, rows * cols);
    assert_eq!(queue.settle_count(), rows * cols);
}

#[test]
fn shortest_paths_terminate_and_settle_monotonically() {
    let (rows, cols) = (14, 10);
    let cost = patchy(rows, cols, 6);
    let seeds = [(0, 0), (13, 9), (7, 4)];
    let paths = shortest_paths(
        rows,
        cols,
        &seeds,
        Connectivity::Eight,
        &mut ProgressReporter::silent(),
        |from, to, weight| {
            let a = cost.data()[from];
            let b = cost.data()[to];
            // class 5 is a barrier
            (b != 5.0).then(|| (a + b + 1.0) / 2.0 * weight)
        },
    )
    .unwrap();

    assert!(paths.order.len() <= rows * cols);
    let mut rank = vec![usize::MAX; rows * cols];
    for (i, &ix) in paths.order.iter().enumerate() {
        rank[ix] = i;
    }
    for pair in paths.order.windows(2) {
        assert!(paths.cost[pair[0]] <= paths.cost[pair[1]]);
    }
    // no neighbour settled later is cheaper than the cell settled before it
    for &ix in &paths.order {
        let (r, c) = ((ix / cols) as isize, (ix % cols) as isize);
        for &(dr, dc, _) in Connectivity::Eight.neighbors() {
            let (nr, nc) = (r + dr, c + dc);
            if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                continue;
            }
            let n = nr as usize * cols + nc as usize;
            if rank[n] != usize::MAX && rank[n] > rank[ix] {
                assert!(paths.cost[ix] <= paths.cost[n]);
            }
        }
    }
}

#[test]
fn two_seed_allocation_on_five_by_five() {
    let mut input = Raster::new(5, 5);
    input.set(0, 0, 1.0).unwrap();
    input.set(4, 4, 2.0).unwrap();
    let out = euclidean_allocation(&input, &mut ProgressReporter::silent()).unwrap();
    let label = |r, c| out.allocation.get(r, c);

    // strictly closer to one seed
    assert_eq!(label(1, 1), 1.0);
    assert_eq!(label(2, 1), 1.0);
    assert_eq!(label(3, 3), 2.0);
    assert_eq!(label(2, 3), 2.0);
    assert_eq!(label(3, 2), 2.0);

    // equidistant corners: 4 axis steps from either seed. The neighbour on
    // seed 1's side has the lower row-major index.
    assert_relative_eq!(out.distance.get(0, 4), 4.0, epsilon = 1e-12);
    assert_relative_eq!(out.distance.get(4, 0), 4.0, epsilon = 1e-12);
    assert_eq!(label(0, 4), 1.0);
    assert_eq!(label(4, 0), 1.0);

    // centre: two diagonal steps from either seed, reached first from (1, 1)
    assert_relative_eq!(out.distance.get(2, 2), 2.0 * SQRT_2, epsilon = 1e-12);
    assert_eq!(label(2, 2), 1.0);

    // the same input always gives the same partition
    let again = euclidean_allocation(&input, &mut ProgressReporter::silent()).unwrap();
    assert_eq!(again.allocation.data(), out.allocation.data());
}

#[test]
fn nodata_survives_every_procedure() {
    let holes = [(0, 3), (4, 4), (7, 0), (9, 9)];
    let mut dem = Raster::new(10, 10);
    for r in 0..10 {
        for c in 0..10 {
            dem.set(r, c, (r * 3 + c) as f64).unwrap();
        }
    }
    dem.set(6, 6, 60.0).unwrap();
    let dem = with_holes(dem, &holes);
    let mut silent = ProgressReporter::silent();

    let mut targets = Raster::new(10, 10);
    targets.set(2, 2, 1.0).unwrap();
    targets.set(8, 8, 2.0).unwrap();
    let targets = with_holes(targets, &holes);

    let clumps = clump(&dem, &ClumpParams::default(), &mut silent).unwrap();
    let alloc = euclidean_allocation(&targets, &mut silent).unwrap();
    let cost = cost_distance(&targets, &dem, &mut silent).unwrap();
    let cost_alloc = cost_allocation(&targets, &cost.backlink, &mut silent).unwrap();
    let oto = remove_off_terrain_objects(
        &dem,
        &OtoParams {
            max_size: 5,
            ..OtoParams::default()
        },
        &mut silent,
    )
    .unwrap();
    let lap = laplacian(&dem, LaplacianKernel::Eight, &mut silent).unwrap();
    let dev = deviation_from_mean(&dem, 2, &mut silent).unwrap();
    let ring = ring_mean(&dem, 2, &mut silent).unwrap();

    let outputs = [
        &clumps,
        &alloc.allocation,
        &alloc.distance,
        &cost.distance,
        &cost.backlink,
        &cost_alloc,
        &oto,
        &lap,
        &dev,
        &ring,
    ];
    for raster in outputs {
        for &(r, c) in &holes {
            assert!(
                raster.is_nodata_at(r, c),
                "({}, {}) lost NoData: {}",
                r,
                c,
                raster.get(r, c)
            );
        }
    }
    // the lone spike is an object
    assert!(oto.get(6, 6) < 60.0);
}

#[test]
fn cancellation_stops_propagation() {
    let host = LogHost::new();
    host.cancel();
    let mut progress = ProgressReporter::new(&host);
    let input = patchy(20, 20, 2);
    let err = euclidean_allocation(&input, &mut progress).unwrap_err();
    assert_eq!(err.kind(), terrabox_core::ErrorKind::Cancelled);
}

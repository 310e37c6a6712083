//! Benchmarks for the region-growing engine and the procedures built on it

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use terrabox_algorithms::allocation::euclidean_allocation;
use terrabox_algorithms::clump::{clump, ClumpParams};
use terrabox_algorithms::cost_distance::cost_distance;
use terrabox_algorithms::oto::{remove_off_terrain_objects, OtoParams};
use terrabox_core::{ProgressReporter, Raster};

/// Categorical grid with irregular patches
fn create_patches(size: usize) -> Raster {
    let values = (0..size * size)
        .map(|i| {
            let (row, col) = (i / size, i % size);
            (((row / 7) * 13 + (col / 5) * 7 + (row * col) % 3) % 4) as f64
        })
        .collect();
    Raster::from_vec(values, size, size).unwrap()
}

/// Gentle slope with square "buildings" every 16 cells
fn create_urban_dem(size: usize) -> Raster {
    let values = (0..size * size)
        .map(|i| {
            let (row, col) = (i / size, i % size);
            let ground = row as f64 * 0.05 + col as f64 * 0.02;
            let building = row % 16 >= 6 && row % 16 < 11 && col % 16 >= 4 && col % 16 < 10;
            if building {
                ground + 8.0
            } else {
                ground
            }
        })
        .collect();
    Raster::from_vec(values, size, size).unwrap()
}

fn sparse_targets(size: usize) -> Raster {
    let mut raster = Raster::new(size, size);
    for k in 0..16isize {
        let r = (k * 37) % size as isize;
        let c = (k * 53) % size as isize;
        raster.set(r, c, (k + 1) as f64).unwrap();
    }
    raster
}

fn bench_clump(c: &mut Criterion) {
    let mut group = c.benchmark_group("region/clump");
    for size in [128, 256, 512] {
        let input = create_patches(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                clump(
                    black_box(&input),
                    &ClumpParams::default(),
                    &mut ProgressReporter::silent(),
                )
                .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_euclidean_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("region/euclidean_allocation");
    for size in [128, 256, 512] {
        let input = sparse_targets(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| euclidean_allocation(black_box(&input), &mut ProgressReporter::silent()).unwrap())
        });
    }
    group.finish();
}

fn bench_cost_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("region/cost_distance");
    for size in [128, 256, 512] {
        let sources = sparse_targets(size);
        let cost = create_urban_dem(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                cost_distance(black_box(&sources), &cost, &mut ProgressReporter::silent()).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_remove_otos(c: &mut Criterion) {
    let mut group = c.benchmark_group("region/remove_otos");
    group.sample_size(10);
    for size in [64, 128] {
        let dem = create_urban_dem(size);
        let params = OtoParams {
            max_size: 21,
            ..OtoParams::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                remove_off_terrain_objects(black_box(&dem), &params, &mut ProgressReporter::silent())
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_clump,
    bench_euclidean_allocation,
    bench_cost_distance,
    bench_remove_otos
);
criterion_main!(benches);

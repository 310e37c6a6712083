//! Clump: connected-component labeling
//!
//! Groups contiguous cells of equal value into uniquely numbered clumps.
//!
//! 1. Scan the grid in row-major order and flood fill a new label from every
//!    unlabeled cell.
//! 2. Reconcile: merge any adjacent equal-valued cells that carry different
//!    labels (lower label wins), repeating full-grid passes until one makes
//!    no merge.
//! 3. Compact the surviving labels into a dense range.

use ndarray::Array2;
use terrabox_core::raster::{Connectivity, DataScale, DataType, Raster, DEFAULT_NODATA};
use terrabox_core::{Algorithm, Error, ProgressReporter, Result};

use crate::region::flood_fill;

const UNLABELED: f64 = f64::NAN;

/// Placeholder label for NoData cells while clumping
const MASKED: f64 = f64::NEG_INFINITY;

/// Largest label a `FLOAT` payload stores exactly
const MAX_FLOAT_LABEL: usize = 1 << 24;

/// Parameters for clumping
#[derive(Debug, Clone)]
pub struct ClumpParams {
    /// Join diagonal neighbours (8-connectivity) rather than only the four
    /// axis neighbours
    pub diagonal: bool,
    /// Treat zero cells as background: they all get label 0 and never seed
    /// or join a clump
    pub zero_background: bool,
}

impl Default for ClumpParams {
    fn default() -> Self {
        Self {
            diagonal: true,
            zero_background: false,
        }
    }
}

/// Clump algorithm
#[derive(Debug, Clone, Default)]
pub struct Clump;

impl Algorithm for Clump {
    type Input = Raster;
    type Output = Raster;
    type Params = ClumpParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Clump"
    }

    fn description(&self) -> &'static str {
        "Label connected regions of equal value"
    }

    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Self::Output> {
        clump(&input, &params, progress)
    }
}

/// Label connected regions of equal value.
///
/// NoData cells stay NoData. Clumps are numbered from 0, or from 1 when
/// `zero_background` reserves 0 for background cells.
pub fn clump(
    input: &Raster,
    params: &ClumpParams,
    progress: &mut ProgressReporter<'_>,
) -> Result<Raster> {
    let (rows, cols) = input.shape();
    let connectivity = Connectivity::from_diagonal(params.diagonal);
    let grid = input.data();

    let mut labels = Array2::from_elem((rows, cols), UNLABELED);
    let first_label = if params.zero_background { 1.0 } else { 0.0 };
    let mut next_label = first_label;

    // Pass 1: seed and grow
    progress.set_label("Loop 1 of 3");
    for row in 0..rows {
        for col in 0..cols {
            let v = grid[(row, col)];
            if input.is_nodata(v) {
                labels[(row, col)] = MASKED;
            } else if params.zero_background && v == 0.0 {
                labels[(row, col)] = 0.0;
            }
        }
    }
    for row in 0..rows {
        for col in 0..cols {
            if !labels[(row, col)].is_nan() {
                continue;
            }
            flood_fill(
                input,
                &mut labels,
                (row, col),
                connectivity,
                |candidate, seed| candidate == seed,
                UNLABELED,
                next_label,
            )?;
            next_label += 1.0;
        }
        progress.check_cancelled()?;
        progress.fraction(row + 1, rows);
    }
    tracing::debug!("clump pass 1 created {} labels", next_label - first_label);

    // Pass 2: reconcile adjacent labels that should be one clump
    progress.set_label("Loop 2 of 3");
    let mut passes = 0;
    loop {
        let merges = merge_pass(input, &mut labels, connectivity, progress)?;
        passes += 1;
        tracing::debug!("clump merge pass {}: {} merges", passes, merges);
        if merges == 0 {
            break;
        }
    }

    // Pass 3: compact labels
    progress.set_label("Loop 3 of 3");
    let count = compact(&mut labels, first_label as usize, params.zero_background);
    progress.update(100);
    tracing::debug!("clump produced {} clumps", count);

    // a non-negative sentinel could collide with a label
    let nodata = if input.nodata() < 0.0 {
        input.nodata()
    } else {
        DEFAULT_NODATA
    };
    labels.mapv_inplace(|l| if l == MASKED { nodata } else { l });

    let data_type = if count + first_label as usize > MAX_FLOAT_LABEL {
        DataType::Double
    } else {
        DataType::Float
    };
    let mut header = input.header().derive(data_type, nodata);
    header.data_scale = DataScale::Categorical;
    header.preferred_palette = "qual.pal".to_string();
    Raster::with_header(labels, header)
}

/// One reconciliation pass. Returns the number of label merges made.
fn merge_pass(
    input: &Raster,
    labels: &mut Array2<f64>,
    connectivity: Connectivity,
    progress: &mut ProgressReporter<'_>,
) -> Result<usize> {
    let (rows, cols) = input.shape();
    let grid = input.data();
    let mut merges = 0;

    for row in 0..rows {
        for col in 0..cols {
            let here = labels[(row, col)];
            if here == MASKED {
                continue;
            }
            for &(dr, dc, _) in connectivity.neighbors() {
                let nr = row as isize + dr;
                let nc = col as isize + dc;
                if !input.in_bounds(nr, nc) {
                    continue;
                }
                let next = (nr as usize, nc as usize);
                let there = labels[next];
                if there == here || there == MASKED {
                    continue;
                }
                if grid[next] != grid[(row, col)] {
                    continue;
                }
                let (keep, drop) = if here < there { (here, there) } else { (there, here) };
                labels.mapv_inplace(|l| if l == drop { keep } else { l });
                merges += 1;
                break;
            }
        }
        progress.check_cancelled()?;
        progress.fraction(row + 1, rows);
    }
    Ok(merges)
}

/// Renumber clump labels densely from `first`, preserving their order.
/// Background (0 when `background` is set) and masked cells keep their
/// label. Returns the number of clumps.
fn compact(labels: &mut Array2<f64>, first: usize, background: bool) -> usize {
    let is_clump = |l: f64| l != MASKED && !(background && l == 0.0);
    let mut used: Vec<f64> = labels.iter().copied().filter(|&l| is_clump(l)).collect();
    used.sort_by(f64::total_cmp);
    used.dedup();

    for label in labels.iter_mut() {
        let current = *label;
        if !is_clump(current) {
            continue;
        }
        if let Ok(rank) = used.binary_search_by(|probe| probe.total_cmp(&current)) {
            *label = (first + rank) as f64;
        }
    }
    used.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn run(values: &[f64], rows: usize, cols: usize, params: ClumpParams) -> Raster {
        let input = Raster::from_vec(values.to_vec(), rows, cols).unwrap();
        clump(&input, &params, &mut ProgressReporter::silent()).unwrap()
    }

    #[test]
    fn test_diagonal_connectivity() {
        #[rustfmt::skip]
        let values = [
            1.0, 2.0, 2.0,
            2.0, 1.0, 2.0,
            2.0, 2.0, 1.0,
        ];
        let eight = run(&values, 3, 3, ClumpParams::default());
        assert_eq!(eight.get(0, 0), eight.get(2, 2));
        assert_eq!(eight.get(0, 0), 0.0);
        assert_eq!(eight.get(0, 1), 1.0);
        assert_eq!(eight.get(1, 0), 1.0);

        let four = run(
            &values,
            3,
            3,
            ClumpParams {
                diagonal: false,
                zero_background: false,
            },
        );
        assert_ne!(four.get(0, 0), four.get(1, 1));
        assert_ne!(four.get(0, 1), four.get(1, 0));
        let max = four.data().iter().cloned().fold(f64::MIN, f64::max);
        assert_eq!(max, 4.0);
    }

    #[test]
    fn test_zero_background() {
        #[rustfmt::skip]
        let values = [
            0.0, 5.0, 0.0,
            0.0, 0.0, 0.0,
            3.0, 0.0, 5.0,
        ];
        let out = run(
            &values,
            3,
            3,
            ClumpParams {
                diagonal: true,
                zero_background: true,
            },
        );
        assert_eq!(out.get(0, 0), 0.0);
        assert_eq!(out.get(1, 1), 0.0);
        let mut clumps = vec![out.get(0, 1), out.get(2, 0), out.get(2, 2)];
        clumps.sort_by(f64::total_cmp);
        assert_eq!(clumps, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_nodata_is_preserved() {
        let nd = -32768.0;
        let out = run(&[1.0, nd, 1.0, 1.0], 2, 2, ClumpParams::default());
        assert_eq!(out.get(0, 1), nd);
        assert_eq!(out.get(0, 0), out.get(1, 1));
        assert_eq!(out.data_scale(), DataScale::Categorical);
    }

    #[test]
    fn test_labels_are_dense() {
        let values: Vec<f64> = (0..30).map(|i| (i % 4) as f64).collect();
        let out = run(&values, 5, 6, ClumpParams::default());
        let mut seen: Vec<f64> = out.data().iter().cloned().collect();
        seen.sort_by(f64::total_cmp);
        seen.dedup();
        let expected: Vec<f64> = (0..seen.len()).map(|i| i as f64).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_clumping_is_a_fixed_point() {
        #[rustfmt::skip]
        let values = [
            1.0, 1.0, 2.0, 2.0,
            3.0, 1.0, 2.0, 4.0,
            3.0, 3.0, 4.0, 4.0,
        ];
        let first = run(&values, 3, 4, ClumpParams::default());
        let second = clump(&first, &ClumpParams::default(), &mut ProgressReporter::silent()).unwrap();

        let mut mapping: HashMap<u64, f64> = HashMap::new();
        for (a, b) in first.data().iter().zip(second.data().iter()) {
            let prev = mapping.insert(a.to_bits(), *b);
            assert!(prev.map_or(true, |p| p == *b));
        }
        let mut images: Vec<f64> = mapping.values().cloned().collect();
        images.sort_by(f64::total_cmp);
        images.dedup();
        assert_eq!(images.len(), mapping.len());
    }
}

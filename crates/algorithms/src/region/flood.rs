//! Explicit-stack flood fill

use ndarray::Array2;
use terrabox_core::raster::{Connectivity, Raster};
use terrabox_core::{Error, Result};

fn same(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Stamp `label` over the region connected to `seed`.
///
/// A neighbour joins the region when its `labels` cell still holds
/// `unlabeled` and `belongs(candidate_value, seed_value)` holds for its value
/// in `source`. The seed itself is stamped if it is unlabeled. Growth stops
/// at the grid boundary.
///
/// Returns the number of cells stamped.
pub fn flood_fill<P>(
    source: &Raster,
    labels: &mut Array2<f64>,
    seed: (usize, usize),
    connectivity: Connectivity,
    mut belongs: P,
    unlabeled: f64,
    label: f64,
) -> Result<usize>
where
    P: FnMut(f64, f64) -> bool,
{
    let (rows, cols) = source.shape();
    if labels.dim() != (rows, cols) {
        let (ar, ac) = labels.dim();
        return Err(Error::SizeMismatch { er: rows, ec: cols, ar, ac });
    }
    if seed.0 >= rows || seed.1 >= cols || !same(labels[seed], unlabeled) {
        return Ok(0);
    }

    let grid = source.data();
    let seed_value = grid[seed];
    labels[seed] = label;
    let mut count = 1;
    let mut stack = vec![seed];

    while let Some((row, col)) = stack.pop() {
        for &(dr, dc, _) in connectivity.neighbors() {
            let nr = row as isize + dr;
            let nc = col as isize + dc;
            if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                continue;
            }
            let next = (nr as usize, nc as usize);
            if !same(labels[next], unlabeled) || !belongs(grid[next], seed_value) {
                continue;
            }
            labels[next] = label;
            count += 1;
            stack.push(next);
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: usize, cols: usize, values: &[f64]) -> Raster {
        Raster::from_vec(values.to_vec(), rows, cols).unwrap()
    }

    #[test]
    fn test_four_vs_eight_connectivity() {
        #[rustfmt::skip]
        let src = grid(3, 3, &[
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        ]);
        let eq = |a: f64, b: f64| a == b;

        let mut labels = Array2::from_elem((3, 3), -1.0);
        let n = flood_fill(&src, &mut labels, (0, 0), Connectivity::Four, eq, -1.0, 7.0).unwrap();
        assert_eq!(n, 1);

        let mut labels = Array2::from_elem((3, 3), -1.0);
        let n = flood_fill(&src, &mut labels, (0, 0), Connectivity::Eight, eq, -1.0, 7.0).unwrap();
        assert_eq!(n, 3);
        assert_eq!(labels[(2, 2)], 7.0);
        assert_eq!(labels[(0, 1)], -1.0);
    }

    #[test]
    fn test_labeled_seed_is_skipped() {
        let src = grid(1, 3, &[1.0, 1.0, 1.0]);
        let mut labels = Array2::from_elem((1, 3), 0.0);
        labels[(0, 0)] = 5.0;
        let n = flood_fill(&src, &mut labels, (0, 0), Connectivity::Four, |a, b| a == b, 0.0, 1.0)
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_large_region_has_no_depth_limit() {
        // a serpentine one cell wide: every step is a new stack frame in a
        // recursive fill
        let (rows, cols) = (200, 200);
        let mut values = vec![0.0; rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                let open = r % 2 == 0
                    || (r % 4 == 1 && c == cols - 1)
                    || (r % 4 == 3 && c == 0);
                if open {
                    values[r * cols + c] = 1.0;
                }
            }
        }
        let expected = values.iter().filter(|&&v| v == 1.0).count();
        let src = Raster::from_vec(values, rows, cols).unwrap();
        let mut labels = Array2::from_elem((rows, cols), f64::NAN);
        let n = flood_fill(&src, &mut labels, (0, 0), Connectivity::Four, |a, b| a == b, f64::NAN, 1.0)
            .unwrap();
        assert_eq!(n, expected);
    }

    #[test]
    fn test_shape_mismatch() {
        let src = grid(2, 2, &[0.0; 4]);
        let mut labels = Array2::zeros((3, 2));
        assert!(flood_fill(&src, &mut labels, (0, 0), Connectivity::Four, |_, _| true, 0.0, 1.0)
            .is_err());
    }
}

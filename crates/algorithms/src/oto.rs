//! Remove off-terrain objects (OTOs) from a DEM
//!
//! Buildings, vegetation and other objects standing on the ground surface are
//! found by "cleaving" peaks: inside a moving window, elevations are
//! propagated inwards from the window edges in descending order, and every
//! cell is capped at the elevation it was reached from. Cells lowered by at
//! least the minimum OTO height are objects; cells lowered by less are shallow
//! hills and are restored, along with any object cells connected to them by
//! a gentle step. Object cells are then re-interpolated from the surrounding
//! unmodified cells by inverse-distance weighting.
//!
//! Edge rows and columns are first cleaved in 1-D strips, since the 2-D tiles
//! always treat them as window edges. Interior cells are processed in tiles
//! overlapping by half their width.

use ndarray::Array2;
use terrabox_core::raster::Raster;
use terrabox_core::{Algorithm, Error, ProgressReporter, Result};

use crate::region::{Candidate, PriorityPropagation};

/// Smallest usable window, in cells
const MIN_WINDOW: usize = 5;

/// Upper bound on iterations when `iterate` is set
const MAX_LOOPS: usize = 500;

/// Iteration stops once the summed squared change of a loop drops to this
const MIN_CUMULATIVE_CHANGE: f64 = 0.5;

const EIGHT: [(isize, isize); 8] = [
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
];

const LINE: [(isize, isize); 2] = [(0, 1), (0, -1)];

/// Parameters for OTO removal
#[derive(Debug, Clone)]
pub struct OtoParams {
    /// Window width in cells; objects wider than this are treated as terrain.
    /// Values below 5 are raised to 5 and even values to the next odd one.
    pub max_size: usize,
    /// Minimum slope (degrees) of an object's edge
    pub min_edge_slope: f64,
    /// Repeat until the DEM stops changing
    pub iterate: bool,
}

impl Default for OtoParams {
    fn default() -> Self {
        Self {
            max_size: 101,
            min_edge_slope: 15.0,
            iterate: false,
        }
    }
}

/// Remove off-terrain objects algorithm
#[derive(Debug, Clone, Default)]
pub struct RemoveOffTerrainObjects;

impl Algorithm for RemoveOffTerrainObjects {
    type Input = Raster;
    type Output = Raster;
    type Params = OtoParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Remove Off-Terrain Objects"
    }

    fn description(&self) -> &'static str {
        "Remove buildings and vegetation from a DEM by peak cleaving"
    }

    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Self::Output> {
        remove_off_terrain_objects(&input, &params, progress)
    }
}

/// Cleaving and interpolation settings shared by every window
struct Cleaver {
    nodata: f64,
    min_height: f64,
}

impl Cleaver {
    fn is_nodata(&self, v: f64) -> bool {
        v == self.nodata || v.is_nan()
    }

    /// Cleave the peaks of one window in place. Object cells receive
    /// interpolated values; everything else is left as it was. Returns
    /// whether any object cell was found.
    fn cleave(
        &self,
        window: &mut Array2<f64>,
        offsets: &[(isize, isize)],
        k_nearest: usize,
    ) -> Result<bool> {
        let (h, w) = window.dim();
        let neighbor = |r: usize, c: usize, dr: isize, dc: isize| -> Option<(usize, usize)> {
            let nr = r as isize + dr;
            let nc = c as isize + dc;
            (nr >= 0 && nc >= 0 && (nr as usize) < h && (nc as usize) < w)
                .then_some((nr as usize, nc as usize))
        };

        // seed with cells on the window edge or next to NoData
        let mut cleaved = Array2::from_elem((h, w), f64::NEG_INFINITY);
        let mut queue = PriorityPropagation::new(h, w)?;
        for ((r, c), &z) in window.indexed_iter() {
            if self.is_nodata(z) {
                cleaved[(r, c)] = self.nodata;
                continue;
            }
            let on_edge = offsets.iter().any(|&(dr, dc)| {
                neighbor(r, c, dr, dc).map_or(true, |n| self.is_nodata(window[n]))
            });
            if on_edge {
                cleaved[(r, c)] = z;
                queue.push(Candidate::new(-z, r, c, r * w + c));
            }
        }

        // highest first: each cell is capped at the level it was reached from
        let mut lowered = false;
        while let Some(cell) = queue.pop() {
            let z = -cell.key;
            for &(dr, dc) in offsets {
                let Some(n) = neighbor(cell.row, cell.col, dr, dc) else {
                    continue;
                };
                let zn = window[n];
                if self.is_nodata(zn) || cleaved[n] != f64::NEG_INFINITY {
                    continue;
                }
                let capped = if zn >= z {
                    lowered |= zn > z;
                    z
                } else {
                    zn
                };
                cleaved[n] = capped;
                queue.push(Candidate::new(-capped, n.0, n.1, cell.row * w + cell.col));
            }
        }
        if !lowered {
            return Ok(false);
        }

        let flags = self.classify(window, &cleaved, offsets, &neighbor);
        if !flags.iter().any(|&f| f == Flag::Object) {
            return Ok(false);
        }
        self.interpolate(window, &flags, offsets, &neighbor, k_nearest);
        Ok(true)
    }

    /// Flag lowered cells as objects or shallow, then let shallow status
    /// spread into object cells reached by a gentle step.
    fn classify<N>(
        &self,
        window: &Array2<f64>,
        cleaved: &Array2<f64>,
        offsets: &[(isize, isize)],
        neighbor: &N,
    ) -> Array2<Flag>
    where
        N: Fn(usize, usize, isize, isize) -> Option<(usize, usize)>,
    {
        let mut flags = Array2::from_elem(window.dim(), Flag::Unmodified);
        let mut shallow = Vec::new();
        for ((r, c), &z) in window.indexed_iter() {
            let lowered_by = z - cleaved[(r, c)];
            if self.is_nodata(z) || lowered_by <= 0.0 {
                continue;
            }
            if lowered_by < self.min_height {
                flags[(r, c)] = Flag::Shallow;
                shallow.push((r, c));
            } else {
                flags[(r, c)] = Flag::Object;
            }
        }

        let min_sq = self.min_height * self.min_height;
        while let Some((r, c)) = shallow.pop() {
            for &(dr, dc) in offsets {
                let Some(n) = neighbor(r, c, dr, dc) else {
                    continue;
                };
                if flags[n] != Flag::Object {
                    continue;
                }
                let dz = window[n] - window[(r, c)];
                if dz * dz < min_sq {
                    flags[n] = Flag::Shallow;
                    shallow.push(n);
                }
            }
        }
        flags
    }

    /// Replace object cells by an inverse-square-distance average of the
    /// nearest valid cells bordering the objects.
    fn interpolate<N>(
        &self,
        window: &mut Array2<f64>,
        flags: &Array2<Flag>,
        offsets: &[(isize, isize)],
        neighbor: &N,
        k_nearest: usize,
    ) where
        N: Fn(usize, usize, isize, isize) -> Option<(usize, usize)>,
    {
        let mut edges: Vec<(usize, usize, f64)> = Vec::new();
        for ((r, c), &flag) in flags.indexed_iter() {
            let z = window[(r, c)];
            if flag == Flag::Object || self.is_nodata(z) {
                continue;
            }
            let borders_object = offsets.iter().any(|&(dr, dc)| {
                neighbor(r, c, dr, dc).map_or(false, |n| flags[n] == Flag::Object)
            });
            if borders_object {
                edges.push((r, c, z));
            }
        }
        if edges.is_empty() {
            return;
        }

        let k = k_nearest.min(edges.len());
        let mut ranked: Vec<(f64, usize, usize, f64)> = Vec::with_capacity(edges.len());
        for ((r, c), &flag) in flags.indexed_iter() {
            if flag != Flag::Object {
                continue;
            }
            ranked.clear();
            ranked.extend(edges.iter().map(|&(er, ec, z)| {
                let dr = er as f64 - r as f64;
                let dc = ec as f64 - c as f64;
                (dr * dr + dc * dc, er, ec, z)
            }));
            let by_distance = |a: &(f64, usize, usize, f64), b: &(f64, usize, usize, f64)| {
                a.0.total_cmp(&b.0).then((a.1, a.2).cmp(&(b.1, b.2)))
            };
            if k < ranked.len() {
                ranked.select_nth_unstable_by(k - 1, by_distance);
            }
            let nearest = &ranked[..k];
            let sum_weights: f64 = nearest.iter().map(|e| 1.0 / e.0).sum();
            let z: f64 = nearest.iter().map(|e| e.3 / e.0).sum::<f64>() / sum_weights;
            window[(r, c)] = z;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Unmodified,
    /// Lowered by at least the minimum object height
    Object,
    /// Lowered, but by less than the minimum object height
    Shallow,
}

fn sample(grid: &Array2<f64>, row: isize, col: isize, nodata: f64) -> f64 {
    let (rows, cols) = grid.dim();
    if row < 0 || col < 0 || row as usize >= rows || col as usize >= cols {
        nodata
    } else {
        grid[(row as usize, col as usize)]
    }
}

/// Top-left corners of the overlapping interior tiles. The first row and
/// column of tiles start one cell outside the grid.
fn tile_corners(rows: usize, cols: usize, step: usize) -> Vec<(isize, isize)> {
    let mut corners = Vec::new();
    let mut row = -1isize;
    while row <= rows as isize - 1 {
        let mut col = -1isize;
        while col <= cols as isize - 1 {
            corners.push((row, col));
            col += step as isize;
        }
        row += step as isize;
    }
    corners
}

/// Remove off-terrain objects from a DEM.
///
/// The minimum object height is `tan(min_edge_slope) * resolution`. NoData
/// cells are never modified.
pub fn remove_off_terrain_objects(
    dem: &Raster,
    params: &OtoParams,
    progress: &mut ProgressReporter<'_>,
) -> Result<Raster> {
    if !params.min_edge_slope.is_finite() {
        return Err(Error::InvalidParameter {
            name: "min_edge_slope",
            value: params.min_edge_slope.to_string(),
            reason: "must be a finite angle in degrees".into(),
        });
    }
    let size = params.max_size.max(MIN_WINDOW) | 1;
    let step = size / 2;
    let (rows, cols) = dem.shape();
    let nodata = dem.nodata();
    let resolution = dem.header().resolution();
    let cleaver = Cleaver {
        nodata,
        min_height: (params.min_edge_slope.to_radians().tan() * resolution).max(0.0),
    };
    tracing::debug!(
        "OTO window {} cells, minimum object height {}",
        size,
        cleaver.min_height
    );

    let mut output = dem.data().clone();
    let corners = tile_corners(rows, cols, step);
    let mut active = vec![true; corners.len()];
    let mut loop_num = 0;
    let mut changed = 0usize;

    loop {
        loop_num += 1;
        let prev_changed = changed;
        changed = 0;
        let mut cumulative = 0.0;
        let current = output.clone();
        progress.set_label(&format!("Loop {}", loop_num));

        if loop_num == 1 {
            cleave_edges(&cleaver, &mut output, size, step)?;
        }

        let mut window = Array2::from_elem((size, size), nodata);
        for (t, &(row0, col0)) in corners.iter().enumerate() {
            if !active[t] {
                continue;
            }
            let mut valid = 0;
            for ((r, c), cell) in window.indexed_iter_mut() {
                *cell = sample(&current, row0 + r as isize, col0 + c as isize, nodata);
                if !cleaver.is_nodata(*cell) {
                    valid += 1;
                }
            }
            if valid > 3 {
                cleaver.cleave(&mut window, &EIGHT, 6)?;
            }

            let mut touched = false;
            for ((r, c), &z) in window.indexed_iter() {
                let (gr, gc) = (row0 + r as isize, col0 + c as isize);
                if gr < 0 || gc < 0 || gr as usize >= rows || gc as usize >= cols {
                    continue;
                }
                let cell = &mut output[(gr as usize, gc as usize)];
                if z < *cell && !cleaver.is_nodata(*cell) && !cleaver.is_nodata(z) {
                    cumulative += (*cell - z) * (*cell - z);
                    *cell = z;
                    touched = true;
                    changed += 1;
                }
            }
            if !touched {
                active[t] = false;
            }

            if col0 + step as isize > cols as isize - 1 {
                progress.check_cancelled()?;
            }
            progress.fraction(t + 1, corners.len());
        }

        tracing::debug!(
            "OTO loop {}: {} cells changed, cumulative change {}",
            loop_num,
            changed,
            cumulative
        );

        let keep_going = params.iterate
            && changed > 0
            && changed != prev_changed
            && loop_num <= MAX_LOOPS
            && cumulative > MIN_CUMULATIVE_CHANGE;
        if !keep_going {
            break;
        }
    }

    let mut header = dem.header().derive(dem.data_type(), nodata);
    header.z_units = dem.header().z_units.clone();
    header.data_scale = dem.data_scale();
    Raster::with_header(output, header)
}

/// Cleave peaks that straddle the grid edges, in 1-D strips along the first
/// and last rows and columns.
fn cleave_edges(cleaver: &Cleaver, grid: &mut Array2<f64>, size: usize, step: usize) -> Result<()> {
    let (rows, cols) = grid.dim();
    if rows == 0 || cols == 0 {
        return Ok(());
    }
    let mut strip = Array2::from_elem((1, size), cleaver.nodata);

    let mut offset = 0;
    while offset < cols {
        for row in [0, rows - 1] {
            let cells: Vec<(usize, usize)> = (offset..offset + size).map(|c| (row, c)).collect();
            cleave_strip(cleaver, grid, &mut strip, &cells)?;
        }
        offset += step;
    }

    let mut offset = 0;
    while offset < rows {
        for col in [0, cols - 1] {
            let cells: Vec<(usize, usize)> = (offset..offset + size).map(|r| (r, col)).collect();
            cleave_strip(cleaver, grid, &mut strip, &cells)?;
        }
        offset += step;
    }
    Ok(())
}

fn cleave_strip(
    cleaver: &Cleaver,
    grid: &mut Array2<f64>,
    strip: &mut Array2<f64>,
    cells: &[(usize, usize)],
) -> Result<()> {
    let nodata = cleaver.nodata;
    let mut valid = 0;
    for (slot, &(r, c)) in strip.iter_mut().zip(cells) {
        *slot = sample(grid, r as isize, c as isize, nodata);
        if !cleaver.is_nodata(*slot) {
            valid += 1;
        }
    }
    if valid <= 2 || !cleaver.cleave(strip, &LINE, 2)? {
        return Ok(());
    }
    for (&z, &(r, c)) in strip.iter().zip(cells) {
        if r >= grid.nrows() || c >= grid.ncols() {
            continue;
        }
        let cell = &mut grid[(r, c)];
        if z < *cell && !cleaver.is_nodata(*cell) {
            *cell = z;
        }
    }
    Ok(())
}

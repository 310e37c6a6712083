//! Focal filters that read past the grid edges by reflection
//!
//! Every filter reads its input with [`EdgePolicy::Reflect`], so windows
//! centred near the border see mirrored cells rather than NoData. NoData
//! centre cells stay NoData. Outputs are `FLOAT` rasters sharing the input's
//! NoData value.

use std::borrow::Cow;

use terrabox_core::raster::{DataType, EdgePolicy, OffsetCache, Raster};
use terrabox_core::{Algorithm, Error, ProgressReporter, Result};

/// Laplacian kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaplacianKernel {
    /// 4-neighbour: centre 4, axis neighbours -1
    #[default]
    Four,
    /// 4-neighbour sharpening: centre 5, axis neighbours -1
    FourSharpen,
    /// 8-neighbour: centre 8, all neighbours -1
    Eight,
    /// Centre 4, axis neighbours -2, diagonals 1
    Diagonal,
    /// 5×5 diamond with centre 17
    Wide,
    /// 5×5 diamond with centre 16; sums to zero
    WideBalanced,
}

#[rustfmt::skip]
const WIDE: [f64; 25] = [
     0.0,  0.0, -1.0,  0.0,  0.0,
     0.0, -1.0, -2.0, -1.0,  0.0,
    -1.0, -2.0, 17.0, -2.0, -1.0,
     0.0, -1.0, -2.0, -1.0,  0.0,
     0.0,  0.0, -1.0,  0.0,  0.0,
];

#[rustfmt::skip]
const WIDE_BALANCED: [f64; 25] = [
     0.0,  0.0, -1.0,  0.0,  0.0,
     0.0, -1.0, -2.0, -1.0,  0.0,
    -1.0, -2.0, 16.0, -2.0, -1.0,
     0.0, -1.0, -2.0, -1.0,  0.0,
     0.0,  0.0, -1.0,  0.0,  0.0,
];

impl LaplacianKernel {
    /// Row-major weights of a square window
    fn weights(self) -> &'static [f64] {
        match self {
            Self::Four => &[0.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 0.0],
            Self::FourSharpen => &[0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0],
            Self::Eight => &[-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0],
            Self::Diagonal => &[1.0, -2.0, 1.0, -2.0, 4.0, -2.0, 1.0, -2.0, 1.0],
            Self::Wide => &WIDE,
            Self::WideBalanced => &WIDE_BALANCED,
        }
    }

    /// Window side length
    pub fn size(self) -> usize {
        match self {
            Self::Wide | Self::WideBalanced => 5,
            _ => 3,
        }
    }
}

/// Which focal filter to run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocalFilter {
    Laplacian(LaplacianKernel),
    /// Standardized deviation of the centre from its neighbours
    DeviationFromMean,
    /// Mean of the cells on a ring around the centre
    RingMean,
}

/// Parameters for focal filtering
#[derive(Debug, Clone)]
pub struct FocalParams {
    pub filter: FocalFilter,
    /// Window half-width for deviation from mean, ring radius for ring mean.
    /// Ignored by the Laplacian.
    pub radius: usize,
}

impl Default for FocalParams {
    fn default() -> Self {
        Self {
            filter: FocalFilter::Laplacian(LaplacianKernel::default()),
            radius: 1,
        }
    }
}

/// Focal filter algorithm
#[derive(Debug, Clone, Default)]
pub struct Focal;

impl Algorithm for Focal {
    type Input = Raster;
    type Output = Raster;
    type Params = FocalParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Focal Filter"
    }

    fn description(&self) -> &'static str {
        "Laplacian, deviation from mean and ring mean filters with reflected edges"
    }

    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Self::Output> {
        match params.filter {
            FocalFilter::Laplacian(kernel) => laplacian(&input, kernel, progress),
            FocalFilter::DeviationFromMean => deviation_from_mean(&input, params.radius, progress),
            FocalFilter::RingMean => ring_mean(&input, params.radius, progress),
        }
    }
}

fn reflected(input: &Raster) -> Cow<'_, Raster> {
    if input.edge_policy() == EdgePolicy::Reflect {
        Cow::Borrowed(input)
    } else {
        let mut copy = input.clone();
        copy.set_edge_policy(EdgePolicy::Reflect);
        Cow::Owned(copy)
    }
}

/// Run `cell` over every valid centre, writing into a new FLOAT raster
fn apply<F>(input: &Raster, progress: &mut ProgressReporter<'_>, mut cell: F) -> Result<Raster>
where
    F: FnMut(&Raster, isize, isize, f64) -> Option<f64>,
{
    let reflected = reflected(input);
    let source: &Raster = &reflected;
    let (rows, cols) = source.shape();
    let nodata = source.nodata();
    let mut output = source.derive(DataType::Float, nodata, nodata)?;
    output.set_preferred_palette("grey.pal");

    {
        let out = output.data_mut()?;
        for row in 0..rows {
            for col in 0..cols {
                let z = source.get(row as isize, col as isize);
                if source.is_nodata(z) {
                    continue;
                }
                if let Some(v) = cell(source, row as isize, col as isize, z) {
                    out[(row, col)] = v;
                }
            }
            progress.check_cancelled()?;
            progress.fraction(row + 1, rows);
        }
    }
    Ok(output)
}

/// Laplacian over a 3×3 or 5×5 kernel. NoData neighbours take the centre
/// value.
pub fn laplacian(
    input: &Raster,
    kernel: LaplacianKernel,
    progress: &mut ProgressReporter<'_>,
) -> Result<Raster> {
    let weights = kernel.weights();
    let size = kernel.size() as isize;
    let half = size / 2;
    progress.set_label("Laplacian");
    apply(input, progress, |src, row, col, z| {
        let mut sum = 0.0;
        for (i, w) in weights.iter().enumerate() {
            let dr = i as isize / size - half;
            let dc = i as isize % size - half;
            let v = src.get(row + dr, col + dc);
            sum += w * if src.is_nodata(v) { z } else { v };
        }
        Some(sum)
    })
}

/// Deviation of each cell from the mean of its neighbours in a
/// `(2 * radius + 1)` square window, in units of their standard deviation.
///
/// Gives NoData where fewer than two neighbours are valid or the neighbours
/// have no variance.
pub fn deviation_from_mean(
    input: &Raster,
    radius: usize,
    progress: &mut ProgressReporter<'_>,
) -> Result<Raster> {
    if radius == 0 {
        return Err(Error::InvalidParameter {
            name: "radius",
            value: radius.to_string(),
            reason: "must be at least 1".into(),
        });
    }
    let r = radius as isize;
    progress.set_label("Deviation from mean");
    apply(input, progress, |src, row, col, z| {
        // Welford accumulation; DEM values are large next to local relief
        let (mut n, mut mean, mut m2) = (0usize, 0.0, 0.0);
        for dr in -r..=r {
            for dc in -r..=r {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let v = src.get(row + dr, col + dc);
                if !src.is_nodata(v) {
                    n += 1;
                    let delta = v - mean;
                    mean += delta / n as f64;
                    m2 += delta * (v - mean);
                }
            }
        }
        if n < 2 {
            return None;
        }
        let variance = m2 / n as f64;
        (variance > 0.0).then(|| (z - mean) / variance.sqrt())
    })
}

/// Mean of the valid cells on the ring at `radius`. NoData where the whole
/// ring is NoData.
pub fn ring_mean(
    input: &Raster,
    radius: usize,
    progress: &mut ProgressReporter<'_>,
) -> Result<Raster> {
    if radius == 0 {
        return Err(Error::InvalidParameter {
            name: "radius",
            value: radius.to_string(),
            reason: "must be at least 1".into(),
        });
    }
    let mut cache = OffsetCache::new();
    let ring = cache.ring(radius).clone();
    progress.set_label("Ring mean");
    apply(input, progress, |src, row, col, _| {
        let (n, sum) = ring
            .offsets()
            .iter()
            .map(|&(dr, dc)| src.get(row + dr, col + dc))
            .filter(|&v| !src.is_nodata(v))
            .fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
        (n > 0).then(|| sum / n as f64)
    })
}

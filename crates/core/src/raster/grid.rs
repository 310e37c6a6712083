//! Main Raster type

use crate::error::{Error, Result};
use crate::io::native;
use crate::raster::{DataScale, DataType, Extent, RasterHeader};
use ndarray::{Array2, ArrayView1, ArrayView2};
use std::cell::OnceCell;
use std::path::{Path, PathBuf};

/// What `get` returns for coordinates outside the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgePolicy {
    /// Out-of-range cells read as the NoData value
    #[default]
    NoData,
    /// Out-of-range coordinates mirror back across the nearest edge
    /// (`-1` reads row `0`, `rows` reads row `rows - 1`)
    Reflect,
}

/// Whether a raster may be modified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    ReadOnly,
    #[default]
    ReadWrite,
}

/// A georeferenced grid of `f64` cells with a NoData sentinel.
///
/// Cells are held in memory; a raster opened from or created at a path is
/// written back on [`Raster::flush`] or [`Raster::close`], quantized to its
/// header's data type.
///
/// # Example
///
/// ```ignore
/// use terrabox_core::Raster;
///
/// let mut raster = Raster::new(100, 100);
/// raster.set(10, 20, 42.0)?;
/// assert_eq!(raster.get(10, 20), 42.0);
/// assert_eq!(raster.get(-1, 20), raster.nodata());
/// ```
#[derive(Debug)]
pub struct Raster {
    data: Array2<f64>,
    header: RasterHeader,
    edge_policy: EdgePolicy,
    access: Access,
    /// Header file backing this raster, if any
    path: Option<PathBuf>,
    temporary: bool,
    dirty: bool,
    /// Cached (min, max); not invalidated by writes
    extrema: OnceCell<(f64, f64)>,
}

/// Allocate a grid without aborting on allocation failure.
pub fn try_filled_vec<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::ResourceExhausted { cells: len })?;
    buf.resize(len, value);
    Ok(buf)
}

pub(crate) fn allocate(rows: usize, cols: usize, fill: f64) -> Result<Array2<f64>> {
    let cells = rows
        .checked_mul(cols)
        .ok_or(Error::ResourceExhausted { cells: usize::MAX })?;
    let buf = try_filled_vec(cells, fill)?;
    Array2::from_shape_vec((rows, cols), buf).map_err(|e| Error::Other(e.to_string()))
}

fn reflect(i: isize, n: usize) -> isize {
    let n = n as isize;
    if i < 0 {
        -i - 1
    } else if i >= n {
        2 * n - i - 1
    } else {
        i
    }
}

impl Raster {
    /// Create an in-memory raster of zeros with unit cells and `DOUBLE` type
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create an in-memory raster from row-major values
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions { rows, cols });
        }
        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self::from_array(array))
    }

    /// Create an in-memory raster from an ndarray
    pub fn from_array(data: Array2<f64>) -> Self {
        let (rows, cols) = data.dim();
        let mut header = RasterHeader::new(rows, cols, Extent::from_origin(rows, cols, 1.0));
        header.data_type = DataType::Double;
        Self::assemble(data, header)
    }

    /// Create an in-memory raster described by `header`, every cell set to
    /// `initial`.
    pub fn from_header(header: RasterHeader, initial: f64) -> Result<Self> {
        header.validate()?;
        let data = allocate(header.rows, header.cols, initial)?;
        Ok(Self::assemble(data, header))
    }

    /// Pair existing cells with a header of the same shape
    pub fn with_header(data: Array2<f64>, header: RasterHeader) -> Result<Self> {
        let (rows, cols) = data.dim();
        if (rows, cols) != (header.rows, header.cols) {
            return Err(Error::SizeMismatch {
                er: header.rows,
                ec: header.cols,
                ar: rows,
                ac: cols,
            });
        }
        Ok(Self::assemble(data, header))
    }

    fn assemble(data: Array2<f64>, header: RasterHeader) -> Self {
        Self {
            data,
            header,
            edge_policy: EdgePolicy::NoData,
            access: Access::ReadWrite,
            path: None,
            temporary: false,
            dirty: false,
            extrema: OnceCell::new(),
        }
    }

    /// In-memory raster with the same header, filled with `fill`
    pub fn like(&self, fill: f64) -> Result<Self> {
        let mut header = self.header.clone();
        header.min = f64::INFINITY;
        header.max = f64::NEG_INFINITY;
        let mut out = Self::assemble(allocate(self.rows(), self.cols(), fill)?, header);
        out.edge_policy = self.edge_policy;
        Ok(out)
    }

    /// In-memory raster shaped like `self` with a new data type and NoData
    /// value, filled with `fill`.
    pub fn derive(&self, data_type: DataType, nodata: f64, fill: f64) -> Result<Self> {
        Self::from_header(self.header.derive(data_type, nodata), fill)
    }

    /// Open a persisted raster. `path` may name the header, the payload or
    /// their common stem.
    pub fn open<P: AsRef<Path>>(path: P, access: Access) -> Result<Self> {
        let header_path = native::header_path(path.as_ref());
        let header = native::read_header(&header_path)?;
        header.validate()?;
        let data = native::read_payload(&native::data_path(&header_path), &header)?;

        tracing::info!(
            "Opened {} ({} x {}, {})",
            header_path.display(),
            header.rows,
            header.cols,
            header.data_type
        );

        let known = header.min.is_finite() && header.max.is_finite();
        let (min, max) = (header.min, header.max);
        let mut raster = Self::assemble(data, header);
        if known {
            let _ = raster.extrema.set((min, max));
        }
        raster.access = access;
        raster.path = Some(header_path);
        Ok(raster)
    }

    /// Create a new persisted raster, replacing any existing files at `path`.
    pub fn create<P: AsRef<Path>>(path: P, header: RasterHeader, initial: f64) -> Result<Self> {
        let header_path = native::header_path(path.as_ref());
        remove_files(&header_path)?;
        let mut raster = Self::from_header(header, initial)?;
        raster.path = Some(header_path);
        raster.dirty = true;
        raster.flush()?;
        tracing::info!(
            "Created {} ({} x {})",
            raster.name(),
            raster.rows(),
            raster.cols()
        );
        Ok(raster)
    }

    /// Create a persisted raster shaped like `base` with a new data type and
    /// NoData value.
    pub fn create_like<P: AsRef<Path>>(
        path: P,
        base: &RasterHeader,
        data_type: DataType,
        nodata: f64,
        initial: f64,
    ) -> Result<Self> {
        Self::create(path, base.derive(data_type, nodata), initial)
    }

    /// Write this raster to `path` and keep it attached there.
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let header_path = native::header_path(path.as_ref());
        remove_files(&header_path)?;
        self.path = Some(header_path);
        self.access = Access::ReadWrite;
        self.dirty = true;
        self.flush()
    }

    // Dimensions

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether (row, col) addresses an interior cell
    pub fn in_bounds(&self, row: isize, col: isize) -> bool {
        self.index(row, col).is_some()
    }

    fn index(&self, row: isize, col: isize) -> Option<(usize, usize)> {
        if row < 0 || col < 0 {
            return None;
        }
        let (r, c) = (row as usize, col as usize);
        (r < self.rows() && c < self.cols()).then_some((r, c))
    }

    // Data access

    /// Value at (row, col). Coordinates outside the grid resolve through the
    /// edge policy and never fail.
    pub fn get(&self, row: isize, col: isize) -> f64 {
        let (r, c) = match self.edge_policy {
            EdgePolicy::NoData => (row, col),
            EdgePolicy::Reflect => (reflect(row, self.rows()), reflect(col, self.cols())),
        };
        self.index(r, c)
            .map_or(self.header.nodata, |ix| self.data[ix])
    }

    /// Set the value at (row, col). Writes outside the grid are ignored.
    pub fn set(&mut self, row: isize, col: isize, value: f64) -> Result<()> {
        self.ensure_writable()?;
        if let Some(ix) = self.index(row, col) {
            self.data[ix] = value;
            self.dirty = true;
        }
        Ok(())
    }

    /// Add `dv` to the cell at (row, col)
    pub fn increment(&mut self, row: isize, col: isize, dv: f64) -> Result<()> {
        self.ensure_writable()?;
        if let Some(ix) = self.index(row, col) {
            self.data[ix] += dv;
            self.dirty = true;
        }
        Ok(())
    }

    /// Subtract `dv` from the cell at (row, col)
    pub fn decrement(&mut self, row: isize, col: isize, dv: f64) -> Result<()> {
        self.increment(row, col, -dv)
    }

    /// Borrow an interior scan-line
    pub fn row(&self, row: usize) -> Result<ArrayView1<'_, f64>> {
        if row >= self.rows() {
            return Err(Error::IndexOutOfBounds {
                row: row as isize,
                col: 0,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        Ok(self.data.row(row))
    }

    /// Copy of a full scan-line. Rows outside the grid follow the edge
    /// policy.
    pub fn row_values(&self, row: isize) -> Vec<f64> {
        let r = match self.edge_policy {
            EdgePolicy::NoData => row,
            EdgePolicy::Reflect => reflect(row, self.rows()),
        };
        match self.index(r, 0) {
            Some((r, _)) => self.data.row(r).to_vec(),
            None => vec![self.header.nodata; self.cols()],
        }
    }

    /// Replace a full scan-line. Rows outside the grid are ignored.
    pub fn set_row_values(&mut self, row: isize, values: &[f64]) -> Result<()> {
        self.ensure_writable()?;
        if values.len() != self.cols() {
            return Err(Error::SizeMismatch {
                er: 1,
                ec: self.cols(),
                ar: 1,
                ac: values.len(),
            });
        }
        if let Some((r, _)) = self.index(row, 0) {
            self.data
                .row_mut(r)
                .iter_mut()
                .zip(values)
                .for_each(|(cell, &v)| *cell = v);
            self.dirty = true;
        }
        Ok(())
    }

    /// Set every cell to `value`
    pub fn fill(&mut self, value: f64) -> Result<()> {
        self.ensure_writable()?;
        self.data.fill(value);
        self.dirty = true;
        Ok(())
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Mutable access to all cells, for whole-grid passes
    pub fn data_mut(&mut self) -> Result<&mut Array2<f64>> {
        self.ensure_writable()?;
        self.dirty = true;
        Ok(&mut self.data)
    }

    pub fn into_array(mut self) -> Array2<f64> {
        std::mem::take(&mut self.data)
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.access {
            Access::ReadWrite => Ok(()),
            Access::ReadOnly => Err(Error::ReadOnly(self.name())),
        }
    }

    // Metadata

    pub fn header(&self) -> &RasterHeader {
        &self.header
    }

    pub fn nodata(&self) -> f64 {
        self.header.nodata
    }

    pub fn data_type(&self) -> DataType {
        self.header.data_type
    }

    pub fn data_scale(&self) -> DataScale {
        self.header.data_scale
    }

    pub fn set_data_scale(&mut self, scale: DataScale) {
        self.header.data_scale = scale;
        self.dirty = true;
    }

    pub fn set_preferred_palette(&mut self, palette: &str) {
        self.header.preferred_palette = palette.to_string();
        self.dirty = true;
    }

    pub fn set_z_units(&mut self, units: &str) {
        self.header.z_units = units.to_lowercase();
        self.dirty = true;
    }

    pub fn add_metadata_entry(&mut self, entry: &str) {
        self.header.metadata.push(entry.to_string());
        self.dirty = true;
    }

    pub fn extent(&self) -> &Extent {
        &self.header.extent
    }

    pub fn cell_size_x(&self) -> f64 {
        self.header.cell_size_x()
    }

    pub fn cell_size_y(&self) -> f64 {
        self.header.cell_size_y()
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        self.edge_policy
    }

    pub fn set_edge_policy(&mut self, policy: EdgePolicy) {
        self.edge_policy = policy;
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Mark the backing files for deletion when the raster is closed or
    /// dropped.
    pub fn set_temporary(&mut self, temporary: bool) {
        self.temporary = temporary;
    }

    /// Short name for messages: the file stem, or `<memory>`
    pub fn name(&self) -> String {
        self.path
            .as_deref()
            .and_then(Path::file_stem)
            .map_or_else(|| "<memory>".to_string(), |s| s.to_string_lossy().into_owned())
    }

    // Coordinate conversion

    pub fn x_from_column(&self, col: isize) -> f64 {
        self.header.extent.x_from_column(col, self.cols())
    }

    pub fn y_from_row(&self, row: isize) -> f64 {
        self.header.extent.y_from_row(row, self.rows())
    }

    pub fn column_from_x(&self, x: f64) -> isize {
        self.header.extent.column_from_x(x, self.cols())
    }

    pub fn row_from_y(&self, y: f64) -> isize {
        self.header.extent.row_from_y(y, self.rows())
    }

    // Value checks

    /// NaN cells count as NoData regardless of the sentinel
    pub fn is_nodata(&self, value: f64) -> bool {
        value == self.header.nodata || value.is_nan()
    }

    pub fn is_nodata_at(&self, row: isize, col: isize) -> bool {
        self.is_nodata(self.get(row, col))
    }

    /// Fail unless `other` has the same number of rows and columns
    pub fn check_same_grid(&self, other: &Raster) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::SizeMismatch {
                er: self.rows(),
                ec: self.cols(),
                ar: other.rows(),
                ac: other.cols(),
            });
        }
        Ok(())
    }

    /// Whether any valid cell has a fractional part above 0.001
    pub fn contains_fractional_data(&self) -> bool {
        if self.header.data_type.is_integral() {
            return false;
        }
        self.data
            .iter()
            .any(|&v| !self.is_nodata(v) && (v - v.round()).abs() > 0.001)
    }

    // Extrema

    /// Smallest valid value, scanned on first use and then cached.
    /// Returns NoData when the grid has no valid cells.
    pub fn minimum_value(&self) -> f64 {
        self.cached_extrema().0
    }

    /// Largest valid value; see [`Raster::minimum_value`].
    pub fn maximum_value(&self) -> f64 {
        self.cached_extrema().1
    }

    /// Drop the cached extrema and scan the grid again
    pub fn rescan_extrema(&mut self) -> (f64, f64) {
        self.extrema = OnceCell::new();
        self.cached_extrema()
    }

    fn cached_extrema(&self) -> (f64, f64) {
        *self.extrema.get_or_init(|| self.scan_extrema())
    }

    fn scan_extrema(&self) -> (f64, f64) {
        let (min, max) = self
            .data
            .iter()
            .filter(|&&v| !self.is_nodata(v))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if min > max {
            (self.header.nodata, self.header.nodata)
        } else {
            (min, max)
        }
    }

    // Statistics

    /// Min, max, mean and standard deviation of the valid cells, computed
    /// fresh on every call.
    pub fn statistics(&self) -> RasterStatistics {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }
            min = min.min(value);
            max = max.max(value);
            sum += value;
            sum_sq += value * value;
            count += 1;
        }

        let (min, max, mean, std_dev) = if count > 0 {
            let n = count as f64;
            let mean = sum / n;
            let variance = (sum_sq / n - mean * mean).max(0.0);
            (Some(min), Some(max), Some(mean), Some(variance.sqrt()))
        } else {
            (None, None, None, None)
        };

        RasterStatistics {
            min,
            max,
            mean,
            std_dev,
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }

    // Lifecycle

    /// Write pending changes to the backing files. The header's value range
    /// is recomputed first. In-memory and read-only rasters are untouched.
    pub fn flush(&mut self) -> Result<()> {
        if self.access == Access::ReadOnly || !self.dirty {
            return Ok(());
        }
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        let (min, max) = self.rescan_extrema();
        if !self.is_nodata(min) || !self.is_nodata(max) {
            self.header.set_value_range(min, max);
        }
        native::write_header(&path, &self.header)?;
        native::write_payload(&native::data_path(&path), &self.header, &self.data)?;
        self.dirty = false;
        tracing::debug!("Flushed {}", path.display());
        Ok(())
    }

    /// Finish with the raster: temporary files are deleted, anything else
    /// writable is flushed.
    pub fn close(mut self) -> Result<()> {
        if self.temporary {
            if let Some(path) = self.path.take() {
                remove_files(&path)?;
                tracing::debug!("Removed temporary raster {}", path.display());
            }
            return Ok(());
        }
        self.flush()?;
        if let Some(path) = &self.path {
            tracing::info!("Closed {}", path.display());
        }
        Ok(())
    }
}

/// Clones are detached in-memory copies: no backing path, not temporary,
/// writable.
impl Clone for Raster {
    fn clone(&self) -> Self {
        let mut out = Self::assemble(self.data.clone(), self.header.clone());
        out.edge_policy = self.edge_policy;
        out.extrema = self.extrema.clone();
        out
    }
}

impl Drop for Raster {
    fn drop(&mut self) {
        if !self.temporary {
            return;
        }
        if let Some(path) = self.path.take() {
            if let Err(e) = remove_files(&path) {
                tracing::warn!(
                    "Failed to remove temporary raster {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}

fn remove_files(header_path: &Path) -> std::io::Result<()> {
    for path in [header_path.to_path_buf(), native::data_path(header_path)] {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Summary of the valid cells of a raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

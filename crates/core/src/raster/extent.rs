//! Geographic extent of a north-up raster

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Bounding edges of a north-up raster grid.
///
/// Converts between cell indices (row, col) and geographic coordinates of
/// cell centres:
/// ```text
/// x = west  + (col + 0.5) * cell_size_x
/// y = north - (row + 0.5) * cell_size_y
/// ```
/// where `cell_size_x = (east - west) / cols` and
/// `cell_size_y = (north - south) / rows`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Extent {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Extent of a grid whose lower-left corner is at the origin, with
    /// square cells of the given size.
    pub fn from_origin(rows: usize, cols: usize, cell_size: f64) -> Self {
        Self::new(rows as f64 * cell_size, 0.0, cols as f64 * cell_size, 0.0)
    }

    /// Require north > south and east > west.
    pub fn validate(&self) -> Result<()> {
        let ordered = self.north > self.south && self.east > self.west;
        if !ordered || !self.north.is_finite() || !self.east.is_finite() {
            return Err(Error::InvalidExtent {
                north: self.north,
                south: self.south,
                east: self.east,
                west: self.west,
            });
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Cell size in the X direction for a grid of `cols` columns
    pub fn cell_size_x(&self, cols: usize) -> f64 {
        if cols == 0 {
            return 0.0;
        }
        self.width() / cols as f64
    }

    /// Cell size in the Y direction for a grid of `rows` rows
    pub fn cell_size_y(&self, rows: usize) -> f64 {
        if rows == 0 {
            return 0.0;
        }
        self.height() / rows as f64
    }

    /// X coordinate of the centre of `col`. Columns outside the grid
    /// extrapolate linearly.
    pub fn x_from_column(&self, col: isize, cols: usize) -> f64 {
        let cs = self.cell_size_x(cols);
        self.west + (col as f64 + 0.5) * cs
    }

    /// Y coordinate of the centre of `row`. Rows outside the grid
    /// extrapolate linearly.
    pub fn y_from_row(&self, row: isize, rows: usize) -> f64 {
        let cs = self.cell_size_y(rows);
        self.north - (row as f64 + 0.5) * cs
    }

    /// Column containing `x`; may be negative or >= cols for points outside.
    pub fn column_from_x(&self, x: f64, cols: usize) -> isize {
        let cs = self.cell_size_x(cols);
        if cs <= 0.0 {
            return -1;
        }
        ((x - self.west) / cs).floor() as isize
    }

    /// Row containing `y`; may be negative or >= rows for points outside.
    pub fn row_from_y(&self, y: f64, rows: usize) -> isize {
        let cs = self.cell_size_y(rows);
        if cs <= 0.0 {
            return -1;
        }
        ((self.north - y) / cs).floor() as isize
    }

    /// Whether the point lies inside the extent (edges inclusive)
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.west && x <= self.east && y >= self.south && y <= self.north
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::new(1.0, 0.0, 1.0, 0.0)
    }
}

//! Raster metadata header (`.dep` text file)

use crate::error::{Error, Result};
use crate::raster::{ByteOrder, DataScale, DataType, Extent};
use serde::{Deserialize, Serialize};
use std::fmt;

/// NoData sentinel used when a header does not declare one
pub const DEFAULT_NODATA: f64 = -32768.0;

/// Placeholder for units and projection when none is known
pub const NOT_SPECIFIED: &str = "not specified";

/// Palette hint used when a header does not declare one
pub const DEFAULT_PALETTE: &str = "grey.pal";

const ROWS: &str = "Rows";
const COLS: &str = "Cols";
const NORTH: &str = "North";
const SOUTH: &str = "South";
const EAST: &str = "East";
const WEST: &str = "West";
const NODATA: &str = "NoData";

/// Persisted description of a raster: extent, dimensions, cell type and
/// display hints. The cell payload lives in a separate file.
///
/// `min`/`max` are `+inf`/`-inf` until the payload has been scanned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterHeader {
    pub rows: usize,
    pub cols: usize,
    pub extent: Extent,
    pub data_type: DataType,
    pub data_scale: DataScale,
    pub nodata: f64,
    pub min: f64,
    pub max: f64,
    pub display_min: f64,
    pub display_max: f64,
    pub z_units: String,
    pub xy_units: String,
    pub projection: String,
    pub preferred_palette: String,
    pub byte_order: ByteOrder,
    pub metadata: Vec<String>,
}

impl RasterHeader {
    /// Header with default type, scale and NoData for the given grid shape
    pub fn new(rows: usize, cols: usize, extent: Extent) -> Self {
        Self {
            rows,
            cols,
            extent,
            data_type: DataType::default(),
            data_scale: DataScale::default(),
            nodata: DEFAULT_NODATA,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            display_min: f64::INFINITY,
            display_max: f64::NEG_INFINITY,
            z_units: NOT_SPECIFIED.to_string(),
            xy_units: NOT_SPECIFIED.to_string(),
            projection: NOT_SPECIFIED.to_string(),
            preferred_palette: DEFAULT_PALETTE.to_string(),
            byte_order: ByteOrder::default(),
            metadata: Vec::new(),
        }
    }

    /// Header for an output grid shaped like `self`.
    ///
    /// Extent, dimensions, scale, horizontal units, projection and palette
    /// carry over; the data type and NoData value are replaced and the value
    /// range is reset.
    pub fn derive(&self, data_type: DataType, nodata: f64) -> Self {
        let mut out = Self::new(self.rows, self.cols, self.extent);
        out.data_type = data_type;
        out.data_scale = self.data_scale;
        out.nodata = nodata;
        out.xy_units = self.xy_units.clone();
        out.projection = self.projection.clone();
        out.preferred_palette = self.preferred_palette.clone();
        out.byte_order = self.byte_order;
        if !data_type.can_represent(nodata) {
            tracing::warn!(
                "NoData value {} cannot be stored exactly as {}",
                nodata,
                data_type
            );
        }
        out
    }

    /// Cell count, or an error when `rows × cols` does not fit in memory
    /// addressing
    pub fn num_cells(&self) -> Result<usize> {
        self.rows
            .checked_mul(self.cols)
            .ok_or_else(|| Error::MalformedHeader {
                field: "Rows",
                value: format!("{} x {}", self.rows, self.cols),
            })
    }

    pub fn cell_size_x(&self) -> f64 {
        self.extent.cell_size_x(self.cols)
    }

    pub fn cell_size_y(&self) -> f64 {
        self.extent.cell_size_y(self.rows)
    }

    /// Mean of the two cell sizes
    pub fn resolution(&self) -> f64 {
        (self.cell_size_x() + self.cell_size_y()) / 2.0
    }

    /// Check the extent ordering. A NoData value the data type cannot hold
    /// only produces a warning.
    pub fn validate(&self) -> Result<()> {
        self.extent.validate()?;
        if !self.data_type.can_represent(self.nodata) {
            tracing::warn!(
                "NoData value {} is not representable as {}",
                self.nodata,
                self.data_type
            );
        }
        Ok(())
    }

    /// Compare a declared resolution against the one implied by the extent
    /// and dimensions. `tolerance` is relative.
    pub fn check_cell_size(&self, cell_x: f64, cell_y: f64, tolerance: f64) -> Result<()> {
        let actual_x = self.cell_size_x();
        let actual_y = self.cell_size_y();
        let off = |declared: f64, actual: f64| {
            if actual == 0.0 {
                declared != 0.0
            } else {
                ((declared - actual) / actual).abs() > tolerance
            }
        };
        if off(cell_x, actual_x) || off(cell_y, actual_y) {
            tracing::warn!(
                "declared cell size ({}, {}) disagrees with extent ({}, {})",
                cell_x,
                cell_y,
                actual_x,
                actual_y
            );
            return Err(Error::CellSizeMismatch {
                declared_x: cell_x,
                declared_y: cell_y,
                actual_x,
                actual_y,
            });
        }
        Ok(())
    }

    /// Record a freshly scanned value range. Display bounds follow it when
    /// unset or degenerate.
    pub fn set_value_range(&mut self, min: f64, max: f64) {
        self.min = min;
        self.max = max;
        let unset = !self.display_min.is_finite() || !self.display_max.is_finite();
        if unset || self.display_max <= self.display_min {
            self.display_min = min;
            self.display_max = max;
        }
    }

    /// Parse the text form of a header.
    ///
    /// Keys are matched case-insensitively and unknown keys are skipped.
    /// Rows, columns and the four edges are required.
    pub fn parse(text: &str) -> Result<Self> {
        let mut rows = None;
        let mut cols = None;
        let mut north = None;
        let mut south = None;
        let mut east = None;
        let mut west = None;
        let mut header = Self::new(0, 0, Extent::default());

        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_lowercase().as_str() {
                "rows" => rows = Some(parse_count(ROWS, value)?),
                "cols" => cols = Some(parse_count(COLS, value)?),
                "north" => north = Some(parse_number(NORTH, value)?),
                "south" => south = Some(parse_number(SOUTH, value)?),
                "east" => east = Some(parse_number(EAST, value)?),
                "west" => west = Some(parse_number(WEST, value)?),
                "nodata" => header.nodata = parse_number(NODATA, value)?,
                "min" => header.min = parse_optional(value, header.min),
                "max" => header.max = parse_optional(value, header.max),
                "display min" => header.display_min = parse_optional(value, header.display_min),
                "display max" => header.display_max = parse_optional(value, header.display_max),
                "data type" => {
                    header.data_type = DataType::parse(value)
                        .ok_or_else(|| Error::UnsupportedDataType(value.to_string()))?;
                }
                "data scale" => {
                    header.data_scale = DataScale::parse(value).unwrap_or_default();
                }
                "z units" => header.z_units = value.to_lowercase(),
                "xy units" => header.xy_units = value.to_lowercase(),
                "projection" => header.projection = value.to_string(),
                "preferred palette" => {
                    header.preferred_palette = value.replace(".plt", ".pal");
                }
                "byte order" => header.byte_order = ByteOrder::parse(value),
                "metadata entry" => header.metadata.push(value.replace(';', ":")),
                other => tracing::debug!("ignoring header key '{}'", other),
            }
        }

        header.rows = rows.ok_or(Error::MissingHeaderField(ROWS))?;
        header.cols = cols.ok_or(Error::MissingHeaderField(COLS))?;
        header.extent = Extent::new(
            north.ok_or(Error::MissingHeaderField(NORTH))?,
            south.ok_or(Error::MissingHeaderField(SOUTH))?,
            east.ok_or(Error::MissingHeaderField(EAST))?,
            west.ok_or(Error::MissingHeaderField(WEST))?,
        );
        if header.min.is_finite() && header.max.is_finite() {
            let (min, max) = (header.min, header.max);
            header.set_value_range(min, max);
        }
        Ok(header)
    }

    /// Serialize to the text form read by [`RasterHeader::parse`].
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RasterHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Min:\t{}", HeaderNumber(self.min))?;
        writeln!(f, "Max:\t{}", HeaderNumber(self.max))?;
        writeln!(f, "North:\t{:?}", self.extent.north)?;
        writeln!(f, "South:\t{:?}", self.extent.south)?;
        writeln!(f, "East:\t{:?}", self.extent.east)?;
        writeln!(f, "West:\t{:?}", self.extent.west)?;
        writeln!(f, "Cols:\t{}", self.cols)?;
        writeln!(f, "Rows:\t{}", self.rows)?;
        writeln!(f, "Data Type:\t{}", self.data_type)?;
        writeln!(f, "Z Units:\t{}", self.z_units)?;
        writeln!(f, "XY Units:\t{}", self.xy_units)?;
        writeln!(f, "Projection:\t{}", self.projection)?;
        writeln!(f, "Data Scale:\t{}", self.data_scale)?;
        writeln!(f, "Display Min:\t{}", HeaderNumber(self.display_min))?;
        writeln!(f, "Display Max:\t{}", HeaderNumber(self.display_max))?;
        writeln!(f, "Preferred Palette:\t{}", self.preferred_palette)?;
        writeln!(f, "NoData:\t{}", HeaderNumber(self.nodata))?;
        writeln!(f, "Byte Order:\t{}", self.byte_order)?;
        for entry in &self.metadata {
            writeln!(f, "Metadata Entry:\t{}", entry.replace(':', ";"))?;
        }
        Ok(())
    }
}

/// Header number text. Non-finite values use the `Infinity`/`NaN` spelling
/// that other `.dep` readers accept.
struct HeaderNumber(f64);

impl fmt::Display for HeaderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            v if v.is_nan() => f.write_str("NaN"),
            v if v == f64::INFINITY => f.write_str("Infinity"),
            v if v == f64::NEG_INFINITY => f.write_str("-Infinity"),
            v => write!(f, "{:?}", v),
        }
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| Error::MalformedHeader {
        field,
        value: value.to_string(),
    })
}

fn parse_count(field: &'static str, value: &str) -> Result<usize> {
    if let Ok(n) = value.parse::<usize>() {
        return Ok(n);
    }
    // some writers emit counts as floats, e.g. "512.0"
    match value.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        _ => Err(Error::MalformedHeader {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_optional(value: &str, fallback: f64) -> f64 {
    value.parse::<f64>().unwrap_or_else(|_| {
        tracing::warn!("unparsable header value '{}', keeping {}", value, fallback);
        fallback
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Min:\t1.5\n\
        Max:\t99.25\n\
        North:\t4800.0\n\
        South:\t4700.0\n\
        East:\t600.0\n\
        West:\t500.0\n\
        Cols:\t50\n\
        Rows:\t25\n\
        Data Type:\tINTEGER\n\
        Z Units:\tMetres\n\
        XY Units:\tmetres\n\
        Projection:\tUTM zone 17\n\
        Data Scale:\tcategorical\n\
        Preferred Palette:\tspectrum.plt\n\
        NoData:\t-9999\n\
        Byte Order:\tBIG_ENDIAN\n\
        Metadata Entry:\tcreated by; clump\n";

    #[test]
    fn test_parse_sample() {
        let h = RasterHeader::parse(SAMPLE).unwrap();
        assert_eq!((h.rows, h.cols), (25, 50));
        assert_eq!(h.extent, Extent::new(4800.0, 4700.0, 600.0, 500.0));
        assert_eq!(h.data_type, DataType::Integer);
        assert_eq!(h.data_scale, DataScale::Categorical);
        assert_eq!(h.byte_order, ByteOrder::BigEndian);
        assert_eq!(h.nodata, -9999.0);
        assert_eq!(h.z_units, "metres");
        assert_eq!(h.preferred_palette, "spectrum.pal");
        assert_eq!(h.metadata, vec!["created by: clump".to_string()]);
        assert_eq!((h.min, h.max), (1.5, 99.25));
        assert_eq!((h.display_min, h.display_max), (1.5, 99.25));
        assert_eq!(h.cell_size_x(), 2.0);
        assert_eq!(h.cell_size_y(), 4.0);
    }

    #[test]
    fn test_text_roundtrip() {
        let mut h = RasterHeader::new(3, 7, Extent::new(1.0, -2.5, 0.7, 0.1));
        h.nodata = 0.1;
        h.data_type = DataType::Double;
        h.metadata.push("a: b".into());
        h.set_value_range(-3.25, 1e-7);
        let parsed = RasterHeader::parse(&h.to_text()).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn test_non_finite_numbers_use_portable_spelling() {
        let h = RasterHeader::new(2, 2, Extent::from_origin(2, 2, 1.0));
        let text = h.to_text();
        assert!(text.starts_with("Min:\tInfinity\nMax:\t-Infinity\n"));
        assert!(text.contains("NoData:\t-32768.0\n"));
        let parsed = RasterHeader::parse(&text).unwrap();
        assert_eq!(parsed.min, f64::INFINITY);
        assert_eq!(parsed.display_max, f64::NEG_INFINITY);
    }

    #[test]
    fn test_missing_mandatory_field() {
        let text = SAMPLE.replace("Rows:\t25\n", "");
        assert!(matches!(
            RasterHeader::parse(&text),
            Err(Error::MissingHeaderField("Rows"))
        ));
    }

    #[test]
    fn test_malformed_field() {
        let text = SAMPLE.replace("North:\t4800.0", "North:\tabc");
        assert!(matches!(
            RasterHeader::parse(&text),
            Err(Error::MalformedHeader { field: "North", .. })
        ));
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let h = RasterHeader::parse("Rows:\t2\nCols:\t2\nNorth:\t2\nSouth:\t0\nEast:\t2\nWest:\t0\n")
            .unwrap();
        assert_eq!(h.data_type, DataType::Float);
        assert_eq!(h.data_scale, DataScale::Continuous);
        assert_eq!(h.nodata, DEFAULT_NODATA);
        assert_eq!(h.byte_order, ByteOrder::LittleEndian);
        assert_eq!(h.xy_units, NOT_SPECIFIED);
    }

    #[test]
    fn test_derive_overrides_type_and_nodata() {
        let base = RasterHeader::parse(SAMPLE).unwrap();
        let out = base.derive(DataType::Double, -1.0);
        assert_eq!(out.extent, base.extent);
        assert_eq!((out.rows, out.cols), (base.rows, base.cols));
        assert_eq!(out.data_type, DataType::Double);
        assert_eq!(out.nodata, -1.0);
        assert_eq!(out.projection, base.projection);
        assert_eq!(out.data_scale, base.data_scale);
        assert_eq!(out.min, f64::INFINITY);
        assert!(out.metadata.is_empty());
    }

    #[test]
    fn test_check_cell_size() {
        let h = RasterHeader::parse(SAMPLE).unwrap();
        assert!(h.check_cell_size(2.0, 4.0, 1e-6).is_ok());
        assert!(matches!(
            h.check_cell_size(2.5, 4.0, 1e-6),
            Err(Error::CellSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_extent() {
        let h = RasterHeader::new(2, 2, Extent::new(0.0, 10.0, 5.0, 0.0));
        assert!(matches!(h.validate(), Err(Error::InvalidExtent { .. })));
    }
}

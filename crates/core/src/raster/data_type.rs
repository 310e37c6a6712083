//! Storage types, data scales and byte orders of persisted rasters

use serde::{Deserialize, Serialize};
use std::fmt;

/// On-disk cell type of a raster payload.
///
/// Cells are always `f64` in memory; the data type only decides how they are
/// quantized when the payload is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit float
    Double,
    /// 32-bit float
    #[default]
    Float,
    /// 16-bit signed integer
    Integer,
    /// 8-bit unsigned integer
    Byte,
}

impl DataType {
    /// Size of one cell in the payload
    pub fn size_in_bytes(self) -> usize {
        match self {
            DataType::Double => 8,
            DataType::Float => 4,
            DataType::Integer => 2,
            DataType::Byte => 1,
        }
    }

    /// Whether values of this type have no fractional part
    pub fn is_integral(self) -> bool {
        matches!(self, DataType::Integer | DataType::Byte)
    }

    /// Name written to the `Data Type` header line
    pub fn header_name(self) -> &'static str {
        match self {
            DataType::Double => "DOUBLE",
            DataType::Float => "FLOAT",
            DataType::Integer => "INTEGER",
            DataType::Byte => "BYTE",
        }
    }

    /// Parse a `Data Type` header value. Matching is by substring,
    /// case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        let v = value.to_lowercase();
        if v.contains("double") {
            Some(DataType::Double)
        } else if v.contains("float") {
            Some(DataType::Float)
        } else if v.contains("integer") {
            Some(DataType::Integer)
        } else if v.contains("byte") {
            Some(DataType::Byte)
        } else {
            None
        }
    }

    /// Convert a value to the nearest one this type can store.
    ///
    /// Integral types round and saturate to their range. Values that cannot be
    /// represented at all (NaN) fall back to the NoData sentinel, or zero if the
    /// sentinel is not representable either.
    pub fn quantize(self, value: f64, nodata: f64) -> f64 {
        match self {
            DataType::Double => value,
            DataType::Float => value as f32 as f64,
            DataType::Integer => integral::<i16>(value, nodata),
            DataType::Byte => integral::<u8>(value, nodata),
        }
    }

    /// Whether `value` survives quantization unchanged
    pub fn can_represent(self, value: f64) -> bool {
        match self {
            DataType::Double => true,
            DataType::Float => value.is_nan() || (value as f32 as f64) == value,
            DataType::Integer => num_traits::cast::<f64, i16>(value)
                .map_or(false, |v| f64::from(v) == value),
            DataType::Byte => num_traits::cast::<f64, u8>(value)
                .map_or(false, |v| f64::from(v) == value),
        }
    }
}

fn integral<T>(value: f64, nodata: f64) -> f64
where
    T: num_traits::NumCast + num_traits::Bounded + Into<f64>,
{
    if value.is_nan() {
        return num_traits::cast::<f64, T>(nodata.round())
            .map_or(0.0, Into::into);
    }
    let lo: f64 = T::min_value().into();
    let hi: f64 = T::max_value().into();
    value.round().clamp(lo, hi)
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_name())
    }
}

/// Measurement scale of the cell values, used by hosts to pick a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataScale {
    #[default]
    Continuous,
    Categorical,
    Boolean,
    Rgb,
}

impl DataScale {
    pub fn header_name(self) -> &'static str {
        match self {
            DataScale::Continuous => "continuous",
            DataScale::Categorical => "categorical",
            DataScale::Boolean => "boolean",
            DataScale::Rgb => "rgb",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let v = value.to_lowercase();
        if v.contains("continuous") {
            Some(DataScale::Continuous)
        } else if v.contains("categorical") {
            Some(DataScale::Categorical)
        } else if v.contains("bool") {
            Some(DataScale::Boolean)
        } else if v.contains("rgb") {
            Some(DataScale::Rgb)
        } else {
            None
        }
    }
}

impl fmt::Display for DataScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_name())
    }
}

/// Byte order of the payload file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn header_name(self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "LITTLE_ENDIAN",
            ByteOrder::BigEndian => "BIG_ENDIAN",
        }
    }

    /// Anything mentioning little/lsb/least/intel is little-endian,
    /// everything else big-endian.
    pub fn parse(value: &str) -> Self {
        let v = value.to_lowercase();
        if v.contains("little") || v.contains("lsb") || v.contains("least") || v.contains("intel") {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_name())
    }
}

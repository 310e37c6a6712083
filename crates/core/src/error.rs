//! Error types for terrabox

use thiserror::Error;

/// Main error type for terrabox operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {rows} rows x {cols} cols")]
    InvalidDimensions { rows: usize, cols: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: isize,
        col: isize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Header is missing required field '{0}'")]
    MissingHeaderField(&'static str),

    #[error("Malformed header field '{field}': '{value}'")]
    MalformedHeader { field: &'static str, value: String },

    #[error("Invalid extent: north={north}, south={south}, east={east}, west={west}")]
    InvalidExtent {
        north: f64,
        south: f64,
        east: f64,
        west: f64,
    },

    #[error("Cell size mismatch: declared ({declared_x}, {declared_y}), extent implies ({actual_x}, {actual_y})")]
    CellSizeMismatch {
        declared_x: f64,
        declared_y: f64,
        actual_x: f64,
        actual_y: f64,
    },

    #[error("Payload size mismatch: expected {expected} bytes, found {actual}")]
    PayloadSize { expected: u64, actual: u64 },

    #[error("Raster '{0}' is opened read-only")]
    ReadOnly(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Not enough memory for a grid of {cells} cells")]
    ResourceExhausted { cells: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], used by plugin hosts to pick
/// what the user is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed arguments, mismatched input rasters
    Configuration,
    /// Grid too large for the available memory
    ResourceExhausted,
    /// Unreadable or corrupt raster files
    Io,
    /// The host requested cancellation
    Cancelled,
    /// Anything raised by an algorithm itself
    Algorithm,
}

impl Error {
    /// Classify this error for user-facing reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidDimensions { .. }
            | Error::IndexOutOfBounds { .. }
            | Error::SizeMismatch { .. }
            | Error::CellSizeMismatch { .. }
            | Error::ReadOnly(_)
            | Error::InvalidParameter { .. } => ErrorKind::Configuration,
            Error::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Error::Io(_)
            | Error::MissingHeaderField(_)
            | Error::MalformedHeader { .. }
            | Error::InvalidExtent { .. }
            | Error::PayloadSize { .. }
            | Error::UnsupportedDataType(_) => ErrorKind::Io,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Algorithm(_) | Error::Other(_) => ErrorKind::Algorithm,
        }
    }
}

/// Result type alias for terrabox operations
pub type Result<T> = std::result::Result<T, Error>;

//! Raster data structures and operations

mod data_type;
mod extent;
mod grid;
mod header;
mod neighborhood;

pub use data_type::{ByteOrder, DataScale, DataType};
pub use extent::Extent;
pub use grid::{try_filled_vec, Access, EdgePolicy, Raster, RasterStatistics};
pub(crate) use grid::allocate;
pub use header::{RasterHeader, DEFAULT_NODATA, DEFAULT_PALETTE, NOT_SPECIFIED};
pub use neighborhood::{backlink, Connectivity, Neighborhood, OffsetCache, RingOffsets};

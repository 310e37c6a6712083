//! Reading and writing persisted rasters

pub mod native;

pub use native::{
    data_path, decode_payload, encode_payload, header_path, read_header, read_raster,
    write_header, write_raster,
};

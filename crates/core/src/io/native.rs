//! Native `.dep`/`.tas` raster reading and writing
//!
//! A raster is persisted as a text header (`.dep`) next to a flat payload
//! (`.tas`) of row-major cells in the header's data type and byte order.

use crate::error::{Error, Result};
use crate::raster::{allocate, try_filled_vec, Access, ByteOrder, DataType, Raster, RasterHeader};
use byteorder::{BigEndian, LittleEndian};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Header file for a raster named by its header, payload or stem
pub fn header_path(path: &Path) -> PathBuf {
    path.with_extension("dep")
}

/// Payload file paired with a header file
pub fn data_path(path: &Path) -> PathBuf {
    path.with_extension("tas")
}

pub fn read_header(path: &Path) -> Result<RasterHeader> {
    let text = std::fs::read_to_string(path)?;
    RasterHeader::parse(&text)
}

pub fn write_header(path: &Path, header: &RasterHeader) -> Result<()> {
    std::fs::write(path, header.to_text())?;
    Ok(())
}

/// Read a payload file, checking its size against the header
pub fn read_payload(path: &Path, header: &RasterHeader) -> Result<Array2<f64>> {
    let expected = payload_len(header)? as u64;
    let actual = std::fs::metadata(path)?.len();
    if actual != expected {
        return Err(Error::PayloadSize { expected, actual });
    }

    let mut bytes = try_filled_vec(expected as usize, 0u8)?;
    File::open(path)?.read_exact(&mut bytes)?;

    let mut data = allocate(header.rows, header.cols, header.nodata)?;
    let cells = data
        .as_slice_mut()
        .ok_or_else(|| Error::Other("grid is not contiguous".into()))?;
    decode_into(&bytes, header, cells);
    Ok(data)
}

/// Write cells to a payload file, quantized to the header's data type
pub fn write_payload(path: &Path, header: &RasterHeader, data: &Array2<f64>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut buf = Vec::with_capacity(header.cols * header.data_type.size_in_bytes());
    for row in data.rows() {
        buf.clear();
        encode_into(row.iter().copied(), header, &mut buf);
        writer.write_all(&buf)?;
    }
    writer.flush()?;
    Ok(())
}

/// Decode an in-memory payload
pub fn decode_payload(bytes: &[u8], header: &RasterHeader) -> Result<Vec<f64>> {
    let expected = payload_len(header)?;
    if bytes.len() != expected {
        return Err(Error::PayloadSize {
            expected: expected as u64,
            actual: bytes.len() as u64,
        });
    }
    let mut cells = try_filled_vec(header.num_cells()?, header.nodata)?;
    decode_into(bytes, header, &mut cells);
    Ok(cells)
}

/// Encode cells into an in-memory payload
pub fn encode_payload(values: &[f64], header: &RasterHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * header.data_type.size_in_bytes());
    encode_into(values.iter().copied(), header, &mut out);
    out
}

/// Open a raster read-only
pub fn read_raster<P: AsRef<Path>>(path: P) -> Result<Raster> {
    Raster::open(path, Access::ReadOnly)
}

/// Write a copy of `raster` to `path` without attaching it there
pub fn write_raster<P: AsRef<Path>>(raster: &Raster, path: P) -> Result<()> {
    let header_path = header_path(path.as_ref());
    let mut header = raster.header().clone();
    let stats = raster.statistics();
    if let (Some(min), Some(max)) = (stats.min, stats.max) {
        header.set_value_range(min, max);
    }
    write_header(&header_path, &header)?;
    write_payload(&data_path(&header_path), &header, raster.data())?;
    tracing::info!("Wrote {}", header_path.display());
    Ok(())
}

fn payload_len(header: &RasterHeader) -> Result<usize> {
    header
        .num_cells()?
        .checked_mul(header.data_type.size_in_bytes())
        .ok_or(Error::ResourceExhausted {
            cells: header.rows.saturating_mul(header.cols),
        })
}

fn decode_into(bytes: &[u8], header: &RasterHeader, out: &mut [f64]) {
    match header.byte_order {
        ByteOrder::LittleEndian => decode::<LittleEndian>(bytes, header.data_type, out),
        ByteOrder::BigEndian => decode::<BigEndian>(bytes, header.data_type, out),
    }
}

fn decode<B: byteorder::ByteOrder>(bytes: &[u8], data_type: DataType, out: &mut [f64]) {
    let chunks = bytes.chunks_exact(data_type.size_in_bytes());
    for (cell, chunk) in out.iter_mut().zip(chunks) {
        *cell = match data_type {
            DataType::Double => B::read_f64(chunk),
            DataType::Float => B::read_f32(chunk) as f64,
            DataType::Integer => B::read_i16(chunk) as f64,
            DataType::Byte => chunk[0] as f64,
        };
    }
}

fn encode_into(values: impl Iterator<Item = f64>, header: &RasterHeader, out: &mut Vec<u8>) {
    match header.byte_order {
        ByteOrder::LittleEndian => encode::<LittleEndian>(values, header, out),
        ByteOrder::BigEndian => encode::<BigEndian>(values, header, out),
    }
}

fn encode<B: byteorder::ByteOrder>(
    values: impl Iterator<Item = f64>,
    header: &RasterHeader,
    out: &mut Vec<u8>,
) {
    let data_type = header.data_type;
    let mut buf = [0u8; 8];
    for v in values {
        let q = data_type.quantize(v, header.nodata);
        match data_type {
            DataType::Double => {
                B::write_f64(&mut buf, q);
                out.extend_from_slice(&buf[..8]);
            }
            DataType::Float => {
                B::write_f32(&mut buf, q as f32);
                out.extend_from_slice(&buf[..4]);
            }
            DataType::Integer => {
                B::write_i16(&mut buf, q as i16);
                out.extend_from_slice(&buf[..2]);
            }
            DataType::Byte => out.push(q as u8),
        }
    }
}

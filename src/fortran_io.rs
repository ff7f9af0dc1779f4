//! Fortran unformatted sequential records of `f32` values, as written by the
//! solver for each (processor, parameter) pair.
//!
//! A record is a 4-byte byte count, the payload, and the byte count again.
//! Files without the markers are accepted on read as a bare `f32` stream.

use crate::{FwiError, FwiResult};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

const MARKER_BYTES: usize = 4;

pub fn read_bin(path: &Path) -> FwiResult<Vec<f32>> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FwiError::MissingPartitionFile(path.to_path_buf())
        } else {
            FwiError::Io(e)
        }
    })?;
    decode(&bytes).map_err(|msg| {
        FwiError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {}", path.display(), msg),
        ))
    })
}

pub fn write_bin(path: &Path, values: &[f32]) -> FwiResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let nbytes = record_marker(values.len())?;
    writer.write_all(&nbytes)?;
    for v in values {
        writer.write_all(&v.to_ne_bytes())?;
    }
    writer.write_all(&nbytes)?;
    writer.flush()?;
    Ok(())
}

fn record_marker(len: usize) -> FwiResult<[u8; 4]> {
    let nbytes = len
        .checked_mul(4)
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| FwiError::Other(format!("record of {} values exceeds i32 byte count", len)))?;
    Ok(nbytes.to_ne_bytes())
}

fn decode(bytes: &[u8]) -> Result<Vec<f32>, String> {
    if bytes.len() % 4 != 0 {
        return Err(format!("size {} is not a multiple of 4 bytes", bytes.len()));
    }

    let payload = if has_record_markers(bytes) {
        &bytes[MARKER_BYTES..bytes.len() - MARKER_BYTES]
    } else {
        bytes
    };

    Ok(payload
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn has_record_markers(bytes: &[u8]) -> bool {
    if bytes.len() < 2 * MARKER_BYTES {
        return false;
    }
    let head = i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    usize::try_from(head).map(|n| n == bytes.len() - 2 * MARKER_BYTES).unwrap_or(false)
}

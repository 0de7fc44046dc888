//! Variable-length integer encoding utilities.
//!
//! Lengths and counts in observation files are stored as LEB128 varints:
//! 7 bits per byte with a continuation bit, so small counts take one byte.

use std::io::Read;

use byteorder::ReadBytesExt;

use crate::error::{ObsError, Result};

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        bytes.push(byte);

        if val == 0 {
            break;
        }
    }

    bytes
}

/// Decode a u64 value from variable-length encoding.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut bytes_read = 0;

    for &byte in bytes {
        bytes_read += 1;

        if shift >= 64 {
            return Err(ObsError::other("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, bytes_read));
        }

        shift += 7;
    }

    Err(ObsError::other("Incomplete VarInt"))
}

/// Read the raw bytes of one varint from a reader, without decoding them.
pub fn read_raw<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    loop {
        let byte = reader.read_u8()?;
        bytes.push(byte);
        if byte & 0x80 == 0 {
            return Ok(bytes);
        }
        if bytes.len() > 10 {
            return Err(ObsError::other("VarInt overflow"));
        }
    }
}

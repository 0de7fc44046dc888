//! Structured file I/O for binary data serialization.
//!
//! [`StructWriter`] and [`StructReader`] write and read little-endian
//! primitives, varint-prefixed strings and typed column slices, keeping a
//! running CRC-32 of every byte. The writer appends the checksum on
//! [`StructWriter::close`]; the reader verifies it with
//! [`StructReader::verify_checksum`].

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{ObsError, Result};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint::{decode_u64, encode_u64, read_raw};

/// A structured file writer for binary data.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: Hasher,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.track(&[value]);
        Ok(())
    }

    /// Write a u16 value (little-endian).
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.track(&value.to_le_bytes());
        Ok(())
    }

    /// Write an i32 value (little-endian).
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.writer.write_i32::<LittleEndian>(value)?;
        self.track(&value.to_le_bytes());
        Ok(())
    }

    /// Write an i64 value (little-endian).
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.writer.write_i64::<LittleEndian>(value)?;
        self.track(&value.to_le_bytes());
        Ok(())
    }

    /// Write a f32 value (little-endian).
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.writer.write_f32::<LittleEndian>(value)?;
        self.track(&value.to_le_bytes());
        Ok(())
    }

    /// Write a f64 value (little-endian).
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.writer.write_f64::<LittleEndian>(value)?;
        self.track(&value.to_le_bytes());
        Ok(())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let encoded = encode_u64(value);
        self.write_raw(&encoded)
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        self.write_varint(bytes.len() as u64)?;
        self.write_raw(bytes)
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.track(value);
        Ok(())
    }

    /// Write a length-prefixed i32 slice.
    pub fn write_i32_slice(&mut self, values: &[i32]) -> Result<()> {
        self.write_varint(values.len() as u64)?;
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_raw(&bytes)
    }

    /// Write a length-prefixed i64 slice.
    pub fn write_i64_slice(&mut self, values: &[i64]) -> Result<()> {
        self.write_varint(values.len() as u64)?;
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_raw(&bytes)
    }

    /// Write a length-prefixed f32 slice.
    pub fn write_f32_slice(&mut self, values: &[f32]) -> Result<()> {
        self.write_varint(values.len() as u64)?;
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_raw(&bytes)
    }

    /// Write a length-prefixed f64 slice.
    pub fn write_f64_slice(&mut self, values: &[f64]) -> Result<()> {
        self.write_varint(values.len() as u64)?;
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_raw(&bytes)
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get the checksum of everything written so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn track(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.position += data.len() as u64;
    }

    /// Append the checksum, then flush and close the writer.
    pub fn close(mut self) -> Result<()> {
        let checksum = self.checksum();
        self.writer.write_u32::<LittleEndian>(checksum)?;
        self.writer.flush_and_sync()?;
        self.writer.close()?;
        Ok(())
    }
}

/// A structured file reader for binary data.
pub struct StructReader<R: StorageInput> {
    reader: R,
    hasher: Hasher,
    position: u64,
    file_size: u64,
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new structured file reader.
    pub fn new(reader: R) -> Result<Self> {
        let file_size = reader.size()?;
        Ok(StructReader {
            reader,
            hasher: Hasher::new(),
            position: 0,
            file_size,
        })
    }

    /// Read a u8 value.
    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.reader.read_u8()?;
        self.track(&[value]);
        Ok(value)
    }

    /// Read a u16 value (little-endian).
    pub fn read_u16(&mut self) -> Result<u16> {
        let value = self.reader.read_u16::<LittleEndian>()?;
        self.track(&value.to_le_bytes());
        Ok(value)
    }

    /// Read an i32 value (little-endian).
    pub fn read_i32(&mut self) -> Result<i32> {
        let value = self.reader.read_i32::<LittleEndian>()?;
        self.track(&value.to_le_bytes());
        Ok(value)
    }

    /// Read an i64 value (little-endian).
    pub fn read_i64(&mut self) -> Result<i64> {
        let value = self.reader.read_i64::<LittleEndian>()?;
        self.track(&value.to_le_bytes());
        Ok(value)
    }

    /// Read a f32 value (little-endian).
    pub fn read_f32(&mut self) -> Result<f32> {
        let value = self.reader.read_f32::<LittleEndian>()?;
        self.track(&value.to_le_bytes());
        Ok(value)
    }

    /// Read a f64 value (little-endian).
    pub fn read_f64(&mut self) -> Result<f64> {
        let value = self.reader.read_f64::<LittleEndian>()?;
        self.track(&value.to_le_bytes());
        Ok(value)
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        let bytes = read_raw(&mut self.reader)?;
        let (value, _) = decode_u64(&bytes)?;
        self.track(&bytes);
        Ok(value)
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_length(1)?;
        let bytes = self.read_raw(length)?;
        String::from_utf8(bytes).map_err(|e| ObsError::storage(format!("Invalid UTF-8: {e}")))
    }

    /// Read raw bytes without length prefix.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        self.track(&bytes);
        Ok(bytes)
    }

    /// Read a length-prefixed i32 slice.
    pub fn read_i32_slice(&mut self) -> Result<Vec<i32>> {
        let length = self.read_length(4)?;
        let bytes = self.read_raw(length * 4)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Read a length-prefixed i64 slice.
    pub fn read_i64_slice(&mut self) -> Result<Vec<i64>> {
        let length = self.read_length(8)?;
        let bytes = self.read_raw(length * 8)?;
        Ok(bytes
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect())
    }

    /// Read a length-prefixed f32 slice.
    pub fn read_f32_slice(&mut self) -> Result<Vec<f32>> {
        let length = self.read_length(4)?;
        let bytes = self.read_raw(length * 4)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Read a length-prefixed f64 slice.
    pub fn read_f64_slice(&mut self) -> Result<Vec<f64>> {
        let length = self.read_length(8)?;
        let bytes = self.read_raw(length * 8)?;
        Ok(bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect())
    }

    /// Read a length prefix and check it against the bytes left in the file.
    fn read_length(&mut self, element_size: usize) -> Result<usize> {
        let length = self.read_varint()? as usize;
        let remaining = self.file_size.saturating_sub(self.position);
        if (length as u64).saturating_mul(element_size as u64) > remaining {
            return Err(ObsError::storage(format!(
                "Length prefix {length} exceeds remaining {remaining} bytes"
            )));
        }
        Ok(length)
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get file size.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// Check if at end of the payload (the trailing checksum excluded).
    pub fn is_eof(&self) -> bool {
        self.position >= self.file_size.saturating_sub(4)
    }

    fn track(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.position += data.len() as u64;
    }

    /// Verify file integrity by checking the trailing checksum.
    pub fn verify_checksum(&mut self) -> Result<bool> {
        if self.position + 4 > self.file_size {
            return Err(ObsError::storage("File too short for checksum"));
        }

        let stored_checksum = self.reader.read_u32::<LittleEndian>()?;
        Ok(stored_checksum == self.hasher.clone().finalize())
    }

    /// Close the reader.
    pub fn close(mut self) -> Result<()> {
        self.reader.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    #[test]
    fn test_struct_writer_reader() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());

        {
            let output = storage.create_output("test.struct").unwrap();
            let mut writer = StructWriter::new(output);

            writer.write_u8(42).unwrap();
            writer.write_u16(1234).unwrap();
            writer.write_i32(-5678).unwrap();
            writer.write_i64(-9876543210).unwrap();
            writer.write_varint(12345).unwrap();
            writer.write_f32(std::f32::consts::PI).unwrap();
            writer.write_f64(std::f64::consts::E).unwrap();
            writer.write_string("MetaData").unwrap();
            writer.write_f32_slice(&[1.0, 2.5, -3.0]).unwrap();
            writer.write_i64_slice(&[7, 0, -7]).unwrap();

            writer.close().unwrap();
        }

        let input = storage.open_input("test.struct").unwrap();
        let mut reader = StructReader::new(input).unwrap();

        assert_eq!(reader.read_u8().unwrap(), 42);
        assert_eq!(reader.read_u16().unwrap(), 1234);
        assert_eq!(reader.read_i32().unwrap(), -5678);
        assert_eq!(reader.read_i64().unwrap(), -9876543210);
        assert_eq!(reader.read_varint().unwrap(), 12345);
        assert!((reader.read_f32().unwrap() - std::f32::consts::PI).abs() < 0.0001);
        assert!((reader.read_f64().unwrap() - std::f64::consts::E).abs() < 0.000000001);
        assert_eq!(reader.read_string().unwrap(), "MetaData");
        assert_eq!(reader.read_f32_slice().unwrap(), vec![1.0, 2.5, -3.0]);
        assert_eq!(reader.read_i64_slice().unwrap(), vec![7, 0, -7]);

        assert!(reader.is_eof());
        assert!(reader.verify_checksum().unwrap());
    }

    #[test]
    fn test_corruption_detected() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());

        {
            let output = storage.create_output("good.struct").unwrap();
            let mut writer = StructWriter::new(output);
            writer.write_f64_slice(&[1.0, 2.0, 3.0]).unwrap();
            writer.close().unwrap();
        }

        // Flip one payload byte and store the result under a new name
        let mut bytes = Vec::new();
        {
            use std::io::Read;
            let mut input = storage.open_input("good.struct").unwrap();
            input.read_to_end(&mut bytes).unwrap();
        }
        bytes[3] ^= 0xFF;
        {
            use std::io::Write;
            let mut output = storage.create_output("bad.struct").unwrap();
            output.write_all(&bytes).unwrap();
            output.close().unwrap();
        }

        let input = storage.open_input("bad.struct").unwrap();
        let mut reader = StructReader::new(input).unwrap();
        reader.read_f64_slice().unwrap();
        assert!(!reader.verify_checksum().unwrap());
    }

    #[test]
    fn test_oversized_length_prefix_rejected() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());

        {
            let output = storage.create_output("short.struct").unwrap();
            let mut writer = StructWriter::new(output);
            writer.write_varint(1_000_000).unwrap();
            writer.close().unwrap();
        }

        let input = storage.open_input("short.struct").unwrap();
        let mut reader = StructReader::new(input).unwrap();
        assert!(reader.read_f32_slice().is_err());
    }
}

//! Binary reader for [`ObsFile`].

use std::collections::BTreeMap;

use log::info;

use crate::codec::{AttributeValue, ColumnData, FORMAT_VERSION, Group, MAGIC, ObsFile, Variable};
use crate::error::{ObsError, Result};
use crate::storage::structured::StructReader;
use crate::storage::{Storage, StorageInput};

/// Groups nested deeper than this are treated as corruption.
const MAX_DEPTH: usize = 32;

/// Read and validate the file `name`.
///
/// Every failure, including a missing file, is reported as
/// [`ObsError::File`] naming `name`.
pub fn read_obs_file(storage: &dyn Storage, name: &str) -> Result<ObsFile> {
    let input = storage
        .open_input(name)
        .map_err(|e| ObsError::file(name, format!("cannot open: {e}")))?;
    let mut reader = StructReader::new(input).map_err(|e| ObsError::file(name, e.to_string()))?;

    let file = decode(&mut reader).map_err(|e| {
        if matches!(e, ObsError::File { .. }) {
            e
        } else {
            ObsError::file(name, e.to_string())
        }
    })?;

    if !reader.is_eof() {
        return Err(ObsError::file(name, "trailing bytes after root group"));
    }
    let intact = reader
        .verify_checksum()
        .map_err(|e| ObsError::file(name, e.to_string()))?;
    if !intact {
        return Err(ObsError::file(name, "checksum mismatch"));
    }
    reader.close()?;

    if let Some(message) = file.shape_error() {
        return Err(ObsError::file(name, message));
    }

    info!(
        "read {name}: {} dimensions, {} groups",
        file.dimensions.len(),
        file.root.groups.len()
    );
    Ok(file)
}

fn decode<R: StorageInput>(reader: &mut StructReader<R>) -> Result<ObsFile> {
    let magic = reader.read_raw(MAGIC.len())?;
    if magic.as_slice() != MAGIC {
        return Err(ObsError::storage("not an observation file"));
    }
    let version = reader.read_u16()?;
    if version != FORMAT_VERSION {
        return Err(ObsError::storage(format!(
            "unsupported format version {version}"
        )));
    }

    let mut dimensions = BTreeMap::new();
    let count = reader.read_varint()?;
    for _ in 0..count {
        let name = reader.read_string()?;
        let length = reader.read_varint()? as usize;
        dimensions.insert(name, length);
    }

    let root = read_group(reader, 0)?;
    Ok(ObsFile { dimensions, root })
}

fn read_group<R: StorageInput>(reader: &mut StructReader<R>, depth: usize) -> Result<Group> {
    if depth > MAX_DEPTH {
        return Err(ObsError::storage("groups nested too deeply"));
    }

    let name = reader.read_string()?;
    let attributes = read_attributes(reader)?;

    let count = reader.read_varint()?;
    let mut variables = Vec::new();
    for _ in 0..count {
        variables.push(read_variable(reader)?);
    }

    let count = reader.read_varint()?;
    let mut groups = Vec::new();
    for _ in 0..count {
        groups.push(read_group(reader, depth + 1)?);
    }

    Ok(Group {
        name,
        attributes,
        variables,
        groups,
    })
}

fn read_variable<R: StorageInput>(reader: &mut StructReader<R>) -> Result<Variable> {
    let name = reader.read_string()?;
    let dimension = reader.read_string()?;
    let attributes = read_attributes(reader)?;
    let data = match reader.read_u8()? {
        0 => ColumnData::I32(reader.read_i32_slice()?),
        1 => ColumnData::I64(reader.read_i64_slice()?),
        2 => ColumnData::F32(reader.read_f32_slice()?),
        3 => ColumnData::F64(reader.read_f64_slice()?),
        tag => {
            return Err(ObsError::storage(format!(
                "variable {name} has unknown column type {tag}"
            )));
        }
    };

    Ok(Variable {
        name,
        dimension,
        attributes,
        data,
    })
}

fn read_attributes<R: StorageInput>(
    reader: &mut StructReader<R>,
) -> Result<BTreeMap<String, AttributeValue>> {
    let count = reader.read_varint()?;
    let mut attributes = BTreeMap::new();
    for _ in 0..count {
        let name = reader.read_string()?;
        let value = match reader.read_u8()? {
            0 => AttributeValue::Text(reader.read_string()?),
            1 => AttributeValue::I32(reader.read_i32()?),
            2 => AttributeValue::I64(reader.read_i64()?),
            3 => AttributeValue::F32(reader.read_f32()?),
            4 => AttributeValue::F64(reader.read_f64()?),
            tag => {
                return Err(ObsError::storage(format!(
                    "attribute {name} has unknown type {tag}"
                )));
            }
        };
        attributes.insert(name, value);
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::write_obs_file;
    use crate::storage::StorageOutput;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};
    use std::io::Write;

    fn sample() -> ObsFile {
        let mut file = ObsFile::new();
        file.add_dimension("Location", 3);
        file.root
            .set_attribute("_ioda_layout", AttributeValue::from("ObsGroup"));
        file.root.add_variable(Variable::new(
            "order",
            "Location",
            ColumnData::I64(vec![2, 0, 1]),
        ));

        let mut meta = Group::new("MetaData");
        meta.add_variable(
            Variable::new("latitude", "Location", ColumnData::F32(vec![1.5, -2.0, 60.25]))
                .with_attribute("units", AttributeValue::from("degrees_north"))
                .with_attribute("_FillValue", AttributeValue::F32(-1.0)),
        );
        meta.add_variable(Variable::new(
            "dateTime",
            "Location",
            ColumnData::I32(vec![0, 60, 120]),
        ));
        file.root.add_group(meta);
        file
    }

    #[test]
    fn test_write_then_read() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        let file = sample();
        write_obs_file(&storage, "sonde.obs", &file).unwrap();
        let back = read_obs_file(&storage, "sonde.obs").unwrap();
        assert_eq!(back, file);
    }

    #[test]
    fn test_missing_file_names_path() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        match read_obs_file(&storage, "absent.obs") {
            Err(ObsError::File { path, .. }) => assert_eq!(path, "absent.obs"),
            other => panic!("expected file error, got {other:?}"),
        }
    }

    #[test]
    fn test_shape_mismatch_rejected_on_write() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        let mut file = sample();
        file.add_dimension("Location", 4);
        assert!(matches!(
            write_obs_file(&storage, "bad.obs", &file),
            Err(ObsError::File { .. })
        ));
        assert!(!storage.file_exists("bad.obs"));
    }

    #[test]
    fn test_corruption_detected() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        write_obs_file(&storage, "sonde.obs", &sample()).unwrap();

        let mut bytes = Vec::new();
        {
            use std::io::Read;
            let mut input = storage.open_input("sonde.obs").unwrap();
            input.read_to_end(&mut bytes).unwrap();
        }
        let last = bytes.len() - 10;
        bytes[last] ^= 0xFF;
        {
            let mut output = storage.create_output("sonde.obs").unwrap();
            output.write_all(&bytes).unwrap();
            output.close().unwrap();
        }

        assert!(matches!(
            read_obs_file(&storage, "sonde.obs"),
            Err(ObsError::File { .. })
        ));
    }

    #[test]
    fn test_wrong_magic() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        {
            let mut output = storage.create_output("text.obs").unwrap();
            output.write_all(b"hello world, not a file").unwrap();
            output.close().unwrap();
        }
        match read_obs_file(&storage, "text.obs") {
            Err(ObsError::File { message, .. }) => assert!(message.contains("not an observation")),
            other => panic!("expected file error, got {other:?}"),
        }
    }
}

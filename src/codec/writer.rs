//! Binary writer for [`ObsFile`].

use log::{debug, info};

use crate::codec::{AttributeValue, ColumnData, FORMAT_VERSION, Group, MAGIC, ObsFile, Variable};
use crate::error::{ObsError, Result};
use crate::storage::structured::StructWriter;
use crate::storage::{Storage, StorageOutput};

/// Write `file` to `name`, replacing any previous content.
///
/// Shape errors are reported before anything is created.
pub fn write_obs_file(storage: &dyn Storage, name: &str, file: &ObsFile) -> Result<()> {
    if let Some(message) = file.shape_error() {
        return Err(ObsError::file(name, message));
    }

    let output = storage
        .create_output(name)
        .map_err(|e| ObsError::file(name, format!("cannot create: {e}")))?;
    let mut writer = StructWriter::new(output);
    encode(&mut writer, file).map_err(|e| ObsError::file(name, e.to_string()))?;
    let bytes = writer.position() + 4;
    writer
        .close()
        .map_err(|e| ObsError::file(name, format!("cannot finish: {e}")))?;

    info!(
        "wrote {name}: {} dimensions, {} groups, {bytes} bytes",
        file.dimensions.len(),
        file.root.groups.len()
    );
    Ok(())
}

fn encode<W: StorageOutput>(writer: &mut StructWriter<W>, file: &ObsFile) -> Result<()> {
    writer.write_raw(MAGIC)?;
    writer.write_u16(FORMAT_VERSION)?;

    writer.write_varint(file.dimensions.len() as u64)?;
    for (name, length) in &file.dimensions {
        writer.write_string(name)?;
        writer.write_varint(*length as u64)?;
    }

    write_group(writer, &file.root)
}

fn write_group<W: StorageOutput>(writer: &mut StructWriter<W>, group: &Group) -> Result<()> {
    debug!(
        "encoding group '{}' with {} variables",
        group.name,
        group.variables.len()
    );
    writer.write_string(&group.name)?;
    write_attributes(writer, group.attributes.iter())?;

    writer.write_varint(group.variables.len() as u64)?;
    for variable in &group.variables {
        write_variable(writer, variable)?;
    }

    writer.write_varint(group.groups.len() as u64)?;
    for child in &group.groups {
        write_group(writer, child)?;
    }
    Ok(())
}

fn write_variable<W: StorageOutput>(writer: &mut StructWriter<W>, variable: &Variable) -> Result<()> {
    writer.write_string(&variable.name)?;
    writer.write_string(&variable.dimension)?;
    write_attributes(writer, variable.attributes.iter())?;

    writer.write_u8(variable.data.tag())?;
    match &variable.data {
        ColumnData::I32(values) => writer.write_i32_slice(values),
        ColumnData::I64(values) => writer.write_i64_slice(values),
        ColumnData::F32(values) => writer.write_f32_slice(values),
        ColumnData::F64(values) => writer.write_f64_slice(values),
    }
}

fn write_attributes<'a, W, I>(writer: &mut StructWriter<W>, attributes: I) -> Result<()>
where
    W: StorageOutput,
    I: ExactSizeIterator<Item = (&'a String, &'a AttributeValue)>,
{
    writer.write_varint(attributes.len() as u64)?;
    for (name, value) in attributes {
        writer.write_string(name)?;
        writer.write_u8(value.tag())?;
        match value {
            AttributeValue::Text(text) => writer.write_string(text)?,
            AttributeValue::I32(v) => writer.write_i32(*v)?,
            AttributeValue::I64(v) => writer.write_i64(*v)?,
            AttributeValue::F32(v) => writer.write_f32(*v)?,
            AttributeValue::F64(v) => writer.write_f64(*v)?,
        }
    }
    Ok(())
}

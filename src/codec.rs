//! Record codec: the hierarchical observation file.
//!
//! An observation file is a tree of [`Group`]s holding typed [`Variable`]
//! columns, all sized by named dimensions. [`ObsFile`] is the in-memory form;
//! [`writer::write_obs_file`] and [`reader::read_obs_file`] move it to and from
//! a [`Storage`](crate::storage::Storage) in a checksummed little-endian
//! layout. [`layout::GlobalObservations`] maps the generic tree onto the
//! observation record layout (`Location`, `order`, `MetaData`, data groups).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod layout;
pub mod reader;
pub mod writer;

pub use layout::GlobalObservations;
pub use reader::read_obs_file;
pub use writer::write_obs_file;

/// File signature.
pub const MAGIC: &[u8; 4] = b"OBSH";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

/// Extension appended to base paths.
pub const FILE_EXTENSION: &str = "obs";

/// A typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::I32(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::F32(v) => v.len(),
            ColumnData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnData::I32(_) => "i32",
            ColumnData::I64(_) => "i64",
            ColumnData::F32(_) => "f32",
            ColumnData::F64(_) => "f64",
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            ColumnData::I32(_) => 0,
            ColumnData::I64(_) => 1,
            ColumnData::F32(_) => 2,
            ColumnData::F64(_) => 3,
        }
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Text(String),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            AttributeValue::Text(_) => 0,
            AttributeValue::I32(_) => 1,
            AttributeValue::I64(_) => 2,
            AttributeValue::F32(_) => 3,
            AttributeValue::F64(_) => 4,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

/// A named column along one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub dimension: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub data: ColumnData,
}

impl Variable {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, dimension: D, data: ColumnData) -> Self {
        Variable {
            name: name.into(),
            dimension: dimension.into(),
            attributes: BTreeMap::new(),
            data,
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute<S: Into<String>>(mut self, name: S, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// A named node of the file tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub variables: Vec<Variable>,
    pub groups: Vec<Group>,
}

impl Group {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Group {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Insert a variable, replacing one with the same name.
    pub fn add_variable(&mut self, variable: Variable) {
        match self.variables.iter_mut().find(|v| v.name == variable.name) {
            Some(slot) => *slot = variable,
            None => self.variables.push(variable),
        }
    }

    /// Insert a child group, replacing one with the same name.
    pub fn add_group(&mut self, group: Group) {
        match self.groups.iter_mut().find(|g| g.name == group.name) {
            Some(slot) => *slot = group,
            None => self.groups.push(group),
        }
    }

    pub fn set_attribute<S: Into<String>>(&mut self, name: S, value: AttributeValue) {
        self.attributes.insert(name.into(), value);
    }
}

/// An observation file held in memory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObsFile {
    pub dimensions: BTreeMap<String, usize>,
    pub root: Group,
}

impl ObsFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dimension<S: Into<String>>(&mut self, name: S, length: usize) {
        self.dimensions.insert(name.into(), length);
    }

    pub fn dimension(&self, name: &str) -> Option<usize> {
        self.dimensions.get(name).copied()
    }

    /// First variable whose length disagrees with its dimension, as a message.
    pub fn shape_error(&self) -> Option<String> {
        fn check(group: &Group, dims: &BTreeMap<String, usize>, prefix: &str) -> Option<String> {
            let path = if group.name.is_empty() {
                prefix.to_string()
            } else {
                format!("{prefix}/{}", group.name)
            };
            for variable in &group.variables {
                match dims.get(&variable.dimension) {
                    None => {
                        return Some(format!(
                            "variable {path}/{} uses unknown dimension {}",
                            variable.name, variable.dimension
                        ));
                    }
                    Some(&len) if len != variable.data.len() => {
                        return Some(format!(
                            "variable {path}/{} holds {} values, dimension {} is {len}",
                            variable.name,
                            variable.data.len(),
                            variable.dimension
                        ));
                    }
                    Some(_) => {}
                }
            }
            group.groups.iter().find_map(|g| check(g, dims, &path))
        }
        check(&self.root, &self.dimensions, "")
    }
}

/// Physical file name for a base path.
pub fn file_name(base: &str, screened: bool) -> String {
    if screened {
        format!("{base}_screened.{FILE_EXTENSION}")
    } else {
        format!("{base}.{FILE_EXTENSION}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("out/sonde", false), "out/sonde.obs");
        assert_eq!(file_name("out/sonde", true), "out/sonde_screened.obs");
    }

    #[test]
    fn test_group_replace_semantics() {
        let mut group = Group::new("MetaData");
        group.add_variable(Variable::new("height", "Location", ColumnData::F32(vec![1.0])));
        group.add_variable(Variable::new("height", "Location", ColumnData::F32(vec![2.0])));
        assert_eq!(group.variables.len(), 1);
        assert_eq!(
            group.variable("height").map(|v| &v.data),
            Some(&ColumnData::F32(vec![2.0]))
        );
    }

    #[test]
    fn test_shape_error() {
        let mut file = ObsFile::new();
        file.add_dimension("Location", 2);
        let mut group = Group::new("ObsValue");
        group.add_variable(Variable::new("t", "Location", ColumnData::F32(vec![1.0])));
        file.root.add_group(group);
        let message = file.shape_error().unwrap();
        assert!(message.contains("/ObsValue/t"));

        let mut ok = ObsFile::new();
        ok.add_dimension("Location", 1);
        ok.root
            .add_variable(Variable::new("order", "Location", ColumnData::I64(vec![0])));
        assert!(ok.shape_error().is_none());
    }
}

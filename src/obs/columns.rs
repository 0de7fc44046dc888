//! Named float columns over local record indices.
//!
//! Store groups and vector variables are the same thing: an ordered set of
//! named `f64` columns of one common length. [`ColumnSet`] is that container.

use serde::{Deserialize, Serialize};

use crate::error::{ObsError, Result};

/// One named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

/// An ordered set of equally long named columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnSet {
    name: String,
    columns: Vec<Column>,
}

impl ColumnSet {
    /// An empty set without columns.
    pub fn new<S: Into<String>>(name: S) -> Self {
        ColumnSet {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// One column per variable, every entry equal to `value`.
    pub fn filled<S: Into<String>>(name: S, variables: &[String], len: usize, value: f64) -> Self {
        ColumnSet {
            name: name.into(),
            columns: variables
                .iter()
                .map(|v| Column {
                    name: v.clone(),
                    values: vec![value; len],
                })
                .collect(),
        }
    }

    /// Build from `(name, values)` pairs.
    pub fn from_columns<S: Into<String>>(name: S, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let mut set = ColumnSet::new(name);
        for (column, values) in columns {
            set.push_column(column, values)?;
        }
        Ok(set)
    }

    /// Rebuild from record-major values, `values[k * names.len() + v]`.
    pub fn from_interleaved<S: Into<String>>(
        name: S,
        names: &[String],
        values: &[f64],
    ) -> Result<Self> {
        let width = names.len();
        if width == 0 {
            return if values.is_empty() {
                Ok(ColumnSet::new(name))
            } else {
                Err(ObsError::precondition("interleaved values without columns"))
            };
        }
        if values.len() % width != 0 {
            return Err(ObsError::precondition(format!(
                "{} interleaved values do not split into {width} columns",
                values.len()
            )));
        }
        let columns = names
            .iter()
            .enumerate()
            .map(|(v, column)| {
                (
                    column.clone(),
                    values.iter().skip(v).step_by(width).copied().collect(),
                )
            })
            .collect();
        Self::from_columns(name, columns)
    }

    /// Append a column. Its length must match and its name must be new.
    pub fn push_column<S: Into<String>>(&mut self, name: S, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if self.columns.iter().any(|c| c.name == name) {
            return Err(ObsError::precondition(format!(
                "column {name} already present in {}",
                self.name
            )));
        }
        if !self.columns.is_empty() && values.len() != self.len() {
            return Err(ObsError::precondition(format!(
                "column {name} has {} values, {} holds {}",
                values.len(),
                self.name,
                self.len()
            )));
        }
        self.columns.push(Column { name, values });
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut [f64]> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .map(|c| c.values.as_mut_slice())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows; zero when there are no columns.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Same column names in the same order and the same length.
    pub fn same_layout(&self, other: &ColumnSet) -> bool {
        self.len() == other.len()
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.name == b.name)
    }

    /// Copy of the rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> ColumnSet {
        ColumnSet {
            name: self.name.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: indices.iter().map(|&i| c.values[i]).collect(),
                })
                .collect(),
        }
    }

    /// Record-major copy of every column: `out[k * num_columns + v]`.
    pub fn interleave(&self) -> Vec<f64> {
        let width = self.columns.len();
        let mut out = Vec::with_capacity(width * self.len());
        for k in 0..self.len() {
            out.extend(self.columns.iter().map(|c| c.values[k]));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_filled_and_lookup() {
        let set = ColumnSet::filled("ObsError", &names(&["t", "q"]), 3, 0.5);
        assert_eq!(set.len(), 3);
        assert_eq!(set.num_columns(), 2);
        assert_eq!(set.column("q"), Some(&[0.5, 0.5, 0.5][..]));
        assert!(set.column("u").is_none());
        assert_eq!(set.column_names(), names(&["t", "q"]));
    }

    #[test]
    fn test_push_column_checks() {
        let mut set = ColumnSet::new("ObsValue");
        set.push_column("t", vec![1.0, 2.0]).unwrap();
        assert!(set.push_column("t", vec![3.0, 4.0]).is_err());
        assert!(set.push_column("q", vec![3.0]).is_err());
        set.push_column("q", vec![3.0, 4.0]).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_interleave_round_trip() {
        let set = ColumnSet::from_columns(
            "g",
            vec![
                ("a".to_string(), vec![1.0, 2.0, 3.0]),
                ("b".to_string(), vec![10.0, 20.0, 30.0]),
            ],
        )
        .unwrap();
        let flat = set.interleave();
        assert_eq!(flat, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
        let back = ColumnSet::from_interleaved("g", &set.column_names(), &flat).unwrap();
        assert_eq!(back, set);
        assert!(ColumnSet::from_interleaved("g", &names(&["a", "b"]), &[1.0]).is_err());
    }

    #[test]
    fn test_select_and_layout() {
        let set = ColumnSet::from_columns("g", vec![("a".to_string(), vec![1.0, 2.0, 3.0])]).unwrap();
        let picked = set.select(&[2, 0]);
        assert_eq!(picked.column("a"), Some(&[3.0, 1.0][..]));
        assert!(!picked.same_layout(&set));
        assert!(set.same_layout(&set.clone()));
        assert!(set.select(&[]).is_empty());
    }
}

//! Observation record layout on top of the generic file tree.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use log::debug;

use crate::codec::{AttributeValue, ColumnData, Group, ObsFile, Variable};
use crate::error::{ObsError, Result};
use crate::geometry::Point3;
use crate::obs::columns::ColumnSet;
use crate::util::missing::{MISSING_F32, MISSING_I32, MISSING_I64, from_f32, to_f32};

pub const LOCATION: &str = "Location";
pub const ORDER: &str = "order";
pub const METADATA: &str = "MetaData";
pub const DATE_TIME: &str = "dateTime";
pub const LONGITUDE: &str = "longitude";
pub const LATITUDE: &str = "latitude";
pub const HEIGHT: &str = "height";
pub const UNITS: &str = "units";
pub const FILL_VALUE: &str = "_FillValue";

const EPOCH_PREFIX: &str = "seconds since ";

/// The complete record set of one store, as held by the root.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GlobalObservations {
    pub times: Vec<DateTime<Utc>>,
    pub locations: Vec<Point3>,
    /// Canonical position of each record.
    pub order: Vec<u64>,
    pub groups: Vec<ColumnSet>,
}

impl GlobalObservations {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Every field describes the same number of records.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        if self.locations.len() != n || self.order.len() != n {
            return Err(ObsError::precondition(format!(
                "{n} times, {} locations and {} order entries",
                self.locations.len(),
                self.order.len()
            )));
        }
        if let Some(group) = self.groups.iter().find(|g| g.num_columns() > 0 && g.len() != n) {
            return Err(ObsError::precondition(format!(
                "group {} holds {} records, expected {n}",
                group.name(),
                group.len()
            )));
        }
        Ok(())
    }

    /// Reorder every field so records appear by ascending canonical order.
    pub fn sort_by_order(&mut self) {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.sort_by_key(|&i| self.order[i]);
        self.times = indices.iter().map(|&i| self.times[i]).collect();
        self.locations = indices.iter().map(|&i| self.locations[i]).collect();
        self.order = indices.iter().map(|&i| self.order[i]).collect();
        for group in &mut self.groups {
            *group = group.select(&indices);
        }
    }

    /// Extract the records of `file`, keeping the columns of `variables` in
    /// every data group.
    ///
    /// `path` only labels errors.
    pub fn from_file(file: &ObsFile, path: &str, variables: &[String]) -> Result<Self> {
        let n = file
            .dimension(LOCATION)
            .ok_or_else(|| ObsError::file(path, format!("missing dimension {LOCATION}")))?;

        let order = match file.root.variable(ORDER) {
            Some(variable) => read_order(&variable.data, path)?,
            None => (0..n as u64).collect(),
        };

        let meta = file
            .root
            .group(METADATA)
            .ok_or_else(|| ObsError::file(path, format!("missing group {METADATA}")))?;
        let times = read_times(meta, path)?;
        let lons = read_float(meta, LONGITUDE, path)?;
        let lats = read_float(meta, LATITUDE, path)?;
        let heights = read_float(meta, HEIGHT, path)?;
        let locations = lons
            .iter()
            .zip(&lats)
            .zip(&heights)
            .map(|((&lon, &lat), &height)| Point3::new(lon, lat, height))
            .collect();

        let mut groups = Vec::new();
        for group in file.root.groups.iter().filter(|g| g.name != METADATA) {
            let present = variables
                .iter()
                .filter(|v| group.variable(v).is_some())
                .count();
            if present == 0 {
                debug!("{path}: group {} has no declared variables, skipped", group.name);
                continue;
            }
            let mut set = ColumnSet::new(group.name.clone());
            for variable in variables {
                let values = read_float(group, variable, path)?;
                set.push_column(variable.clone(), values)?;
            }
            groups.push(set);
        }

        let observations = GlobalObservations {
            times,
            locations,
            order,
            groups,
        };
        observations
            .validate()
            .map_err(|e| ObsError::file(path, e.to_string()))?;
        Ok(observations)
    }

    /// Lay the records out as a file, in their current order.
    pub fn to_file(&self) -> Result<ObsFile> {
        self.validate()?;
        let n = self.len();

        let mut file = ObsFile::new();
        file.add_dimension(LOCATION, n);
        file.root
            .set_attribute("_ioda_layout", AttributeValue::from("ObsGroup"));
        file.root
            .set_attribute("_ioda_layout_version", AttributeValue::I32(0));

        let index = (0..n)
            .map(|i| {
                i32::try_from(i)
                    .map_err(|_| ObsError::precondition("too many records for the location index"))
            })
            .collect::<Result<Vec<i32>>>()?;
        file.root.add_variable(
            Variable::new(LOCATION, LOCATION, ColumnData::I32(index))
                .with_attribute(FILL_VALUE, AttributeValue::I32(MISSING_I32)),
        );
        let order = self
            .order
            .iter()
            .map(|&o| {
                i64::try_from(o).map_err(|_| ObsError::precondition(format!("order {o} overflows")))
            })
            .collect::<Result<Vec<i64>>>()?;
        file.root.add_variable(
            Variable::new(ORDER, LOCATION, ColumnData::I64(order))
                .with_attribute(FILL_VALUE, AttributeValue::I64(MISSING_I64)),
        );

        let epoch = self
            .times
            .iter()
            .min()
            .copied()
            .unwrap_or(DateTime::UNIX_EPOCH);
        let offsets = self
            .times
            .iter()
            .map(|t| (*t - epoch).num_seconds())
            .collect();

        let mut meta = Group::new(METADATA);
        meta.add_variable(
            Variable::new(DATE_TIME, LOCATION, ColumnData::I64(offsets))
                .with_attribute(
                    UNITS,
                    AttributeValue::Text(format!(
                        "{EPOCH_PREFIX}{}",
                        epoch.to_rfc3339_opts(SecondsFormat::Secs, true)
                    )),
                )
                .with_attribute(FILL_VALUE, AttributeValue::I64(MISSING_I64)),
        );
        meta.add_variable(float_variable(
            LONGITUDE,
            self.locations.iter().map(|p| p.lon),
            Some("degrees_east"),
        ));
        meta.add_variable(float_variable(
            LATITUDE,
            self.locations.iter().map(|p| p.lat),
            Some("degrees_north"),
        ));
        meta.add_variable(float_variable(
            HEIGHT,
            self.locations.iter().map(|p| p.height),
            Some("m"),
        ));
        file.root.add_group(meta);

        for set in &self.groups {
            let mut group = Group::new(set.name());
            for column in set.columns() {
                group.add_variable(float_variable(
                    &column.name,
                    column.values.iter().copied(),
                    None,
                ));
            }
            file.root.add_group(group);
        }

        Ok(file)
    }
}

fn float_variable<I>(name: &str, values: I, units: Option<&str>) -> Variable
where
    I: Iterator<Item = f64>,
{
    let mut variable = Variable::new(
        name,
        LOCATION,
        ColumnData::F32(values.map(to_f32).collect()),
    )
    .with_attribute(FILL_VALUE, AttributeValue::F32(MISSING_F32));
    if let Some(units) = units {
        variable = variable.with_attribute(UNITS, AttributeValue::from(units));
    }
    variable
}

fn read_order(data: &ColumnData, path: &str) -> Result<Vec<u64>> {
    let signed: Vec<i64> = match data {
        ColumnData::I32(values) => values.iter().map(|&v| v as i64).collect(),
        ColumnData::I64(values) => values.clone(),
        other => {
            return Err(ObsError::file(
                path,
                format!("{ORDER} must be an integer column, found {}", other.type_name()),
            ));
        }
    };
    signed
        .into_iter()
        .map(|v| {
            u64::try_from(v).map_err(|_| ObsError::file(path, format!("negative {ORDER} value {v}")))
        })
        .collect()
}

fn read_times(meta: &Group, path: &str) -> Result<Vec<DateTime<Utc>>> {
    let variable = meta
        .variable(DATE_TIME)
        .ok_or_else(|| ObsError::file(path, format!("missing variable {METADATA}/{DATE_TIME}")))?;
    let units = variable
        .attribute(UNITS)
        .and_then(AttributeValue::as_text)
        .ok_or_else(|| ObsError::file(path, format!("{METADATA}/{DATE_TIME} has no units")))?;
    let epoch = parse_epoch(units).ok_or_else(|| {
        ObsError::file(path, format!("cannot parse time units '{units}'"))
    })?;

    let offsets: Vec<i64> = match &variable.data {
        ColumnData::I64(values) => values.clone(),
        ColumnData::I32(values) => values
            .iter()
            .map(|&v| if v == MISSING_I32 { MISSING_I64 } else { v as i64 })
            .collect(),
        other => {
            return Err(ObsError::file(
                path,
                format!("{DATE_TIME} must be an integer column, found {}", other.type_name()),
            ));
        }
    };

    offsets
        .iter()
        .enumerate()
        .map(|(k, &offset)| {
            if offset == MISSING_I64 {
                return Err(ObsError::file(path, format!("record {k} has no time")));
            }
            TimeDelta::try_seconds(offset)
                .and_then(|delta| epoch.checked_add_signed(delta))
                .ok_or_else(|| ObsError::file(path, format!("time offset {offset} out of range")))
        })
        .collect()
}

/// Parse `seconds since <RFC 3339>` into the epoch it names.
pub fn parse_epoch(units: &str) -> Option<DateTime<Utc>> {
    let stamp = units.trim().strip_prefix(EPOCH_PREFIX)?;
    DateTime::parse_from_rfc3339(stamp.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn read_float(group: &Group, name: &str, path: &str) -> Result<Vec<f64>> {
    let variable = group.variable(name).ok_or_else(|| {
        ObsError::file(path, format!("missing variable {}/{name}", group.name))
    })?;
    match &variable.data {
        ColumnData::F32(values) => Ok(values.iter().copied().map(from_f32).collect()),
        ColumnData::F64(values) => Ok(values.clone()),
        other => Err(ObsError::file(
            path,
            format!(
                "{}/{name} must be a float column, found {}",
                group.name,
                other.type_name()
            ),
        )),
    }
}

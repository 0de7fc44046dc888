//! Local observation records.

use chrono::{DateTime, Utc};

use crate::error::{ObsError, Result};
use crate::geometry::Point3;

/// One observation: when, where, and its canonical position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    pub time: DateTime<Utc>,
    pub location: Point3,
    pub global_order: u64,
}

/// Records held by one worker, stored column-wise.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSet {
    times: Vec<DateTime<Utc>>,
    locations: Vec<Point3>,
    global_order: Vec<u64>,
}

impl RecordSet {
    pub fn new(
        times: Vec<DateTime<Utc>>,
        locations: Vec<Point3>,
        global_order: Vec<u64>,
    ) -> Result<Self> {
        if times.len() != locations.len() || times.len() != global_order.len() {
            return Err(ObsError::precondition(format!(
                "record fields disagree: {} times, {} locations, {} order entries",
                times.len(),
                locations.len(),
                global_order.len()
            )));
        }
        Ok(RecordSet {
            times,
            locations,
            global_order,
        })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn locations(&self) -> &[Point3] {
        &self.locations
    }

    pub fn global_order(&self) -> &[u64] {
        &self.global_order
    }

    pub fn get(&self, index: usize) -> Option<Record> {
        Some(Record {
            time: *self.times.get(index)?,
            location: *self.locations.get(index)?,
            global_order: *self.global_order.get(index)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    /// Indices whose time satisfies `keep`.
    pub fn indices_where<F>(&self, keep: F) -> Vec<usize>
    where
        F: Fn(DateTime<Utc>) -> bool,
    {
        self.times
            .iter()
            .enumerate()
            .filter(|(_, t)| keep(**t))
            .map(|(i, _)| i)
            .collect()
    }

    /// Copy of the records at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> RecordSet {
        RecordSet {
            times: indices.iter().map(|&i| self.times[i]).collect(),
            locations: indices.iter().map(|&i| self.locations[i]).collect(),
            global_order: indices.iter().map(|&i| self.global_order[i]).collect(),
        }
    }

    pub(crate) fn times_mut(&mut self) -> &mut [DateTime<Utc>] {
        &mut self.times
    }
}

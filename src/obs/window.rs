//! Assimilation time window and the time selection rule.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ObsError, Result};

/// The closed interval `[begin, end]` a store is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < begin {
            return Err(ObsError::configuration(format!(
                "window ends ({end}) before it begins ({begin})"
            )));
        }
        Ok(TimeWindow { begin, end })
    }

    /// A zero-length window at `instant`.
    pub fn instant(instant: DateTime<Utc>) -> Self {
        TimeWindow {
            begin: instant,
            end: instant,
        }
    }

    pub fn begin(&self) -> DateTime<Utc> {
        self.begin
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn is_instant(&self) -> bool {
        self.begin == self.end
    }

    /// Whether `time` falls inside the window under [`selects`].
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        selects(self.begin, self.end, time)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.begin, self.end)
    }
}

/// The selection rule: `t1 == t2` selects exactly that instant, otherwise
/// the half-open interval `(t1, t2]`.
pub fn selects(t1: DateTime<Utc>, t2: DateTime<Utc>, time: DateTime<Utc>) -> bool {
    if t1 == t2 {
        time == t1
    } else {
        time > t1 && time <= t2
    }
}

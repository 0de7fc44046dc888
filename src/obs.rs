//! Observation store and distributed vector.
//!
//! [`ObsSpace`] owns one worker's share of an observation collection and
//! moves records between workers and files. [`ObsVector`] is the numeric
//! vector bound to a store. Both keep their values in a [`ColumnSet`].

pub mod columns;
pub mod config;
pub mod record;
pub mod screening;
pub mod space;
pub mod vector;
pub mod window;

pub use columns::{Column, ColumnSet};
pub use config::{FileSpec, GenerateConfig, ObsDataConfig, ObsSpaceConfig};
pub use record::{Record, RecordSet};
pub use screening::{AcceptAll, ScreeningFilter};
pub use space::{DEFAULT_ERROR_GROUP, ObsContext, ObsSpace};
pub use vector::{OBS_PERTURBATION_SEED, ObsVector, VariableSummary, VectorSummary};
pub use window::TimeWindow;

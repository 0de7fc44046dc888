//! # obspace
//!
//! A distributed, partitioned observation store.
//!
//! ## Features
//!
//! - Nearest-grid-point ownership of irregular observations
//! - Collective redistribution over a pluggable worker group
//! - Hierarchical binary observation files
//! - Vector algebra that does not depend on the worker count
//!
//! ```
//! use std::sync::Arc;
//!
//! use chrono::{TimeZone, Utc};
//! use obspace::comm::run_workers;
//! use obspace::geometry::{LatitudeBands, RegularLonLatGrid};
//! use obspace::obs::{ObsContext, ObsSpace, ObsSpaceConfig, ObsVector, TimeWindow};
//! use obspace::storage::memory::{MemoryStorage, MemoryStorageConfig};
//!
//! let storage = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
//! let grid = Arc::new(RegularLonLatGrid::global(8, 4).unwrap());
//! let window = TimeWindow::instant(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
//! let config = ObsSpaceConfig::new(vec!["temperature".to_string()]);
//!
//! let sizes = run_workers(2, |comm| {
//!     let ctx = ObsContext::new(comm, storage.clone(), grid.clone(), &LatitudeBands)?;
//!     let mut space = ObsSpace::new(&config, ctx, window, false)?;
//!     space.generate_distribution(10, "temperature", &[0.5])?;
//!     let errors = ObsVector::from_group(&space, "ObsError")?;
//!     Ok(errors.size())
//! })
//! .unwrap();
//! assert_eq!(sizes, vec![10, 10]);
//! ```

pub mod cli;
pub mod codec;
pub mod comm;
pub mod error;
pub mod geometry;
pub mod obs;
pub mod partition;
pub mod storage;
pub mod util;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

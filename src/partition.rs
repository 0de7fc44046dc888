//! Spatial partitioner: which worker owns an observation.
//!
//! Every grid point is tagged with the worker the [`OwnershipOracle`] gives
//! it, and an observation belongs to the owner of its nearest grid point.
//! Distances are measured between unit-sphere positions, so the lookup is
//! insensitive to the longitude seam and to the poles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ObsError, Result};
use crate::geometry::{GridGeometry, OwnershipOracle, Point3, to_unit_xyz};

pub mod kdtree;

pub use kdtree::KdTree;

/// Placement policy for observations.
///
/// Only nearest-grid-point placement exists today; other names are rejected
/// so configurations fail loudly instead of silently changing meaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionPolicy {
    #[default]
    NearestNeighbor,
}

impl fmt::Display for DistributionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionPolicy::NearestNeighbor => write!(f, "nearest_neighbor"),
        }
    }
}

impl FromStr for DistributionPolicy {
    type Err = ObsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "nearest_neighbor" | "nearest_neighbour" => Ok(DistributionPolicy::NearestNeighbor),
            other => Err(ObsError::configuration(format!(
                "unsupported distribution policy: {other}"
            ))),
        }
    }
}

/// Nearest-grid-point owner lookup, built once per store.
#[derive(Debug, Clone)]
pub struct SpatialPartitioner {
    tree: KdTree,
    owners: Vec<usize>,
    workers: usize,
    policy: DistributionPolicy,
}

impl SpatialPartitioner {
    pub fn new(
        geometry: &dyn GridGeometry,
        oracle: &dyn OwnershipOracle,
        workers: usize,
    ) -> Result<Self> {
        Self::with_policy(geometry, oracle, workers, DistributionPolicy::NearestNeighbor)
    }

    pub fn with_policy(
        geometry: &dyn GridGeometry,
        oracle: &dyn OwnershipOracle,
        workers: usize,
        policy: DistributionPolicy,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(ObsError::configuration("partitioner needs at least one worker"));
        }
        let points = geometry.grid_points();
        if points.is_empty() {
            return Err(ObsError::configuration("cannot partition over an empty grid"));
        }

        let owners = oracle.partition(&points, workers)?;
        if owners.len() != points.len() {
            return Err(ObsError::configuration(format!(
                "ownership oracle returned {} owners for {} grid points",
                owners.len(),
                points.len()
            )));
        }
        if let Some(&owner) = owners.iter().find(|&&owner| owner >= workers) {
            return Err(ObsError::configuration(format!(
                "ownership oracle assigned worker {owner} outside a group of {workers}"
            )));
        }

        let tree = KdTree::build(points.iter().map(|p| to_unit_xyz(p.lon, p.lat)).collect());
        Ok(SpatialPartitioner {
            tree,
            owners,
            workers,
            policy,
        })
    }

    /// Owner of the grid point nearest to `(lon, lat)`.
    pub fn assign_worker(&self, lon: f64, lat: f64) -> Result<usize> {
        match self.policy {
            DistributionPolicy::NearestNeighbor => self
                .tree
                .nearest(&to_unit_xyz(lon, lat))
                .map(|item| self.owners[item])
                .ok_or_else(|| ObsError::precondition("partitioner has no grid points")),
        }
    }

    /// Owner of every point, in input order.
    pub fn assign_all(&self, points: &[Point3]) -> Result<Vec<usize>> {
        points
            .iter()
            .map(|p| self.assign_worker(p.lon, p.lat))
            .collect()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn policy(&self) -> DistributionPolicy {
        self.policy
    }

    pub fn grid_size(&self) -> usize {
        self.owners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ExplicitOwnership, LatitudeBands, RegularLonLatGrid};

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "nearest-neighbor".parse::<DistributionPolicy>().unwrap(),
            DistributionPolicy::NearestNeighbor
        );
        assert!("round_robin".parse::<DistributionPolicy>().is_err());
        assert_eq!(DistributionPolicy::default().to_string(), "nearest_neighbor");
    }

    #[test]
    fn test_assign_worker_follows_nearest_grid_point() {
        let grid = RegularLonLatGrid::global(4, 2).unwrap();
        let partitioner = SpatialPartitioner::new(&grid, &LatitudeBands, 2).unwrap();
        assert_eq!(partitioner.grid_size(), 8);

        assert_eq!(partitioner.assign_worker(40.0, -80.0).unwrap(), 0);
        assert_eq!(partitioner.assign_worker(200.0, 70.0).unwrap(), 1);
        // across the seam: 359.9 is close to the point at 315
        assert_eq!(partitioner.assign_worker(-0.1, 30.0).unwrap(), 1);
    }

    #[test]
    fn test_explicit_owner_lookup() {
        let grid = RegularLonLatGrid::global(2, 1).unwrap();
        let partitioner =
            SpatialPartitioner::new(&grid, &ExplicitOwnership(vec![2, 0]), 3).unwrap();
        let owners = partitioner
            .assign_all(&[Point3::new(80.0, 0.0, 0.0), Point3::new(260.0, 10.0, 5.0)])
            .unwrap();
        assert_eq!(owners, vec![2, 0]);
    }

    #[test]
    fn test_rejects_bad_oracle() {
        let grid = RegularLonLatGrid::global(2, 1).unwrap();
        assert!(SpatialPartitioner::new(&grid, &ExplicitOwnership(vec![0, 5]), 2).is_err());
        assert!(SpatialPartitioner::new(&grid, &LatitudeBands, 0).is_err());
    }
}

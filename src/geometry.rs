//! Spatial grid boundary.
//!
//! The observation store never owns a model grid. It consumes a
//! [`GridGeometry`] for the grid points, the horizontal domain and the
//! vertical extent of each variable, and an [`OwnershipOracle`] that maps grid
//! points to workers. [`RegularLonLatGrid`], [`LatitudeBands`] and
//! [`ExplicitOwnership`] are simple in-process implementations of both.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::{ObsError, Result};

/// A horizontal position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        LonLat { lon, lat }
    }
}

/// An observation location: degrees east, degrees north and meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub lon: f64,
    pub lat: f64,
    pub height: f64,
}

impl Point3 {
    pub fn new(lon: f64, lat: f64, height: f64) -> Self {
        Point3 { lon, lat, height }
    }

    /// The horizontal part of the point.
    pub fn horizontal(&self) -> LonLat {
        LonLat::new(self.lon, self.lat)
    }
}

/// Map a longitude into `[0, 360)`.
pub fn normalise_lon(lon: f64) -> f64 {
    let wrapped = lon.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Cartesian coordinates of a lon/lat position on the unit sphere.
pub fn to_unit_xyz(lon: f64, lat: f64) -> [f64; 3] {
    let (lon, lat) = (lon.to_radians(), lat.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

/// Horizontal extent of a model domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    /// Whether the domain covers the whole sphere.
    #[serde(default = "default_true")]
    pub global: bool,
    #[serde(default)]
    pub lon_min: f64,
    #[serde(default = "default_lon_max")]
    pub lon_max: f64,
    #[serde(default = "default_lat_min")]
    pub lat_min: f64,
    #[serde(default = "default_lat_max")]
    pub lat_max: f64,
}

fn default_true() -> bool {
    true
}

fn default_lon_max() -> f64 {
    360.0
}

fn default_lat_min() -> f64 {
    -90.0
}

fn default_lat_max() -> f64 {
    90.0
}

impl Default for Domain {
    fn default() -> Self {
        Domain {
            global: true,
            lon_min: 0.0,
            lon_max: default_lon_max(),
            lat_min: default_lat_min(),
            lat_max: default_lat_max(),
        }
    }
}

impl Domain {
    /// A limited-area domain. Longitudes may be given in any 360° window.
    pub fn regional(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Result<Self> {
        let domain = Domain {
            global: false,
            lon_min,
            lon_max,
            lat_min,
            lat_max,
        };
        domain.validate()?;
        Ok(domain)
    }

    pub fn validate(&self) -> Result<()> {
        if self.global {
            return Ok(());
        }
        if !(self.lon_min < self.lon_max) || self.lon_max - self.lon_min > 360.0 {
            return Err(ObsError::configuration(format!(
                "invalid longitude range [{}, {}]",
                self.lon_min, self.lon_max
            )));
        }
        if !(self.lat_min < self.lat_max) || self.lat_min < -90.0 || self.lat_max > 90.0 {
            return Err(ObsError::configuration(format!(
                "invalid latitude range [{}, {}]",
                self.lat_min, self.lat_max
            )));
        }
        Ok(())
    }

    /// Whether a point lies inside the domain. Always true for global domains.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if self.global {
            return true;
        }
        let shifted = self.lon_min + (lon - self.lon_min).rem_euclid(360.0);
        shifted <= self.lon_max && lat >= self.lat_min && lat <= self.lat_max
    }
}

/// The model grid as seen by the observation store.
pub trait GridGeometry: Send + Sync + Debug {
    /// Every horizontal grid point, in a fixed order shared by all workers.
    fn grid_points(&self) -> Vec<LonLat>;

    /// Whether the grid covers the whole sphere.
    fn is_global(&self) -> bool;

    /// Whether a horizontal position is inside the model domain.
    fn contains(&self, lon: f64, lat: f64) -> bool;

    /// Lowest and highest model level height for a variable, in meters.
    fn vertical_bounds(&self, variable: &str) -> Result<(f64, f64)>;
}

/// Maps grid points to owning workers.
///
/// Must be deterministic: every worker has to see the same assignment.
pub trait OwnershipOracle: Send + Sync + Debug {
    fn partition(&self, points: &[LonLat], workers: usize) -> Result<Vec<usize>>;
}

/// Serializable description of a [`RegularLonLatGrid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Number of grid columns along longitude.
    pub nx: usize,
    /// Number of grid rows along latitude.
    pub ny: usize,
    #[serde(default)]
    pub domain: Domain,
    /// Level heights used by variables without their own entry.
    #[serde(default = "default_levels")]
    pub levels: Vec<f64>,
    #[serde(default)]
    pub variable_levels: BTreeMap<String, Vec<f64>>,
}

fn default_levels() -> Vec<f64> {
    vec![0.0, 1000.0, 5000.0, 10000.0]
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            nx: 36,
            ny: 18,
            domain: Domain::default(),
            levels: default_levels(),
            variable_levels: BTreeMap::new(),
        }
    }
}

/// A cell-centred regular longitude/latitude grid.
#[derive(Debug, Clone)]
pub struct RegularLonLatGrid {
    config: GridConfig,
    points: Vec<LonLat>,
}

impl RegularLonLatGrid {
    pub fn new(config: GridConfig) -> Result<Self> {
        if config.nx == 0 || config.ny == 0 {
            return Err(ObsError::configuration(format!(
                "grid needs at least one point, got {}x{}",
                config.nx, config.ny
            )));
        }
        config.domain.validate()?;
        if config.levels.is_empty() {
            return Err(ObsError::configuration("grid needs at least one level"));
        }
        if let Some((name, _)) = config.variable_levels.iter().find(|(_, l)| l.is_empty()) {
            return Err(ObsError::configuration(format!(
                "variable {name} has no levels"
            )));
        }

        let domain = &config.domain;
        let dlon = (domain.lon_max - domain.lon_min) / config.nx as f64;
        let dlat = (domain.lat_max - domain.lat_min) / config.ny as f64;
        let mut points = Vec::with_capacity(config.nx * config.ny);
        for j in 0..config.ny {
            let lat = domain.lat_min + (j as f64 + 0.5) * dlat;
            for i in 0..config.nx {
                let lon = domain.lon_min + (i as f64 + 0.5) * dlon;
                points.push(LonLat::new(normalise_lon(lon), lat));
            }
        }

        Ok(RegularLonLatGrid { config, points })
    }

    /// A global grid with the default levels.
    pub fn global(nx: usize, ny: usize) -> Result<Self> {
        Self::new(GridConfig {
            nx,
            ny,
            ..GridConfig::default()
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }
}

impl GridGeometry for RegularLonLatGrid {
    fn grid_points(&self) -> Vec<LonLat> {
        self.points.clone()
    }

    fn is_global(&self) -> bool {
        self.config.domain.global
    }

    fn contains(&self, lon: f64, lat: f64) -> bool {
        self.config.domain.contains(lon, lat)
    }

    fn vertical_bounds(&self, variable: &str) -> Result<(f64, f64)> {
        let levels = self
            .config
            .variable_levels
            .get(variable)
            .unwrap_or(&self.config.levels);
        let bottom = levels.iter().copied().fold(f64::INFINITY, f64::min);
        let top = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !bottom.is_finite() || !top.is_finite() {
            return Err(ObsError::configuration(format!(
                "no finite levels for variable {variable}"
            )));
        }
        Ok((bottom, top))
    }
}

/// Splits the grid into bands of equal point count, south to north.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatitudeBands;

impl OwnershipOracle for LatitudeBands {
    fn partition(&self, points: &[LonLat], workers: usize) -> Result<Vec<usize>> {
        if workers == 0 {
            return Err(ObsError::configuration("cannot partition over zero workers"));
        }
        let mut sorted: Vec<usize> = (0..points.len()).collect();
        sorted.sort_by(|&a, &b| {
            points[a]
                .lat
                .total_cmp(&points[b].lat)
                .then(points[a].lon.total_cmp(&points[b].lon))
                .then(a.cmp(&b))
        });

        let mut owners = vec![0usize; points.len()];
        for (position, &index) in sorted.iter().enumerate() {
            owners[index] = position * workers / points.len();
        }
        Ok(owners)
    }
}

/// A precomputed owner per grid point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitOwnership(pub Vec<usize>);

impl OwnershipOracle for ExplicitOwnership {
    fn partition(&self, points: &[LonLat], workers: usize) -> Result<Vec<usize>> {
        if self.0.len() != points.len() {
            return Err(ObsError::configuration(format!(
                "ownership lists {} points, grid has {}",
                self.0.len(),
                points.len()
            )));
        }
        if let Some(&owner) = self.0.iter().find(|&&owner| owner >= workers) {
            return Err(ObsError::configuration(format!(
                "grid point owned by worker {owner} outside a group of {workers}"
            )));
        }
        Ok(self.0.clone())
    }
}

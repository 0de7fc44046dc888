//! The distributed observation store.
//!
//! Every worker holds an [`ObsSpace`] bound to the same window and
//! configuration. The root alone touches files and random numbers; records
//! reach the other workers through a [`RedistributionPlan`] so each worker
//! ends up with exactly the observations nearest to the grid points it owns.
//! Every record keeps its canonical position (`global_order`), which lets a
//! store be written back in its original order for any number of workers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::{self, GlobalObservations, read_obs_file, write_obs_file};
use crate::comm::{Communicator, ROOT, RedistributionPlan, allgather, broadcast, share_status};
use crate::error::{ObsError, Result};
use crate::geometry::{GridGeometry, OwnershipOracle, Point3};
use crate::obs::columns::ColumnSet;
use crate::obs::config::{GenerateConfig, ObsSpaceConfig};
use crate::obs::record::RecordSet;
use crate::obs::screening::{AcceptAll, ScreeningFilter};
use crate::obs::vector::ObsVector;
use crate::obs::window::{TimeWindow, selects};
use crate::partition::SpatialPartitioner;
use crate::storage::Storage;

/// Name of the error group written by synthetic generation.
pub const DEFAULT_ERROR_GROUP: &str = "ObsError";

/// Candidate draws allowed per requested point before generation gives up.
const MAX_DRAWS_PER_POINT: usize = 10_000;

/// Group layout exchanged between workers: names and column names.
type GroupLayout = Vec<(String, Vec<String>)>;

/// The collaborators a store runs against.
#[derive(Debug, Clone)]
pub struct ObsContext {
    comm: Arc<dyn Communicator>,
    storage: Arc<dyn Storage>,
    geometry: Arc<dyn GridGeometry>,
    partitioner: Arc<SpatialPartitioner>,
}

impl ObsContext {
    /// Build the partitioner for this worker group from `oracle`.
    pub fn new(
        comm: Arc<dyn Communicator>,
        storage: Arc<dyn Storage>,
        geometry: Arc<dyn GridGeometry>,
        oracle: &dyn OwnershipOracle,
    ) -> Result<Self> {
        let partitioner = SpatialPartitioner::new(geometry.as_ref(), oracle, comm.size())?;
        Ok(ObsContext {
            comm,
            storage,
            geometry,
            partitioner: Arc::new(partitioner),
        })
    }

    /// Reuse a partitioner built for a group of the same size.
    pub fn with_partitioner(
        comm: Arc<dyn Communicator>,
        storage: Arc<dyn Storage>,
        geometry: Arc<dyn GridGeometry>,
        partitioner: Arc<SpatialPartitioner>,
    ) -> Result<Self> {
        if partitioner.workers() != comm.size() {
            return Err(ObsError::configuration(format!(
                "partitioner built for {} workers used by a group of {}",
                partitioner.workers(),
                comm.size()
            )));
        }
        Ok(ObsContext {
            comm,
            storage,
            geometry,
            partitioner,
        })
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn geometry(&self) -> &dyn GridGeometry {
        self.geometry.as_ref()
    }

    pub fn partitioner(&self) -> &SpatialPartitioner {
        &self.partitioner
    }
}

/// Filtered copy of the local records and groups.
#[derive(Debug, Clone)]
struct ScreenedSubset {
    records: RecordSet,
    groups: Vec<ColumnSet>,
    counts_by_worker: Vec<usize>,
}

/// One worker's partition of an observation collection.
#[derive(Debug)]
pub struct ObsSpace {
    name: String,
    ctx: ObsContext,
    window: TimeWindow,
    screened: bool,
    variables: Vec<String>,
    input: Option<String>,
    output: Option<String>,
    records: RecordSet,
    groups: Vec<ColumnSet>,
    counts_by_worker: Vec<usize>,
    /// Canonical position of every global record, worker segment by segment.
    global_order: Vec<u64>,
    screened_subset: Mutex<Option<ScreenedSubset>>,
    /// Set once a load or generation has completed.
    populated: bool,
    /// Set by any failed collective; such a store never persists itself.
    poisoned: AtomicBool,
    closed: bool,
}

impl ObsSpace {
    /// Collective: create a store and load its input file, if configured.
    ///
    /// `screened` selects the `_screened` input and output files. The store
    /// is persisted to the configured output when closed, or when dropped
    /// after a successful load or generation and no failed collective.
    pub fn new(
        config: &ObsSpaceConfig,
        ctx: ObsContext,
        window: TimeWindow,
        screened: bool,
    ) -> Result<Self> {
        config.validate()?;
        if ctx.partitioner.policy() != config.distribution {
            return Err(ObsError::configuration(format!(
                "store configured for {} distribution, partitioner uses {}",
                config.distribution,
                ctx.partitioner.policy()
            )));
        }

        let workers = ctx.comm.size();
        let mut space = ObsSpace {
            name: config.name.clone(),
            ctx,
            window,
            screened,
            variables: config.variables.clone(),
            input: config.input_path(screened).map(str::to_string),
            output: None,
            records: RecordSet::default(),
            groups: Vec::new(),
            counts_by_worker: vec![0; workers],
            global_order: Vec::new(),
            screened_subset: Mutex::new(None),
            populated: false,
            poisoned: AtomicBool::new(false),
            closed: false,
        };

        if let Some(base) = space.input.clone() {
            space.load(&base)?;
            space.populated = true;
        }
        // only a fully built store may persist itself
        space.output = config.output_path(screened).map(str::to_string);
        Ok(space)
    }

    fn load(&mut self, base: &str) -> Result<()> {
        trace!("{}: load starting", self.name);
        let name = codec::file_name(base, false);
        let comm = Arc::clone(&self.ctx.comm);

        let mut global = None;
        let status = if comm.is_root() {
            read_obs_file(self.ctx.storage(), &name)
                .and_then(|file| GlobalObservations::from_file(&file, &name, &self.variables))
                .map(|observations| global = Some(observations))
        } else {
            Ok(())
        };
        share_status(comm.as_ref(), ROOT, status)?;
        self.distribute(global)?;

        if !self.window.is_instant() {
            let begin = self.window.begin();
            let mut shifted = 0usize;
            for time in self.records.times_mut() {
                if *time == begin {
                    *time = begin + TimeDelta::seconds(1);
                    shifted += 1;
                }
            }
            if shifted > 0 {
                debug!("{}: moved {shifted} records off the window start", self.name);
            }
        }

        let outside = self
            .records
            .times()
            .iter()
            .filter(|t| !self.window.contains(**t))
            .count();
        if outside > 0 {
            warn!(
                "{}: {outside} records on worker {} lie outside the window {}",
                self.name,
                comm.rank(),
                self.window
            );
        }

        if comm.is_root() {
            info!("{}: loaded {} records from {name}", self.name, self.global_count());
        }
        trace!("{}: load done", self.name);
        Ok(())
    }

    /// Collective: hand every worker its records. Only the root passes data.
    fn distribute(&mut self, global: Option<GlobalObservations>) -> Result<()> {
        let comm_handle = Arc::clone(&self.ctx.comm);
        let comm = comm_handle.as_ref();

        let mut owners = None;
        let status = match &global {
            Some(observations) => observations
                .validate()
                .and_then(|_| self.ctx.partitioner.assign_all(&observations.locations))
                .map(|assigned| owners = Some(assigned)),
            None if comm.is_root() => Err(ObsError::precondition("root has no records to distribute")),
            None => Ok(()),
        };
        share_status(comm, ROOT, status)?;
        let plan = RedistributionPlan::establish(comm, owners.as_deref())?;

        let empty = GlobalObservations::default();
        let source = global.as_ref().unwrap_or(&empty);

        let mut layout: GroupLayout = source
            .groups
            .iter()
            .map(|g| (g.name().to_string(), g.column_names()))
            .collect();
        broadcast(comm, ROOT, &mut layout)?;

        let times = plan.scatter(comm, &source.times, 1)?;
        let locations = plan.scatter(comm, &source.locations, 1)?;
        let order = plan.scatter(comm, &source.order, 1)?;

        let mut groups = Vec::with_capacity(layout.len());
        for (index, (name, columns)) in layout.iter().enumerate() {
            let values = source
                .groups
                .get(index)
                .map(ColumnSet::interleave)
                .unwrap_or_default();
            let local = plan.scatter(comm, &values, columns.len())?;
            groups.push(ColumnSet::from_interleaved(name.clone(), columns, &local)?);
        }

        let mut global_order = if comm.is_root() {
            plan.arrange(&source.order, 1)?
        } else {
            Vec::new()
        };
        broadcast(comm, ROOT, &mut global_order)?;

        self.records = RecordSet::new(times, locations, order)?;
        self.groups = groups;
        self.counts_by_worker = plan.counts().to_vec();
        self.global_order = global_order;
        *self.screened_subset.lock() = None;

        debug!(
            "{}: worker {} holds {} of {} records",
            self.name,
            comm.rank(),
            self.records.len(),
            self.global_count()
        );
        Ok(())
    }

    /// Collective: fill an empty store with `density` random observations
    /// and an error group named [`DEFAULT_ERROR_GROUP`].
    ///
    /// The window must be a single instant; every observation is stamped
    /// with it. `errors` holds one constant per declared variable.
    pub fn generate_distribution(
        &mut self,
        density: usize,
        variable: &str,
        errors: &[f64],
    ) -> Result<()> {
        self.generate_into(density, variable, errors, DEFAULT_ERROR_GROUP)
    }

    /// Collective: [`generate_distribution`](Self::generate_distribution)
    /// driven by a [`GenerateConfig`].
    pub fn generate(&mut self, config: &GenerateConfig) -> Result<()> {
        config.validate(&self.variables)?;
        self.generate_into(config.density, &config.variable, &config.error, &config.obserror)
    }

    fn generate_into(
        &mut self,
        density: usize,
        variable: &str,
        errors: &[f64],
        error_group: &str,
    ) -> Result<()> {
        let result = self.fill(density, variable, errors, error_group);
        self.guard(result)?;
        self.populated = true;
        Ok(())
    }

    fn fill(
        &mut self,
        density: usize,
        variable: &str,
        errors: &[f64],
        error_group: &str,
    ) -> Result<()> {
        trace!("{}: generate starting", self.name);
        if !self.window.is_instant() {
            return Err(ObsError::configuration(format!(
                "observations can only be generated for a single instant, window is {}",
                self.window
            )));
        }
        if errors.len() != self.variables.len() {
            return Err(ObsError::configuration(format!(
                "{} error values for {} variables",
                errors.len(),
                self.variables.len()
            )));
        }
        if self.global_count() > 0 || !self.groups.is_empty() {
            return Err(ObsError::precondition(format!(
                "{} already holds observations",
                self.name
            )));
        }
        let bounds = self.ctx.geometry.vertical_bounds(variable)?;

        let comm = Arc::clone(&self.ctx.comm);
        let mut global = None;
        let status = if comm.is_root() {
            self.draw_points(density, bounds)
                .map(|observations| global = Some(observations))
        } else {
            Ok(())
        };
        share_status(comm.as_ref(), ROOT, status)?;
        self.distribute(global)?;

        let local = self.local_count();
        let columns = self
            .variables
            .iter()
            .zip(errors)
            .map(|(name, &error)| (name.clone(), vec![error; local]))
            .collect();
        self.put(ColumnSet::from_columns(error_group, columns)?)?;

        if comm.is_root() {
            info!(
                "{}: generated {density} observations at {}",
                self.name,
                self.window.begin()
            );
        }
        trace!("{}: generate done", self.name);
        Ok(())
    }

    /// Root only: draw points uniformly on the sphere inside the domain.
    fn draw_points(&self, density: usize, (bottom, top): (f64, f64)) -> Result<GlobalObservations> {
        let seed = self.window.begin().timestamp() as u64;
        let mut rng = StdRng::seed_from_u64(seed);
        let geometry = self.ctx.geometry();
        let global_domain = geometry.is_global();
        let limit = density.saturating_mul(MAX_DRAWS_PER_POINT);

        let mut locations = Vec::with_capacity(density);
        let mut draws = 0usize;
        while locations.len() < density {
            if draws >= limit {
                return Err(ObsError::configuration(format!(
                    "only {} of {density} points fell inside the domain after {draws} draws",
                    locations.len()
                )));
            }
            draws += 1;

            let lon = 360.0 * rng.random::<f64>();
            let lat = 90.0 - (1.0 - 2.0 * rng.random::<f64>()).acos().to_degrees();
            if !global_domain && !geometry.contains(lon, lat) {
                continue;
            }
            let height = bottom + (top - bottom) * rng.random::<f64>();
            locations.push(Point3::new(lon, lat, height));
        }
        debug!("{}: accepted {density} of {draws} candidate points", self.name);

        Ok(GlobalObservations {
            times: vec![self.window.begin(); density],
            locations,
            order: (0..density as u64).collect(),
            groups: Vec::new(),
        })
    }

    /// Insert or replace a group. Its length must equal the local count.
    pub fn put(&mut self, group: ColumnSet) -> Result<()> {
        if group.num_columns() > 0 && group.len() != self.local_count() {
            return Err(ObsError::precondition(format!(
                "group {} holds {} values, worker has {} records",
                group.name(),
                group.len(),
                self.local_count()
            )));
        }
        match self.groups.iter_mut().find(|g| g.name() == group.name()) {
            Some(slot) => *slot = group,
            None => self.groups.push(group),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ColumnSet> {
        self.groups
            .iter()
            .find(|g| g.name() == name)
            .ok_or_else(|| {
                ObsError::not_found(format!(
                    "group {name} in {}; known groups: [{}]",
                    self.name,
                    self.group_names().join(", ")
                ))
            })
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name() == name)
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.name().to_string()).collect()
    }

    /// Local indices selected by `t1`/`t2`: the exact instant when they are
    /// equal, otherwise `(t1, t2]`.
    pub fn time_select(&self, t1: DateTime<Utc>, t2: DateTime<Utc>) -> Vec<usize> {
        self.records.indices_where(|t| selects(t1, t2, t))
    }

    /// Local locations selected like [`time_select`](Self::time_select).
    pub fn locations(&self, t1: DateTime<Utc>, t2: DateTime<Utc>) -> Vec<Point3> {
        self.time_select(t1, t2)
            .into_iter()
            .map(|i| self.records.locations()[i])
            .collect()
    }

    /// Collective: write the records to `base`, in canonical order.
    pub fn write(&self, base: &str) -> Result<()> {
        let name = codec::file_name(base, false);
        self.write_records(
            &name,
            &self.records,
            &self.groups,
            &self.counts_by_worker,
            Some(self.global_order.as_slice()),
        )
    }

    /// Collective: write the screened subset to `<base>_screened`.
    pub fn write_screened(&self, base: &str) -> Result<()> {
        let subset = self.screened_subset.lock();
        let subset = subset.as_ref().ok_or_else(|| {
            ObsError::precondition(format!("{} has not been screened", self.name))
        })?;
        self.write_records(
            &codec::file_name(base, true),
            &subset.records,
            &subset.groups,
            &subset.counts_by_worker,
            None,
        )
    }

    fn write_records(
        &self,
        name: &str,
        records: &RecordSet,
        groups: &[ColumnSet],
        counts: &[usize],
        canonical: Option<&[u64]>,
    ) -> Result<()> {
        let result = self.gather_and_write(name, records, groups, counts, canonical);
        self.guard(result)
    }

    fn gather_and_write(
        &self,
        name: &str,
        records: &RecordSet,
        groups: &[ColumnSet],
        counts: &[usize],
        canonical: Option<&[u64]>,
    ) -> Result<()> {
        trace!("{}: write {name} starting", self.name);
        let comm = self.ctx.comm();

        let reported = allgather(comm, records.len())?;
        if reported != counts {
            return Err(ObsError::precondition(format!(
                "worker record counts {reported:?} disagree with the distribution {counts:?}"
            )));
        }
        let layout: GroupLayout = groups
            .iter()
            .map(|g| (g.name().to_string(), g.column_names()))
            .collect();
        let layouts = allgather(comm, layout.clone())?;
        if let Some(rank) = layouts.iter().position(|other| *other != layout) {
            return Err(ObsError::precondition(format!(
                "worker {rank} and worker {} hold different groups",
                comm.rank()
            )));
        }

        let plan = RedistributionPlan::from_counts(counts.to_vec());
        let times = plan.collect(comm, records.times(), 1)?;
        let locations = plan.collect(comm, records.locations(), 1)?;
        let order = match canonical {
            Some(order) if comm.is_root() => order.to_vec(),
            Some(_) => Vec::new(),
            None => plan.collect(comm, records.global_order(), 1)?,
        };
        let mut values = Vec::with_capacity(groups.len());
        for group in groups {
            values.push(plan.collect(comm, &group.interleave(), group.num_columns())?);
        }

        let status = if comm.is_root() {
            Self::assemble(times, locations, order, &layout, &values)
                .and_then(|observations| observations.to_file())
                .and_then(|file| write_obs_file(self.ctx.storage(), name, &file))
        } else {
            Ok(())
        };
        share_status(comm, ROOT, status)?;
        trace!("{}: write {name} done", self.name);
        Ok(())
    }

    fn assemble(
        times: Vec<DateTime<Utc>>,
        locations: Vec<Point3>,
        order: Vec<u64>,
        layout: &GroupLayout,
        values: &[Vec<f64>],
    ) -> Result<GlobalObservations> {
        let groups = layout
            .iter()
            .zip(values)
            .map(|((name, columns), values)| ColumnSet::from_interleaved(name.clone(), columns, values))
            .collect::<Result<Vec<_>>>()?;
        let mut observations = GlobalObservations {
            times,
            locations,
            order,
            groups,
        };
        observations.validate()?;
        observations.sort_by_order();
        Ok(observations)
    }

    /// Collective: screen with the accept-all placeholder test.
    pub fn screen(&self, residual: &ObsVector<'_>, predicted: &ObsVector<'_>) -> Result<()> {
        self.screen_with(&AcceptAll, residual, predicted)
    }

    /// Collective: keep the observations `filter` accepts as the screened
    /// subset and persist it to the configured output.
    pub fn screen_with(
        &self,
        filter: &dyn ScreeningFilter,
        residual: &ObsVector<'_>,
        predicted: &ObsVector<'_>,
    ) -> Result<()> {
        let result = self.select_screened(filter, residual, predicted);
        self.guard(result)
    }

    fn select_screened(
        &self,
        filter: &dyn ScreeningFilter,
        residual: &ObsVector<'_>,
        predicted: &ObsVector<'_>,
    ) -> Result<()> {
        trace!("{}: screen starting", self.name);
        for vector in [residual, predicted] {
            if !std::ptr::eq(vector.space(), self) {
                return Err(ObsError::precondition("screening vector belongs to another store"));
            }
            if vector.variables() != self.variables.as_slice() {
                return Err(ObsError::precondition(format!(
                    "screening vector holds {:?}, store declares {:?}",
                    vector.variables(),
                    self.variables
                )));
            }
        }

        let width = self.variables.len();
        let mut res = vec![0.0; width];
        let mut pred = vec![0.0; width];
        let mut valid = Vec::new();
        for index in 0..self.local_count() {
            for (v, (r, p)) in res.iter_mut().zip(pred.iter_mut()).enumerate() {
                *r = residual.data().columns()[v].values[index];
                *p = predicted.data().columns()[v].values[index];
            }
            if filter.accept(&res, &pred) {
                valid.push(index);
            }
        }

        let counts_by_worker = allgather(self.ctx.comm(), valid.len())?;
        debug!(
            "{}: worker {} keeps {} of {} records",
            self.name,
            self.ctx.comm().rank(),
            valid.len(),
            self.local_count()
        );
        *self.screened_subset.lock() = Some(ScreenedSubset {
            records: self.records.select(&valid),
            groups: self.groups.iter().map(|g| g.select(&valid)).collect(),
            counts_by_worker,
        });

        match &self.output {
            Some(base) => self.write_screened(base)?,
            None => warn!("{}: no output configured, screened subset not persisted", self.name),
        }
        trace!("{}: screen done", self.name);
        Ok(())
    }

    /// Local count of the screened subset, if screened.
    pub fn screened_local_count(&self) -> Option<usize> {
        self.screened_subset.lock().as_ref().map(|s| s.records.len())
    }

    /// Per-worker counts of the screened subset, if screened.
    pub fn screened_counts_by_worker(&self) -> Option<Vec<usize>> {
        self.screened_subset
            .lock()
            .as_ref()
            .map(|s| s.counts_by_worker.clone())
    }

    /// Copy of the screened local records, if screened.
    pub fn screened_records(&self) -> Option<RecordSet> {
        self.screened_subset.lock().as_ref().map(|s| s.records.clone())
    }

    /// Copy of a screened group.
    pub fn screened_group(&self, name: &str) -> Result<ColumnSet> {
        let subset = self.screened_subset.lock();
        let subset = subset.as_ref().ok_or_else(|| {
            ObsError::precondition(format!("{} has not been screened", self.name))
        })?;
        subset
            .groups
            .iter()
            .find(|g| g.name() == name)
            .cloned()
            .ok_or_else(|| ObsError::not_found(format!("screened group {name}")))
    }

    /// Collective: persist to the configured output, if any.
    pub fn persist(&self) -> Result<()> {
        match &self.output {
            Some(base) => self.write(base),
            None => Ok(()),
        }
    }

    /// Collective: persist and release the store, reporting write failures.
    ///
    /// A store poisoned by an earlier failed collective is released without
    /// writing, and the returned error says so.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        if self.is_poisoned() {
            return Err(ObsError::precondition(format!(
                "{} not persisted after an earlier failure",
                self.name
            )));
        }
        self.persist()
    }

    /// Poison the store when `result` is an error.
    pub(crate) fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.poisoned.store(true, Ordering::Relaxed);
        }
        result
    }

    /// Whether a collective on this store, or on a vector over it, failed.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Relaxed)
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.ctx.comm()
    }

    pub fn context(&self) -> &ObsContext {
        &self.ctx
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn is_screened(&self) -> bool {
        self.screened
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn local_count(&self) -> usize {
        self.records.len()
    }

    pub fn global_count(&self) -> usize {
        self.counts_by_worker.iter().sum()
    }

    pub fn counts_by_worker(&self) -> &[usize] {
        &self.counts_by_worker
    }

    /// Canonical positions of all records, worker segment by segment.
    pub fn global_order(&self) -> &[u64] {
        &self.global_order
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        self.records.times()
    }

    pub fn local_locations(&self) -> &[Point3] {
        self.records.locations()
    }

    pub fn input_path(&self) -> Option<&str> {
        self.input.as_deref()
    }

    pub fn output_path(&self) -> Option<&str> {
        self.output.as_deref()
    }
}

impl fmt::Display for ObsSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {} records, window {}",
            self.name,
            self.variables.join(", "),
            self.global_count(),
            self.window
        )?;
        if let Some(input) = &self.input {
            write!(f, ", input {}", codec::file_name(input, false))?;
        }
        if let Some(output) = &self.output {
            write!(f, ", output {}", codec::file_name(output, false))?;
        }
        Ok(())
    }
}

impl Drop for ObsSpace {
    fn drop(&mut self) {
        if self.closed || self.output.is_none() || std::thread::panicking() {
            return;
        }
        if !self.populated || self.is_poisoned() {
            warn!(
                "{}: not persisted on drop, the store was never filled or a collective failed",
                self.name
            );
            return;
        }
        if let Err(e) = self.persist() {
            warn!("{}: failed to persist on drop: {e}", self.name);
        }
    }
}
